//! URL handling for job submission
//!
//! Raw submissions arrive as free text (one target per line or comma separated).
//! This module splits them and normalizes each target into a fetchable URL.

mod normalize;

pub use normalize::normalize_target;

use crate::UrlError;

/// Splits a raw submission into trimmed, non-empty target strings
///
/// Targets may be separated by newlines, commas, or any mix of the two.
///
/// # Examples
///
/// ```
/// use swarm_scraper::url::split_targets;
///
/// let targets = split_targets("google.com\n github.com/trending,, foo.org");
/// assert_eq!(targets, vec!["google.com", "github.com/trending", "foo.org"]);
/// ```
pub fn split_targets(raw: &str) -> Vec<&str> {
    raw.split(|c| c == '\n' || c == '\r' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Splits and normalizes a raw submission
///
/// The batch is all-or-nothing: the first invalid target rejects the whole
/// batch, so callers never end up with a partially submitted batch.
///
/// # Arguments
///
/// * `raw` - Newline and/or comma separated targets
///
/// # Returns
///
/// * `Ok(Vec<String>)` - Normalized targets in input order (never empty)
/// * `Err(UrlError)` - No targets were present, or one of them is invalid
pub fn parse_batch(raw: &str) -> Result<Vec<String>, UrlError> {
    let targets = split_targets(raw);
    if targets.is_empty() {
        return Err(UrlError::Empty);
    }

    targets.into_iter().map(normalize_target).collect()
}
