use crate::UrlError;
use url::Url;

/// Scheme applied to targets submitted without one
const DEFAULT_SCHEME: &str = "https";

/// Normalizes a raw submission string into a fetchable target URL
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace; reject if nothing is left
/// 2. Prefix `https://` when no scheme is present
/// 3. Parse the result; reject malformed URLs
/// 4. Accept only HTTP and HTTPS schemes
/// 5. Require a host
///
/// The returned string keeps the caller's spelling (no trailing slash is added),
/// so `example.com` becomes `https://example.com`.
///
/// # Arguments
///
/// * `raw` - The raw target as typed by the caller
///
/// # Returns
///
/// * `Ok(String)` - The normalized target
/// * `Err(UrlError)` - The target is empty or not a valid HTTP(S) URL
///
/// # Examples
///
/// ```
/// use swarm_scraper::url::normalize_target;
///
/// assert_eq!(normalize_target("  example.com ").unwrap(), "https://example.com");
/// assert_eq!(normalize_target("http://foo.org/a").unwrap(), "http://foo.org/a");
/// ```
pub fn normalize_target(raw: &str) -> Result<String, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("{}://{}", DEFAULT_SCHEME, trimmed)
    };

    let url = Url::parse(&candidate).map_err(|e| UrlError::Parse(format!("{}: {}", trimmed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(candidate),
        _ => Err(UrlError::MissingHost),
    }
}

/// Returns true if the string already carries an explicit `scheme://` prefix
fn has_scheme(s: &str) -> bool {
    match s.find("://") {
        Some(idx) if idx > 0 => s[..idx]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_https_when_missing() {
        assert_eq!(normalize_target("example.com").unwrap(), "https://example.com");
    }

    #[test]
    fn test_keep_existing_scheme() {
        assert_eq!(normalize_target("https://foo.org").unwrap(), "https://foo.org");
        assert_eq!(
            normalize_target("http://foo.org/page").unwrap(),
            "http://foo.org/page"
        );
    }

    #[test]
    fn test_trim_whitespace() {
        assert_eq!(
            normalize_target("  github.com/trending \t").unwrap(),
            "https://github.com/trending"
        );
    }

    #[test]
    fn test_host_with_port() {
        assert_eq!(
            normalize_target("localhost:8080/status").unwrap(),
            "https://localhost:8080/status"
        );
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(normalize_target(""), Err(UrlError::Empty)));
        assert!(matches!(normalize_target("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_target("ftp://example.com/file");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_target("exa mple.com").is_err());
        assert!(normalize_target("https://").is_err());
    }
}
