//! Extraction modes a job can request

use crate::ScrapeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the extractor should pull out of a fetched page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "selector", rename_all = "kebab-case")]
pub enum ExtractionMode {
    /// The page title
    Title,

    /// Meta description, keywords and robots directives
    MetaDescription,

    /// Embedded LD+JSON structured data blocks
    StructuredData,

    /// The H1-H3 header hierarchy in document order
    HeaderHierarchy,

    /// Every hyperlink on the page
    Links,

    /// Text of the elements matched by a caller-supplied CSS selector
    CustomSelector(String),
}

impl ExtractionMode {
    /// Names accepted by [`ExtractionMode::parse`]
    pub const NAMES: [&'static str; 6] = [
        "title",
        "meta-description",
        "structured-data",
        "header-hierarchy",
        "links",
        "custom-selector",
    ];

    /// Builds a mode from its name and an optional selector
    ///
    /// The selector is only consulted for `custom-selector`, which requires it to
    /// be non-empty after trimming.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::InvalidInput` for an unknown name or a missing selector.
    pub fn parse(name: &str, selector: Option<&str>) -> Result<Self, ScrapeError> {
        let mode = match name.trim().to_ascii_lowercase().as_str() {
            "title" | "seo_title" => Self::Title,
            "meta-description" | "meta" | "meta_desc" => Self::MetaDescription,
            "structured-data" | "ld-json" | "ld_json" => Self::StructuredData,
            "header-hierarchy" | "headers" | "h_tags" => Self::HeaderHierarchy,
            "links" => Self::Links,
            "custom-selector" | "custom" => {
                Self::CustomSelector(selector.unwrap_or_default().trim().to_string())
            }
            other => {
                return Err(ScrapeError::InvalidInput(format!(
                    "unknown extraction mode '{}' (expected one of {})",
                    other,
                    Self::NAMES.join(", ")
                )))
            }
        };
        mode.validate()?;
        Ok(mode)
    }

    /// Checks the mode's own invariants
    pub fn validate(&self) -> Result<(), ScrapeError> {
        match self {
            Self::CustomSelector(selector) if selector.trim().is_empty() => Err(
                ScrapeError::InvalidInput("custom-selector mode requires a selector".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Returns the mode's name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::MetaDescription => "meta-description",
            Self::StructuredData => "structured-data",
            Self::HeaderHierarchy => "header-hierarchy",
            Self::Links => "links",
            Self::CustomSelector(_) => "custom-selector",
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CustomSelector(selector) => write!(f, "custom-selector({})", selector),
            other => write!(f, "{}", other.name()),
        }
    }
}
