//! Extractor abstraction and the HTML implementation
//!
//! This module turns fetched content into structured fields according to the
//! job's extraction mode:
//! - Page title
//! - Meta description, keywords and robots directives
//! - LD+JSON structured data
//! - The H1-H3 header hierarchy
//! - Links (absolute URLs)
//! - Text matched by a custom CSS selector

use crate::crawler::fetcher::FetchedPage;
use crate::state::{ErrorKind, ExtractedFields, ExtractionMode, JobError};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Errors an extractor can report
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),
}

impl ExtractError {
    /// Returns the job error kind this failure maps to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Failed(_) => ErrorKind::ExtractionFailed,
        }
    }
}

impl From<ExtractError> for JobError {
    fn from(err: ExtractError) -> Self {
        JobError::new(err.kind(), err.to_string())
    }
}

/// Turns raw content into ordered fields
///
/// Extraction is a pure function of its inputs. The scheduler runs it on the
/// blocking thread pool, so implementations may be CPU-bound but must be safe to
/// call from several threads at once.
pub trait Extractor: Send + Sync {
    fn extract(
        &self,
        page: &FetchedPage,
        mode: &ExtractionMode,
    ) -> Result<ExtractedFields, ExtractError>;
}

/// Extractor that parses HTML with `scraper`
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for HtmlExtractor {
    fn extract(
        &self,
        page: &FetchedPage,
        mode: &ExtractionMode,
    ) -> Result<ExtractedFields, ExtractError> {
        // Reject before parsing the document
        if let ExtractionMode::CustomSelector(selector) = mode {
            if selector.trim().is_empty() {
                return Err(ExtractError::InvalidInput(
                    "custom-selector mode requires a selector".to_string(),
                ));
            }
        }

        let document = Html::parse_document(&page.body);

        let fields = match mode {
            ExtractionMode::Title => extract_title(&document)?,
            ExtractionMode::MetaDescription => extract_meta(&document)?,
            ExtractionMode::StructuredData => extract_structured_data(&document)?,
            ExtractionMode::HeaderHierarchy => extract_headers(&document)?,
            ExtractionMode::Links => {
                let base_url = Url::parse(&page.url).map_err(|e| {
                    ExtractError::Failed(format!("invalid base URL '{}': {}", page.url, e))
                })?;
                extract_links(&document, &base_url)?
            }
            ExtractionMode::CustomSelector(selector) => extract_custom(&document, selector)?,
        };

        if fields.is_empty() {
            return Err(ExtractError::Failed(format!(
                "no {} found on {}",
                describe(mode),
                page.url
            )));
        }

        Ok(fields)
    }
}

fn describe(mode: &ExtractionMode) -> String {
    match mode {
        ExtractionMode::Title => "title".to_string(),
        ExtractionMode::MetaDescription => "meta description".to_string(),
        ExtractionMode::StructuredData => "LD+JSON data".to_string(),
        ExtractionMode::HeaderHierarchy => "h1-h3 headers".to_string(),
        ExtractionMode::Links => "links".to_string(),
        ExtractionMode::CustomSelector(selector) => format!("elements matching '{}'", selector),
    }
}

/// Parses a selector, reporting failures as extraction errors
fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css.trim())
        .map_err(|e| ExtractError::Failed(format!("invalid selector '{}': {}", css, e)))
}

/// Collapses an element's text into a single trimmed line
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts the page title, falling back to `og:title`
fn extract_title(document: &Html) -> Result<ExtractedFields, ExtractError> {
    let title_selector = selector("title")?;
    let og_selector = selector(r#"meta[property="og:title"]"#)?;
    let mut fields = ExtractedFields::new();

    let title = document
        .select(&title_selector)
        .map(|element| element_text(&element))
        .find(|s| !s.is_empty())
        .or_else(|| {
            document
                .select(&og_selector)
                .filter_map(|element| element.value().attr("content"))
                .map(|s| s.trim().to_string())
                .find(|s| !s.is_empty())
        });

    if let Some(title) = title {
        fields.insert("title", title);
    }
    Ok(fields)
}

/// Extracts description, keywords, robots and og:description meta tags
fn extract_meta(document: &Html) -> Result<ExtractedFields, ExtractError> {
    const NAMED: [&str; 3] = ["description", "keywords", "robots"];

    let named_selector = selector("meta[name][content]")?;
    let og_selector = selector(r#"meta[property="og:description"][content]"#)?;
    let mut fields = ExtractedFields::new();

    for wanted in NAMED {
        let value = document
            .select(&named_selector)
            .filter(|element| {
                element
                    .value()
                    .attr("name")
                    .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
            })
            .filter_map(|element| element.value().attr("content"))
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty());

        if let Some(value) = value {
            fields.insert(wanted, value);
        }
    }

    if let Some(og) = document
        .select(&og_selector)
        .filter_map(|element| element.value().attr("content"))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
    {
        fields.insert("og:description", og);
    }

    Ok(fields)
}

/// Extracts every `application/ld+json` block, validated and compacted
fn extract_structured_data(document: &Html) -> Result<ExtractedFields, ExtractError> {
    let mut fields = ExtractedFields::new();

    let script_selector = selector(r#"script[type="application/ld+json"]"#)?;
    for (index, element) in document.select(&script_selector).enumerate() {
        let raw: String = element.text().collect();
        let value: serde_json::Value = serde_json::from_str(raw.trim()).map_err(|e| {
            ExtractError::Failed(format!("invalid LD+JSON block {}: {}", index, e))
        })?;

        if let Some(kind) = value.get("@type") {
            let kind = match kind.as_str() {
                Some(s) => s.to_string(),
                None => kind.to_string(),
            };
            fields.insert(format!("ld_type.{}", index), kind);
        }
        fields.insert(format!("ld_json.{}", index), value.to_string());
    }

    Ok(fields)
}

/// Extracts h1-h3 headers in document order
fn extract_headers(document: &Html) -> Result<ExtractedFields, ExtractError> {
    let header_selector = selector("h1, h2, h3")?;
    let mut fields = ExtractedFields::new();
    let mut counts = [0usize; 3];

    for element in document.select(&header_selector) {
        let text = element_text(&element);
        if text.is_empty() {
            continue;
        }
        let tag = element.value().name();
        let level = match tag {
            "h1" => 0,
            "h2" => 1,
            _ => 2,
        };
        fields.insert(format!("{}.{}", tag, counts[level]), text);
        counts[level] += 1;
    }

    Ok(fields)
}

/// Extracts all valid links as absolute URLs, in document order, without duplicates
fn extract_links(document: &Html, base_url: &Url) -> Result<ExtractedFields, ExtractError> {
    let link_selector = selector("a[href]")?;
    let mut seen = HashSet::new();
    let mut fields = ExtractedFields::new();

    for element in document.select(&link_selector) {
        // Skip if it has the download attribute
        if element.value().attr("download").is_some() {
            continue;
        }

        if let Some(absolute_url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        {
            if seen.insert(absolute_url.clone()) {
                fields.insert(format!("link.{}", fields.len()), absolute_url);
            }
        }
    }

    Ok(fields)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
        Some(absolute_url.to_string())
    } else {
        None
    }
}

/// Extracts the text of every element matching a caller-supplied selector
fn extract_custom(document: &Html, css: &str) -> Result<ExtractedFields, ExtractError> {
    let parsed = selector(css)?;

    let mut fields = ExtractedFields::new();
    for element in document.select(&parsed) {
        let text = element_text(&element);
        if !text.is_empty() {
            fields.insert(format!("match.{}", fields.len()), text);
        }
    }
    Ok(fields)
}
