//! Deterministic fetcher and extractor for dry runs and tests
//!
//! Both support injected latency and targeted failures, and both record how
//! many calls were in flight at once, which makes the pool's concurrency cap
//! observable from the outside.

use crate::crawler::fetcher::{FetchError, FetchedPage, Fetcher};
use crate::crawler::parser::{ExtractError, Extractor};
use crate::state::{ExtractedFields, ExtractionMode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Fetcher that serves canned pages without touching the network
#[derive(Debug, Default)]
pub struct MockFetcher {
    latency: Duration,
    pages: HashMap<String, String>,
    failing: Vec<String>,
    fail_every: Option<usize>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every fetch by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Serves `body` for `url` instead of the generated page
    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }

    /// Fails every fetch whose URL contains `needle`
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.failing.push(needle.into());
        self
    }

    /// Fails every `n`th call (1-based)
    pub fn fail_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Total number of fetches started
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn should_fail(&self, url: &str, call: usize) -> bool {
        self.failing.iter().any(|needle| url.contains(needle.as_str()))
            || self.fail_every.is_some_and(|n| call % n == 0)
    }
}

/// Decrements the in-flight counter even if the fetch future is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.should_fail(url, call) {
            return Err(FetchError::Network {
                url: url.to_string(),
                message: "simulated connection reset".to_string(),
            });
        }

        let body = self.pages.get(url).cloned().unwrap_or_else(|| {
            format!(
                "<html><head><title>Mock page for {url}</title>\
                 <meta name=\"description\" content=\"Generated content\"></head>\
                 <body><h1>{url}</h1><a href=\"/about\">About</a></body></html>"
            )
        });
        Ok(FetchedPage::ok(url, body))
    }
}

/// Extractor that reports the page URL and mode without parsing anything
#[derive(Debug, Default)]
pub struct MockExtractor {
    latency: Duration,
    failing: Vec<String>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks the extracting thread for `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails extraction for pages whose URL contains `needle`
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.failing.push(needle.into());
        self
    }

    /// Extractions currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of extractions observed running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Extractor for MockExtractor {
    fn extract(
        &self,
        page: &FetchedPage,
        mode: &ExtractionMode,
    ) -> Result<ExtractedFields, ExtractError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if self
            .failing
            .iter()
            .any(|needle| page.url.contains(needle.as_str()))
        {
            return Err(ExtractError::Failed(format!(
                "no {} found on {}",
                mode.name(),
                page.url
            )));
        }
        Ok([("url", page.url.clone()), ("mode", mode.name().to_string())]
            .into_iter()
            .collect())
    }
}
