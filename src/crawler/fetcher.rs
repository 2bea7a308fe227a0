//! Fetcher abstraction and the HTTP implementation
//!
//! This module handles content retrieval for the worker pool, including:
//! - The `Fetcher` trait every executor calls through
//! - Building HTTP clients with proper user agent strings and timeouts
//! - GET requests and status classification
//! - Mapping transport failures onto job error kinds

use crate::config::{PoolConfig, UserAgentConfig};
use crate::state::{ErrorKind, JobError};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;

/// Raw content retrieved for a job
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects; used to resolve relative links
    pub url: String,

    /// HTTP status code (200 for non-HTTP fetchers)
    pub status_code: u16,

    /// Content-Type header value, if any
    pub content_type: Option<String>,

    /// Page body
    pub body: String,
}

impl FetchedPage {
    /// Builds a page for a plain 200 response
    pub fn ok(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_code: 200,
            content_type: Some("text/html".to_string()),
            body: body.into(),
        }
    }
}

/// Errors a fetcher can report
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} timed out after {elapsed_ms}ms")]
    Timeout { url: String, elapsed_ms: u64 },

    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    /// Returns the job error kind this failure maps to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Network { .. } | Self::Status { .. } => ErrorKind::NetworkError,
        }
    }
}

impl From<FetchError> for JobError {
    fn from(err: FetchError) -> Self {
        JobError::new(err.kind(), err.to_string())
    }
}

/// Retrieves the raw content of a URL
///
/// Implementations are shared by every executor in the pool and must be safe to
/// call concurrently without shared mutable state between calls. The scheduler
/// enforces its own per-fetch deadline around every call; implementations may
/// also enforce one internally and report it as `FetchError::Timeout`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `timeout` - Deadline applied to every request
///
/// # Example
///
/// ```no_run
/// use swarm_scraper::config::UserAgentConfig;
/// use swarm_scraper::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher using the pool's per-fetch timeout
    ///
    /// Fails with [`crate::ScrapeError::Reqwest`] when the TLS backend cannot be set up.
    pub fn new(user_agent: &UserAgentConfig, pool: &PoolConfig) -> crate::Result<Self> {
        let timeout = pool.fetch_timeout();
        Ok(Self {
            client: build_http_client(user_agent, timeout)?,
            timeout,
        })
    }

    /// Wraps an existing client
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                elapsed_ms: self.timeout.as_millis() as u64,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(FetchError::Status {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(|e| self.classify(url, e))?;

        Ok(FetchedPage {
            url: final_url,
            status_code: status.as_u16(),
            content_type,
            body,
        })
    }
}
