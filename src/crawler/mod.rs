//! Worker pool for scraping jobs
//!
//! This module contains the core engine, including:
//! - The `Scheduler` handle: submission, admission and pool control
//! - Per-job executors with timeouts and cooperative cancellation
//! - The `Fetcher` and `Extractor` seams with HTTP/HTML implementations
//! - Deterministic mocks for dry runs and tests

mod coordinator;
mod fetcher;
pub mod mock;
mod parser;
mod scheduler;

pub use fetcher::{build_http_client, FetchError, FetchedPage, Fetcher, HttpFetcher};
pub use parser::{ExtractError, Extractor, HtmlExtractor};
pub use scheduler::{Scheduler, WorkerSlot};
