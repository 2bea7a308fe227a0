//! Integration tests for the worker pool
//!
//! `pool_tests` drive the scheduler through the mock fetcher and extractor;
//! `http_tests` use wiremock to exercise the HTTP fetcher end-to-end.

mod http_tests;
mod pool_tests;

use std::sync::Arc;
use std::time::Duration;
use swarm_scraper::config::Config;
use swarm_scraper::crawler::{Extractor, Fetcher, Scheduler};

/// Creates a test configuration with the given concurrency cap
pub fn test_config(max_concurrency: usize) -> Config {
    let mut config = Config::default();
    config.pool.max_concurrency = max_concurrency;
    config.pool.fetch_timeout_ms = 2_000;
    config.pool.job_timeout_ms = 5_000;
    config.events.broadcast_capacity = 8_192;
    config
}

pub fn scheduler(
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
) -> Scheduler {
    Scheduler::new(config, fetcher, extractor).expect("Failed to create scheduler")
}

/// Waits for the pool to go idle, failing the test if it takes too long
pub async fn settle(scheduler: &Scheduler) {
    tokio::time::timeout(Duration::from_secs(20), scheduler.wait_idle())
        .await
        .expect("Pool did not go idle in time");
}
