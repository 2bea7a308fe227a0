use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Swarm-Scraper
///
/// Every section is optional in the TOML file; missing sections and keys fall
/// back to their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    pub metrics: MetricsConfig,
    pub events: EventConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// Worker pool behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of jobs in Fetching or Processing at once
    #[serde(rename = "max-concurrency")]
    pub max_concurrency: usize,

    /// Deadline for a single fetch (milliseconds)
    #[serde(rename = "fetch-timeout-ms")]
    pub fetch_timeout_ms: u64,

    /// Deadline for a whole job, fetch and extraction together (milliseconds)
    #[serde(rename = "job-timeout-ms")]
    pub job_timeout_ms: u64,
}

impl PoolConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 40,
            fetch_timeout_ms: 10_000,
            job_timeout_ms: 30_000,
        }
    }
}

/// Metrics aggregation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Sliding window used for throughput (seconds)
    #[serde(rename = "throughput-window-secs")]
    pub throughput_window_secs: u64,

    /// How often progress is reported (milliseconds)
    #[serde(rename = "aggregation-interval-ms")]
    pub aggregation_interval_ms: u64,
}

impl MetricsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.throughput_window_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.aggregation_interval_ms)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            throughput_window_secs: 60,
            aggregation_interval_ms: 1_000,
        }
    }
}

/// Event log and stream configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Number of log entries retained before the oldest are evicted
    #[serde(rename = "log-capacity")]
    pub log_capacity: usize,

    /// Per-subscriber buffer of the event stream
    #[serde(rename = "broadcast-capacity")]
    pub broadcast_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            log_capacity: 200,
            broadcast_capacity: 1_024,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the scraper
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the scraper
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the scraper
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for scraper-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SwarmScraper".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}
