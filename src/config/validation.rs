use crate::config::types::{Config, EventConfig, MetricsConfig, PoolConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound on the worker pool size
pub const MAX_CONCURRENCY_LIMIT: usize = 10_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pool_config(&config.pool)?;
    validate_metrics_config(&config.metrics)?;
    validate_event_config(&config.events)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

/// Validates a concurrency cap, shared with runtime reconfiguration
pub fn validate_concurrency(max_concurrency: usize) -> Result<(), ConfigError> {
    if max_concurrency < 1 || max_concurrency > MAX_CONCURRENCY_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY_LIMIT, max_concurrency
        )));
    }
    Ok(())
}

fn validate_pool_config(config: &PoolConfig) -> Result<(), ConfigError> {
    validate_concurrency(config.max_concurrency)?;

    if config.fetch_timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "fetch_timeout_ms must be >= 1".to_string(),
        ));
    }

    if config.job_timeout_ms < config.fetch_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "job_timeout_ms ({}) must be >= fetch_timeout_ms ({})",
            config.job_timeout_ms, config.fetch_timeout_ms
        )));
    }

    Ok(())
}

fn validate_metrics_config(config: &MetricsConfig) -> Result<(), ConfigError> {
    if config.throughput_window_secs < 1 {
        return Err(ConfigError::Validation(
            "throughput_window_secs must be >= 1".to_string(),
        ));
    }

    if config.aggregation_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "aggregation_interval_ms must be >= 10ms, got {}ms",
            config.aggregation_interval_ms
        )));
    }

    Ok(())
}

fn validate_event_config(config: &EventConfig) -> Result<(), ConfigError> {
    if config.log_capacity < 1 {
        return Err(ConfigError::Validation(
            "log_capacity must be >= 1".to_string(),
        ));
    }

    if config.broadcast_capacity < 1 {
        return Err(ConfigError::Validation(
            "broadcast_capacity must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
