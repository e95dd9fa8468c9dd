use crate::config::types::{
    AlertThresholds, Config, DiscoveryConfig, FetchConfig, IngestConfig, StorageConfig,
    MAX_BACKOFF_SECS,
};
use crate::ConfigError;
use reqwest::header::HeaderValue;

/// Retries beyond this stretch a single fetch past several minutes of backoff
const MAX_RETRIES_LIMIT: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_alert_thresholds(&config.alerts)?;
    validate_storage_config(&config.storage)?;
    validate_ingest_config(&config.ingest)?;
    validate_discovery_config(&config.discovery)?;
    Ok(())
}

/// Validates fetch engine configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_retries > MAX_RETRIES_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= {}, got {}",
            MAX_RETRIES_LIMIT, config.max_retries
        )));
    }

    if !config.backoff_base.is_finite() || config.backoff_base < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff_base must be >= 1.0, got {}",
            config.backoff_base
        )));
    }

    let longest_backoff = config.backoff_base.powi(config.max_retries as i32);
    if longest_backoff > MAX_BACKOFF_SECS as f64 {
        return Err(ConfigError::Validation(format!(
            "backoff_base^max_retries must be <= {} seconds, got {}",
            MAX_BACKOFF_SECS, longest_backoff
        )));
    }

    if config.chunk_size == 0 || config.max_content_size == 0 {
        return Err(ConfigError::Validation(
            "chunk_size and max_content_size must be >= 1".to_string(),
        ));
    }

    if config.chunk_size > config.max_content_size {
        return Err(ConfigError::Validation(format!(
            "chunk_size ({}) cannot exceed max_content_size ({})",
            config.chunk_size, config.max_content_size
        )));
    }

    if let Some(code) = config
        .transient_status_codes
        .iter()
        .find(|code| !(400..=599).contains(*code))
    {
        return Err(ConfigError::Validation(format!(
            "transient status codes must be HTTP errors (400-599), got {}",
            code
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    for (name, value) in [("user_agent", &config.user_agent), ("accept", &config.accept)] {
        if HeaderValue::from_str(value).is_err() {
            return Err(ConfigError::Validation(format!(
                "{} is not a valid header value: {:?}",
                name, value
            )));
        }
    }

    Ok(())
}

/// Validates alert thresholds
fn validate_alert_thresholds(config: &AlertThresholds) -> Result<(), ConfigError> {
    if config.failure_rate_warning >= config.failure_rate_critical {
        return Err(ConfigError::Validation(format!(
            "failure_rate_warning ({}) must be below failure_rate_critical ({})",
            config.failure_rate_warning, config.failure_rate_critical
        )));
    }

    if config.staleness_warning_hours >= config.staleness_critical_hours {
        return Err(ConfigError::Validation(format!(
            "staleness_warning_hours ({}) must be below staleness_critical_hours ({})",
            config.staleness_warning_hours, config.staleness_critical_hours
        )));
    }

    if config.performance_degradation_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "performance_degradation_factor must be >= 1.0, got {}",
            config.performance_degradation_factor
        )));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.history_window == 0 {
        return Err(ConfigError::Validation(
            "history_window must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates ingestion driver configuration
fn validate_ingest_config(config: &IngestConfig) -> Result<(), ConfigError> {
    if config.stage.trim().is_empty() {
        return Err(ConfigError::Validation("stage cannot be empty".to_string()));
    }

    if config.max_consecutive_failures == 0 {
        return Err(ConfigError::Validation(
            "max_consecutive_failures must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates sitemap discovery configuration
fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    if config.max_depth == 0 {
        return Err(ConfigError::Validation(
            "max_depth must be >= 1".to_string(),
        ));
    }

    Ok(())
}
