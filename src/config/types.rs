use serde::Deserialize;
use std::time::Duration;

/// Longest single backoff pause; larger computed waits are clamped to it
pub const MAX_BACKOFF_SECS: u64 = 3600;

/// Main configuration structure for doc-ingest
///
/// Every section is optional; missing sections and keys fall back to the
/// production defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub alerts: AlertThresholds,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub discovery: DiscoveryConfig,
}

/// Fetch engine policy: retries, pacing, size cap and request identity
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-attempt HTTP timeout (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Wait before attempt `k` is `backoff_base^k` seconds
    #[serde(rename = "backoff-base")]
    pub backoff_base: f64,

    /// Pause after every successful fetch (milliseconds)
    #[serde(rename = "throttle-delay-ms")]
    pub throttle_delay_ms: u64,

    /// Maximum retained body size in bytes
    #[serde(rename = "max-content-size")]
    pub max_content_size: usize,

    /// Size of the chunks the body is consumed in
    #[serde(rename = "chunk-size")]
    pub chunk_size: usize,

    /// Statuses that are retried rather than treated as a rejection
    #[serde(rename = "transient-status-codes")]
    pub transient_status_codes: Vec<u16>,

    #[serde(rename = "user-agent")]
    pub user_agent: String,

    pub accept: String,
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }

    /// Backoff slept before attempt `attempt` (never called for attempt 0)
    ///
    /// Clamped to [`MAX_BACKOFF_SECS`], so an unvalidated base or retry count
    /// yields a long pause rather than an overflow.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let ceiling = Duration::from_secs(MAX_BACKOFF_SECS);
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_base.powi(exponent))
            .map_or(ceiling, |delay| delay.min(ceiling))
    }

    pub fn is_transient(&self, status: u16) -> bool {
        self.transient_status_codes.contains(&status)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_retries: 3,
            backoff_base: 2.0,
            throttle_delay_ms: 300,
            max_content_size: 5 * 1024 * 1024,
            chunk_size: 64 * 1024,
            transient_status_codes: vec![408, 429, 500, 502, 503, 504],
            user_agent: "Mozilla/5.0 (compatible; DocIngestionBot/1.0)".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .to_string(),
        }
    }
}

/// Fixed alert thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Failure rate (percent) that raises a warning
    #[serde(rename = "failure-rate-warning")]
    pub failure_rate_warning: f64,

    /// Failure rate (percent) that raises a critical alert
    #[serde(rename = "failure-rate-critical")]
    pub failure_rate_critical: f64,

    #[serde(rename = "staleness-warning-hours")]
    pub staleness_warning_hours: f64,

    #[serde(rename = "staleness-critical-hours")]
    pub staleness_critical_hours: f64,

    /// Fewer inserted + updated rows than this is an empty result set
    #[serde(rename = "empty-result-min-rows")]
    pub empty_result_min_rows: u64,

    /// Duration over this multiple of the historical average is degraded
    #[serde(rename = "performance-degradation-factor")]
    pub performance_degradation_factor: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            failure_rate_warning: 10.0,
            failure_rate_critical: 25.0,
            staleness_warning_hours: 24.0,
            staleness_critical_hours: 72.0,
            empty_result_min_rows: 1,
            performance_degradation_factor: 2.0,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Number of recent completed runs averaged into the duration baseline
    #[serde(rename = "history-window")]
    pub history_window: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./doc-ingest.db".to_string(),
            history_window: 10,
        }
    }
}

/// Driver settings for an ingestion run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Label recorded on the run metrics
    pub stage: String,

    /// Locations that failed this many times in a row are skipped
    #[serde(rename = "max-consecutive-failures")]
    pub max_consecutive_failures: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stage: "ingest".to_string(),
            max_consecutive_failures: 5,
        }
    }
}

/// Sitemap discovery settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Pause after each child sitemap of an index (milliseconds)
    #[serde(rename = "child-delay-ms")]
    pub child_delay_ms: u64,

    /// Sitemap indexes nested deeper than this are not followed
    #[serde(rename = "max-depth")]
    pub max_depth: usize,
}

impl DiscoveryConfig {
    pub fn child_delay(&self) -> Duration {
        Duration::from_millis(self.child_delay_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            child_delay_ms: 200,
            max_depth: 5,
        }
    }
}
