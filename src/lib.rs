//! doc-ingest: resilient document fetching with run-health alerting
//!
//! This crate fetches documents discovered from a sitemap under strict size and
//! politeness limits, folds the outcomes into per-run metrics, and raises alerts
//! when a run looks unhealthy compared with fixed thresholds and recent history.

pub mod config;
pub mod discovery;
pub mod fetch;
pub mod health;
pub mod output;
pub mod pipeline;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for doc-ingest operations
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for doc-ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use fetch::{FetchOutcome, FetchStatus, Fetcher};
pub use health::{Alert, AlertEvaluator, RunMetrics, RunStatus};
pub use pipeline::IngestPipeline;
