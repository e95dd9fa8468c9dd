//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::discovery::DiscoveredUrl;
use crate::fetch::{FetchOutcome, FetchStatus};
use crate::health::{Alert, RunMetrics};
use crate::storage::{ContentRecord, DocumentRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid stored timestamp: {0}")]
    Timestamp(String),

    #[error("Invalid stored value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This is everything the ingestion pipeline needs from persistence: the run
/// history used for alert baselines, the sinks for finalized metrics and
/// alerts, and the document/content tables fed by discovery and fetching.
pub trait Storage {
    // ===== Run Metrics =====

    /// Inserts or replaces the metrics row for a run
    fn save_metrics(&mut self, metrics: &RunMetrics) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: &str) -> StorageResult<Option<RunMetrics>>;

    /// End time of the most recent run with status `completed`
    fn last_completed_run_end(&self) -> StorageResult<Option<DateTime<Utc>>>;

    /// Durations of the most recent completed runs, newest first
    ///
    /// Only runs with status `completed` and a recorded duration count.
    fn recent_completed_durations(&self, limit: usize) -> StorageResult<Vec<f64>>;

    /// Mean of [`Storage::recent_completed_durations`], or `None` without history
    fn historical_avg_duration(&self, limit: usize) -> StorageResult<Option<f64>> {
        let durations = self.recent_completed_durations(limit)?;
        if durations.is_empty() {
            return Ok(None);
        }
        Ok(Some(durations.iter().sum::<f64>() / durations.len() as f64))
    }

    // ===== Alerts =====

    /// Stores alerts; an empty slice touches nothing
    fn save_alerts(&mut self, alerts: &[Alert]) -> StorageResult<()>;

    /// Gets alerts for a run, or the run-less (staleness) alerts for `None`
    fn get_alerts(&self, run_id: Option<&str>) -> StorageResult<Vec<Alert>>;

    // ===== Documents =====

    /// Merges discovered locations into the document table
    ///
    /// # Returns
    ///
    /// `(inserted, updated)` row counts
    fn upsert_discovered(&mut self, urls: &[DiscoveredUrl]) -> StorageResult<(u64, u64)>;

    /// Gets a document by location
    fn get_document(&self, location: &str) -> StorageResult<Option<DocumentRecord>>;

    /// Gets total document count
    fn count_documents(&self) -> StorageResult<u64>;

    // ===== Content =====

    /// Records the outcome of fetching a location
    ///
    /// A success replaces the stored content and resets the failure streak;
    /// a failure keeps the previous content and extends the streak.
    fn record_fetch(&mut self, location: &str, outcome: &FetchOutcome) -> StorageResult<()>;

    /// Current failure streak for a location (0 if never fetched)
    fn consecutive_failures(&self, location: &str) -> StorageResult<u32>;

    /// Gets the content record for a location
    fn get_content(&self, location: &str) -> StorageResult<Option<ContentRecord>>;

    /// Counts content rows by their last fetch status
    fn count_content_by_status(&self, status: FetchStatus) -> StorageResult<u64>;
}
