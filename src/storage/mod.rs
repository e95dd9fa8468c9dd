//! Storage module for persisting ingestion data
//!
//! This module handles all database operations for the pipeline, including:
//! - SQLite database initialization and schema management
//! - Discovered document and fetched content persistence
//! - Run metrics and alert records
//! - Run history queries used as alert baselines

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::fetch::FetchStatus;
use crate::IngestError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(IngestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, IngestError> {
    SqliteStorage::new(path)
}

/// Represents a discovered document in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub location: String,
    pub last_modified: Option<String>,
    /// Distinct source sitemaps, sorted
    pub sources: Vec<String>,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

/// Represents the latest fetched content for a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub location: String,
    pub content: Option<String>,
    pub content_digest: Option<String>,
    pub size_bytes: u64,
    pub http_status: Option<u16>,
    pub fetch_status: FetchStatus,
    pub retry_count: u32,
    pub consecutive_failures: u32,
    pub first_fetched_at: String,
    pub last_fetched_at: String,
    pub last_success_at: Option<String>,
}

/// Formats a timestamp for storage
///
/// Fixed-width RFC 3339 in UTC, so stored values sort chronologically as text.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}
