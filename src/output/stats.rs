//! Statistics generation from the ingestion database
//!
//! This module provides functionality for extracting and displaying
//! ingestion statistics from the storage layer.

use crate::fetch::FetchStatus;
use crate::storage::Storage;
use crate::IngestError;
use chrono::{DateTime, Utc};

/// Ingestion statistics summary
#[derive(Debug, Clone, PartialEq)]
pub struct IngestStatistics {
    /// Total number of documents ever discovered
    pub total_documents: u64,

    /// Content rows whose last fetch succeeded
    pub content_success: u64,

    /// Content rows whose last fetch failed
    pub content_failed: u64,

    /// Content rows whose last fetch timed out
    pub content_timeout: u64,

    /// End of the most recent completed run
    pub last_completed_run_end: Option<DateTime<Utc>>,

    /// Mean duration of the recent completed runs
    pub historical_avg_duration: Option<f64>,
}

impl IngestStatistics {
    /// Documents that have a content row at all
    pub fn total_fetched(&self) -> u64 {
        self.content_success + self.content_failed + self.content_timeout
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `history_window` - How many completed runs feed the duration average
///
/// # Returns
///
/// * `Ok(IngestStatistics)` - Successfully loaded statistics
/// * `Err(IngestError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn Storage,
    history_window: usize,
) -> Result<IngestStatistics, IngestError> {
    Ok(IngestStatistics {
        total_documents: storage.count_documents()?,
        content_success: storage.count_content_by_status(FetchStatus::Success)?,
        content_failed: storage.count_content_by_status(FetchStatus::Failed)?,
        content_timeout: storage.count_content_by_status(FetchStatus::Timeout)?,
        last_completed_run_end: storage.last_completed_run_end()?,
        historical_avg_duration: storage.historical_avg_duration(history_window)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &IngestStatistics) {
    println!("=== Ingestion Statistics ===\n");

    println!("Overview:");
    println!("  Documents discovered: {}", stats.total_documents);
    println!("  Documents fetched: {}", stats.total_fetched());
    println!();

    println!("Content by Last Fetch:");
    let fetched = stats.total_fetched();
    for (label, count) in [
        ("success", stats.content_success),
        ("failed", stats.content_failed),
        ("timeout", stats.content_timeout),
    ] {
        let percentage = if fetched > 0 {
            (count as f64 / fetched as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", label, count, percentage);
    }
    println!();

    println!("Run History:");
    match stats.last_completed_run_end {
        Some(end) => println!("  Last completed run: {}", end.to_rfc3339()),
        None => println!("  Last completed run: never"),
    }
    match stats.historical_avg_duration {
        Some(avg) => println!("  Average duration: {:.2}s", avg),
        None => println!("  Average duration: n/a"),
    }
}
