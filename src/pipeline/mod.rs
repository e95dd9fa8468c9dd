//! Pipeline module driving ingestion runs
//!
//! This module ties the other pieces together:
//! - Merging discovered URLs into the document table
//! - Fetching each location under the retry and pacing policy
//! - Skipping locations with a long failure streak
//! - Finalizing, evaluating and persisting run metrics and alerts

mod driver;

pub use driver::{IngestPipeline, RunReport};
