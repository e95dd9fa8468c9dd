//! Output module for reporting runs and stored statistics
//!
//! This module handles:
//! - Rendering a finished run and its alerts for the terminal
//! - Summarizing the database contents for `--stats`

mod report;
pub mod stats;

pub use report::{format_alerts, format_run_report, print_alerts, print_run_report};
pub use stats::{load_statistics, print_statistics, IngestStatistics};
