//! Run-level metrics and their lifecycle
//!
//! A run starts as `running`, accumulates counters while the driver works, and
//! is finalized exactly once.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Counters mutated by the driver as work completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub urls_discovered: u64,
    pub urls_inserted: u64,
    pub urls_updated: u64,
    pub fetch_success: u64,
    pub fetch_failed: u64,
    pub fetch_timeout: u64,
    pub fetch_skipped: u64,
}

impl RunCounters {
    /// Fetches that reached a terminal outcome (skips excluded)
    pub fn total_fetches(&self) -> u64 {
        self.fetch_success + self.fetch_failed + self.fetch_timeout
    }

    /// Rows written to the master table
    pub fn total_rows(&self) -> u64 {
        self.urls_inserted + self.urls_updated
    }

    /// `(failed + timeout) / total * 100`, rounded to 2 decimals; 0 with no fetches
    pub fn failure_rate_pct(&self) -> f64 {
        let total = self.total_fetches();
        if total == 0 {
            return 0.0;
        }
        round2((self.fetch_failed + self.fetch_timeout) as f64 / total as f64 * 100.0)
    }
}

/// Values that only exist once a run has been finalized
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunFinalization {
    pub run_end: DateTime<Utc>,
    pub duration_seconds: f64,
    pub failure_rate_pct: f64,
}

/// Metrics for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct RunMetrics {
    pub run_id: String,
    pub run_start: DateTime<Utc>,
    pub stage: String,
    pub counters: RunCounters,
    pub status: RunStatus,
    pub error_message: Option<String>,
    finalization: Option<RunFinalization>,
}

impl RunMetrics {
    /// Begins a new run with a fresh id, zeroed counters and status `running`
    pub fn start(stage: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            run_start: Utc::now(),
            stage: stage.into(),
            counters: RunCounters::default(),
            status: RunStatus::Running,
            error_message: None,
            finalization: None,
        }
    }

    /// Rebuilds metrics from stored values
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        run_id: String,
        run_start: DateTime<Utc>,
        stage: String,
        counters: RunCounters,
        status: RunStatus,
        error_message: Option<String>,
        finalization: Option<RunFinalization>,
    ) -> Self {
        Self {
            run_id,
            run_start,
            stage,
            counters,
            status,
            error_message,
            finalization,
        }
    }

    /// Finalizes the run
    ///
    /// Stamps `run_end`, computes the duration and failure rate, and moves a
    /// `running` run to `completed`. Any other status is left untouched.
    /// Calling this again recomputes the end time and duration.
    pub fn finish(&mut self) -> &mut Self {
        let run_end = Utc::now();
        let elapsed = (run_end - self.run_start).num_microseconds().unwrap_or(i64::MAX) as f64
            / 1_000_000.0;

        self.finalization = Some(RunFinalization {
            run_end,
            duration_seconds: round2(elapsed.max(0.0)),
            failure_rate_pct: self.counters.failure_rate_pct(),
        });

        if self.status == RunStatus::Running {
            self.status = RunStatus::Completed;
        }
        self
    }

    /// Marks a running run failed; `finish` keeps this status
    ///
    /// Has no effect once the run has left `Running` or been finalized, so a
    /// completed run never turns failed and the first error message is kept.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        if self.status != RunStatus::Running || self.is_finalized() {
            return;
        }
        self.status = RunStatus::Failed;
        self.error_message = Some(message.into());
    }

    pub fn is_finalized(&self) -> bool {
        self.finalization.is_some()
    }

    pub fn finalization(&self) -> Option<&RunFinalization> {
        self.finalization.as_ref()
    }

    pub fn run_end(&self) -> Option<DateTime<Utc>> {
        self.finalization.map(|f| f.run_end)
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.finalization.map(|f| f.duration_seconds)
    }

    pub fn failure_rate_pct(&self) -> Option<f64> {
        self.finalization.map(|f| f.failure_rate_pct)
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
