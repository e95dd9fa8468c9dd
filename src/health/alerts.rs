//! Alert derivation from finalized run metrics
//!
//! Each condition compares one measurement against the fixed thresholds in
//! [`AlertThresholds`]. Evaluation is pure apart from reading the clock for
//! alert timestamps and staleness.

use crate::config::AlertThresholds;
use crate::health::metrics::RunMetrics;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use tracing::info;
use uuid::Uuid;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "WARNING" => Some(Self::Warning),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of condition raised an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertCategory {
    FailureRate,
    EmptyResults,
    Performance,
    Staleness,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailureRate => "failure_rate",
            Self::EmptyResults => "empty_results",
            Self::Performance => "performance",
            Self::Staleness => "staleness",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "failure_rate" => Some(Self::FailureRate),
            "empty_results" => Some(Self::EmptyResults),
            "performance" => Some(Self::Performance),
            "staleness" => Some(Self::Staleness),
            _ => None,
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable condition tags
pub mod conditions {
    pub const FAILURE_RATE_CRITICAL: &str = "failure_rate_critical";
    pub const FAILURE_RATE_WARNING: &str = "failure_rate_warning";
    pub const EMPTY_RESULT_SET: &str = "empty_result_set";
    pub const PERFORMANCE_DEGRADATION: &str = "performance_degradation";
    pub const NO_COMPLETED_RUNS: &str = "no_completed_runs";
    pub const PIPELINE_STALE_CRITICAL: &str = "pipeline_stale_critical";
    pub const PIPELINE_STALE_WARNING: &str = "pipeline_stale_warning";
}

/// One raised condition
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub alert_id: String,
    /// Staleness alerts are not tied to a run
    pub run_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub severity: Severity,
    pub category: AlertCategory,
    pub condition_name: String,
    pub message: String,
    pub metric_value: Option<f64>,
    pub threshold: Option<f64>,
}

impl Alert {
    fn new(
        run_id: Option<&str>,
        severity: Severity,
        category: AlertCategory,
        condition_name: &str,
        message: String,
        metric_value: Option<f64>,
        threshold: Option<f64>,
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4().to_string(),
            run_id: run_id.map(str::to_string),
            created_at: Utc::now(),
            severity,
            category,
            condition_name: condition_name.to_string(),
            message,
            metric_value,
            threshold,
        }
    }
}

/// Derives alerts from run metrics and history
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    thresholds: AlertThresholds,
}

impl AlertEvaluator {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Evaluates the per-run conditions
    ///
    /// Returns, in order: at most one failure-rate alert, an empty-result alert,
    /// and a performance alert. The performance condition is only checked when
    /// the run has a duration and `historical_avg_duration` is positive.
    pub fn evaluate_alerts(
        &self,
        metrics: &RunMetrics,
        historical_avg_duration: Option<f64>,
    ) -> Vec<Alert> {
        let t = &self.thresholds;
        let run_id = Some(metrics.run_id.as_str());
        let mut alerts = Vec::new();

        let failure_rate = metrics.failure_rate_pct().unwrap_or(0.0);
        if failure_rate >= t.failure_rate_critical {
            alerts.push(Alert::new(
                run_id,
                Severity::Critical,
                AlertCategory::FailureRate,
                conditions::FAILURE_RATE_CRITICAL,
                format!(
                    "Failure rate {:.1}% exceeds critical threshold ({:.1}%)",
                    failure_rate, t.failure_rate_critical
                ),
                Some(failure_rate),
                Some(t.failure_rate_critical),
            ));
        } else if failure_rate >= t.failure_rate_warning {
            alerts.push(Alert::new(
                run_id,
                Severity::Warning,
                AlertCategory::FailureRate,
                conditions::FAILURE_RATE_WARNING,
                format!(
                    "Failure rate {:.1}% exceeds warning threshold ({:.1}%)",
                    failure_rate, t.failure_rate_warning
                ),
                Some(failure_rate),
                Some(t.failure_rate_warning),
            ));
        }

        let total_rows = metrics.counters.total_rows();
        if total_rows < t.empty_result_min_rows {
            alerts.push(Alert::new(
                run_id,
                Severity::Critical,
                AlertCategory::EmptyResults,
                conditions::EMPTY_RESULT_SET,
                format!(
                    "Pipeline produced {} rows (minimum expected: {})",
                    total_rows, t.empty_result_min_rows
                ),
                Some(total_rows as f64),
                Some(t.empty_result_min_rows as f64),
            ));
        }

        if let (Some(duration), Some(avg)) = (metrics.duration_seconds(), historical_avg_duration)
        {
            if avg > 0.0 {
                let ratio = duration / avg;
                if ratio >= t.performance_degradation_factor {
                    alerts.push(Alert::new(
                        run_id,
                        Severity::Warning,
                        AlertCategory::Performance,
                        conditions::PERFORMANCE_DEGRADATION,
                        format!(
                            "Run took {:.1}s, {:.1}x the historical average ({:.1}s)",
                            duration, ratio, avg
                        ),
                        Some(duration),
                        Some(avg * t.performance_degradation_factor),
                    ));
                }
            }
        }

        for alert in &alerts {
            info!(
                run_id = %metrics.run_id,
                severity = %alert.severity,
                condition = %alert.condition_name,
                "{}",
                alert.message
            );
        }

        alerts
    }

    /// Checks how long ago the last completed run ended, against the current time
    pub fn evaluate_staleness_alert(&self, last_run_end: Option<DateTime<Utc>>) -> Vec<Alert> {
        self.evaluate_staleness_alert_at(last_run_end, Utc::now())
    }

    /// Checks staleness against a fixed `now`
    ///
    /// No completed run at all is critical. Otherwise the age in hours is
    /// compared with the critical threshold first, then the warning threshold.
    pub fn evaluate_staleness_alert_at(
        &self,
        last_run_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let t = &self.thresholds;

        let Some(last_run_end) = last_run_end else {
            info!("No completed pipeline runs found");
            return vec![Alert::new(
                None,
                Severity::Critical,
                AlertCategory::Staleness,
                conditions::NO_COMPLETED_RUNS,
                "No completed pipeline runs found".to_string(),
                None,
                None,
            )];
        };

        let hours_since = (now - last_run_end).num_milliseconds() as f64 / 3_600_000.0;

        let alert = if hours_since >= t.staleness_critical_hours {
            Some(Alert::new(
                None,
                Severity::Critical,
                AlertCategory::Staleness,
                conditions::PIPELINE_STALE_CRITICAL,
                format!(
                    "Last successful run was {:.1}h ago (critical threshold: {}h)",
                    hours_since, t.staleness_critical_hours
                ),
                Some(hours_since),
                Some(t.staleness_critical_hours),
            ))
        } else if hours_since >= t.staleness_warning_hours {
            Some(Alert::new(
                None,
                Severity::Warning,
                AlertCategory::Staleness,
                conditions::PIPELINE_STALE_WARNING,
                format!(
                    "Last successful run was {:.1}h ago (warning threshold: {}h)",
                    hours_since, t.staleness_warning_hours
                ),
                Some(hours_since),
                Some(t.staleness_warning_hours),
            ))
        } else {
            None
        };

        if let Some(alert) = &alert {
            info!(severity = %alert.severity, condition = %alert.condition_name, "{}", alert.message);
        }
        alert.into_iter().collect()
    }
}

/// Parses a stored run timestamp
///
/// Accepts RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS[.f]` (space or `T`
/// separated) which is taken to already be UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
