//! Terminal rendering for finished runs

use crate::health::{Alert, RunMetrics};
use crate::pipeline::RunReport;
use std::fmt::Write;

/// Renders the counters and finalization of a run
pub fn format_run_report(metrics: &RunMetrics) -> String {
    let c = &metrics.counters;
    let mut out = String::new();

    let _ = writeln!(out, "=== Run {} ===", metrics.run_id);
    let _ = writeln!(out, "Stage: {}", metrics.stage);
    let _ = writeln!(out, "Status: {}", metrics.status);
    if let Some(error) = &metrics.error_message {
        let _ = writeln!(out, "Error: {}", error);
    }
    let _ = writeln!(out, "Started: {}", metrics.run_start.to_rfc3339());
    if let Some(run_end) = metrics.run_end() {
        let _ = writeln!(out, "Finished: {}", run_end.to_rfc3339());
    }
    if let Some(duration) = metrics.duration_seconds() {
        let _ = writeln!(out, "Duration: {:.2}s", duration);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Discovery:");
    let _ = writeln!(out, "  Discovered: {}", c.urls_discovered);
    let _ = writeln!(out, "  Inserted: {}", c.urls_inserted);
    let _ = writeln!(out, "  Updated: {}", c.urls_updated);
    let _ = writeln!(out);

    let _ = writeln!(out, "Fetching:");
    let _ = writeln!(out, "  Success: {}", c.fetch_success);
    let _ = writeln!(out, "  Failed: {}", c.fetch_failed);
    let _ = writeln!(out, "  Timeout: {}", c.fetch_timeout);
    let _ = writeln!(out, "  Skipped: {}", c.fetch_skipped);
    if let Some(rate) = metrics.failure_rate_pct() {
        let _ = writeln!(out, "  Failure rate: {:.2}%", rate);
    }

    out
}

/// Renders alerts one per line, or a single line when there are none
pub fn format_alerts(alerts: &[Alert]) -> String {
    if alerts.is_empty() {
        return "No alerts raised\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Alerts ({}):", alerts.len());
    for alert in alerts {
        let _ = writeln!(
            out,
            "  [{}] {}: {}",
            alert.severity, alert.condition_name, alert.message
        );
    }
    out
}

/// Prints a finished run followed by its alerts
pub fn print_run_report(report: &RunReport) {
    println!("{}", format_run_report(&report.metrics));
    print!("{}", format_alerts(&report.alerts));
}

pub fn print_alerts(alerts: &[Alert]) {
    print!("{}", format_alerts(alerts));
}
