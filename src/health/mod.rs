//! Run health: metrics lifecycle and alert evaluation
//!
//! - `RunMetrics`: one record per pipeline run, finalized exactly once
//! - `AlertEvaluator`: derives alerts from finalized metrics and history
//!
//! | Condition | Warning | Critical |
//! |-----------|---------|----------|
//! | failure rate (%) | 10.0 | 25.0 |
//! | staleness (hours) | 24 | 72 |
//! | empty-result minimum rows | - | 1 |
//! | performance degradation factor | 2.0x | - |

mod alerts;
mod metrics;

pub use alerts::{conditions, parse_timestamp, Alert, AlertCategory, AlertEvaluator, Severity};
pub use metrics::{RunCounters, RunFinalization, RunMetrics, RunStatus};
