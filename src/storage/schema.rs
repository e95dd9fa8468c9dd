//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the doc-ingest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Every location ever discovered
CREATE TABLE IF NOT EXISTS documents (
    location TEXT PRIMARY KEY,
    last_modified TEXT,
    sources TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL
);

-- Latest fetched content per location
CREATE TABLE IF NOT EXISTS document_content (
    location TEXT PRIMARY KEY,
    content TEXT,
    content_digest TEXT,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    http_status INTEGER,
    fetch_status TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    first_fetched_at TEXT NOT NULL,
    last_fetched_at TEXT NOT NULL,
    last_success_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_content_status ON document_content(fetch_status);

-- Run-level statistics
CREATE TABLE IF NOT EXISTS pipeline_metrics (
    run_id TEXT PRIMARY KEY,
    run_start TEXT NOT NULL,
    run_end TEXT,
    duration_seconds REAL,
    stage TEXT NOT NULL,
    urls_discovered INTEGER NOT NULL DEFAULT 0,
    urls_inserted INTEGER NOT NULL DEFAULT 0,
    urls_updated INTEGER NOT NULL DEFAULT 0,
    fetch_success INTEGER NOT NULL DEFAULT 0,
    fetch_failed INTEGER NOT NULL DEFAULT 0,
    fetch_timeout INTEGER NOT NULL DEFAULT 0,
    fetch_skipped INTEGER NOT NULL DEFAULT 0,
    failure_rate_pct REAL,
    status TEXT NOT NULL DEFAULT 'running',
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_metrics_status_end ON pipeline_metrics(status, run_end);

-- Raised alerts
CREATE TABLE IF NOT EXISTS alerts (
    alert_id TEXT PRIMARY KEY,
    run_id TEXT,
    created_at TEXT NOT NULL,
    severity TEXT NOT NULL,
    category TEXT NOT NULL,
    condition_name TEXT NOT NULL,
    message TEXT NOT NULL,
    metric_value REAL,
    threshold REAL,
    acknowledged INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_alerts_run ON alerts(run_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
