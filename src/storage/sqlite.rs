//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::discovery::{merge_by_location, DiscoveredUrl};
use crate::fetch::{FetchOutcome, FetchStatus};
use crate::health::{
    parse_timestamp, Alert, AlertCategory, RunCounters, RunFinalization, RunMetrics, RunStatus,
    Severity,
};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{format_timestamp, ContentRecord, DocumentRecord};
use crate::IngestError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;

const RUN_COLUMNS: &str = "run_id, run_start, run_end, duration_seconds, stage,
     urls_discovered, urls_inserted, urls_updated, fetch_success, fetch_failed,
     fetch_timeout, fetch_skipped, failure_rate_pct, status, error_message";

const ALERT_COLUMNS: &str = "alert_id, run_id, created_at, severity, category, condition_name,
     message, metric_value, threshold";

const CONTENT_COLUMNS: &str = "location, content, content_digest, size_bytes, http_status,
     fetch_status, retry_count, consecutive_failures, first_fetched_at, last_fetched_at,
     last_success_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(IngestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, IngestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, IngestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Raw pipeline_metrics row before timestamp decoding
struct RunRow {
    run_id: String,
    run_start: String,
    run_end: Option<String>,
    duration_seconds: Option<f64>,
    stage: String,
    counters: RunCounters,
    failure_rate_pct: Option<f64>,
    status: String,
    error_message: Option<String>,
}

impl RunRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            run_start: row.get(1)?,
            run_end: row.get(2)?,
            duration_seconds: row.get(3)?,
            stage: row.get(4)?,
            counters: RunCounters {
                urls_discovered: row.get::<_, i64>(5)? as u64,
                urls_inserted: row.get::<_, i64>(6)? as u64,
                urls_updated: row.get::<_, i64>(7)? as u64,
                fetch_success: row.get::<_, i64>(8)? as u64,
                fetch_failed: row.get::<_, i64>(9)? as u64,
                fetch_timeout: row.get::<_, i64>(10)? as u64,
                fetch_skipped: row.get::<_, i64>(11)? as u64,
            },
            failure_rate_pct: row.get(12)?,
            status: row.get(13)?,
            error_message: row.get(14)?,
        })
    }

    fn into_metrics(self) -> StorageResult<RunMetrics> {
        let run_start = decode_timestamp(&self.run_start)?;
        let status = RunStatus::from_db_string(&self.status).ok_or(StorageError::InvalidValue {
            field: "status",
            value: self.status.clone(),
        })?;

        let finalization = match (self.run_end, self.duration_seconds) {
            (Some(run_end), Some(duration_seconds)) => Some(RunFinalization {
                run_end: decode_timestamp(&run_end)?,
                duration_seconds,
                failure_rate_pct: self.failure_rate_pct.unwrap_or(0.0),
            }),
            _ => None,
        };

        Ok(RunMetrics::restore(
            self.run_id,
            run_start,
            self.stage,
            self.counters,
            status,
            self.error_message,
            finalization,
        ))
    }
}

/// Raw alerts row before enum and timestamp decoding
struct AlertRow {
    alert_id: String,
    run_id: Option<String>,
    created_at: String,
    severity: String,
    category: String,
    condition_name: String,
    message: String,
    metric_value: Option<f64>,
    threshold: Option<f64>,
}

impl AlertRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            alert_id: row.get(0)?,
            run_id: row.get(1)?,
            created_at: row.get(2)?,
            severity: row.get(3)?,
            category: row.get(4)?,
            condition_name: row.get(5)?,
            message: row.get(6)?,
            metric_value: row.get(7)?,
            threshold: row.get(8)?,
        })
    }

    fn into_alert(self) -> StorageResult<Alert> {
        let severity =
            Severity::from_db_string(&self.severity).ok_or(StorageError::InvalidValue {
                field: "severity",
                value: self.severity.clone(),
            })?;
        let category =
            AlertCategory::from_db_string(&self.category).ok_or(StorageError::InvalidValue {
                field: "category",
                value: self.category.clone(),
            })?;

        Ok(Alert {
            alert_id: self.alert_id,
            run_id: self.run_id,
            created_at: decode_timestamp(&self.created_at)?,
            severity,
            category,
            condition_name: self.condition_name,
            message: self.message,
            metric_value: self.metric_value,
            threshold: self.threshold,
        })
    }
}

fn decode_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    parse_timestamp(value).ok_or_else(|| StorageError::Timestamp(value.to_string()))
}

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<(ContentRecord, String)> {
    let fetch_status: String = row.get(5)?;
    let record = ContentRecord {
        location: row.get(0)?,
        content: row.get(1)?,
        content_digest: row.get(2)?,
        size_bytes: row.get::<_, i64>(3)? as u64,
        http_status: row.get(4)?,
        // Replaced below once the status string is validated
        fetch_status: FetchStatus::Failed,
        retry_count: row.get(6)?,
        consecutive_failures: row.get(7)?,
        first_fetched_at: row.get(8)?,
        last_fetched_at: row.get(9)?,
        last_success_at: row.get(10)?,
    };
    Ok((record, fetch_status))
}

impl Storage for SqliteStorage {
    // ===== Run Metrics =====

    fn save_metrics(&mut self, metrics: &RunMetrics) -> StorageResult<()> {
        let c = &metrics.counters;
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO pipeline_metrics ({RUN_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                metrics.run_id,
                format_timestamp(metrics.run_start),
                metrics.run_end().map(format_timestamp),
                metrics.duration_seconds(),
                metrics.stage,
                c.urls_discovered as i64,
                c.urls_inserted as i64,
                c.urls_updated as i64,
                c.fetch_success as i64,
                c.fetch_failed as i64,
                c.fetch_timeout as i64,
                c.fetch_skipped as i64,
                metrics.failure_rate_pct(),
                metrics.status.to_db_string(),
                metrics.error_message,
            ],
        )?;
        Ok(())
    }

    fn get_run(&self, run_id: &str) -> StorageResult<Option<RunMetrics>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM pipeline_metrics WHERE run_id = ?1"),
                params![run_id],
                RunRow::from_row,
            )
            .optional()?;

        row.map(RunRow::into_metrics).transpose()
    }

    fn last_completed_run_end(&self) -> StorageResult<Option<DateTime<Utc>>> {
        // Ordered as instants: stored values mix naive and RFC 3339 text
        let last: Option<String> = self
            .conn
            .query_row(
                "SELECT run_end FROM pipeline_metrics
                 WHERE status = ?1 AND run_end IS NOT NULL
                 ORDER BY julianday(run_end) DESC
                 LIMIT 1",
                params![RunStatus::Completed.to_db_string()],
                |row| row.get(0),
            )
            .optional()?;

        last.as_deref().map(decode_timestamp).transpose()
    }

    fn recent_completed_durations(&self, limit: usize) -> StorageResult<Vec<f64>> {
        let mut stmt = self.conn.prepare(
            "SELECT duration_seconds FROM pipeline_metrics
             WHERE status = ?1 AND duration_seconds IS NOT NULL
             ORDER BY julianday(run_end) DESC
             LIMIT ?2",
        )?;

        let durations = stmt
            .query_map(
                params![RunStatus::Completed.to_db_string(), limit as i64],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<f64>, _>>()?;

        Ok(durations)
    }

    // ===== Alerts =====

    fn save_alerts(&mut self, alerts: &[Alert]) -> StorageResult<()> {
        if alerts.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO alerts ({ALERT_COLUMNS}, acknowledged)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)"
            ))?;

            for alert in alerts {
                stmt.execute(params![
                    alert.alert_id,
                    alert.run_id,
                    format_timestamp(alert.created_at),
                    alert.severity.as_str(),
                    alert.category.as_str(),
                    alert.condition_name,
                    alert.message,
                    alert.metric_value,
                    alert.threshold,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_alerts(&self, run_id: Option<&str>) -> StorageResult<Vec<Alert>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE run_id IS ?1 ORDER BY created_at, rowid"
        ))?;

        let rows = stmt
            .query_map(params![run_id], AlertRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    // ===== Documents =====

    fn upsert_discovered(&mut self, urls: &[DiscoveredUrl]) -> StorageResult<(u64, u64)> {
        let now = format_timestamp(Utc::now());
        let mut inserted = 0;
        let mut updated = 0;

        let tx = self.conn.transaction()?;
        for entry in merge_by_location(urls) {
            let existing: Option<(Option<String>, String)> = tx
                .query_row(
                    "SELECT last_modified, sources FROM documents WHERE location = ?1",
                    params![entry.location],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match existing {
                Some((last_modified, sources)) => {
                    let mut merged: BTreeSet<&str> =
                        sources.split(',').filter(|s| !s.is_empty()).collect();
                    merged.extend(entry.sources.iter().map(String::as_str));
                    let merged = merged.into_iter().collect::<Vec<_>>().join(",");

                    tx.execute(
                        "UPDATE documents SET last_modified = ?1, sources = ?2, last_seen_at = ?3
                         WHERE location = ?4",
                        params![
                            entry.last_modified.or(last_modified),
                            merged,
                            now,
                            entry.location
                        ],
                    )?;
                    updated += 1;
                }
                None => {
                    let sources = entry.sources.iter().map(String::as_str).collect::<Vec<_>>();
                    tx.execute(
                        "INSERT INTO documents (location, last_modified, sources, first_seen_at, last_seen_at)
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![entry.location, entry.last_modified, sources.join(","), now],
                    )?;
                    inserted += 1;
                }
            }
        }
        tx.commit()?;

        Ok((inserted, updated))
    }

    fn get_document(&self, location: &str) -> StorageResult<Option<DocumentRecord>> {
        let document = self
            .conn
            .query_row(
                "SELECT location, last_modified, sources, first_seen_at, last_seen_at
                 FROM documents WHERE location = ?1",
                params![location],
                |row| {
                    let sources: String = row.get(2)?;
                    Ok(DocumentRecord {
                        location: row.get(0)?,
                        last_modified: row.get(1)?,
                        sources: sources
                            .split(',')
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect(),
                        first_seen_at: row.get(3)?,
                        last_seen_at: row.get(4)?,
                    })
                },
            )
            .optional()?;

        Ok(document)
    }

    fn count_documents(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Content =====

    fn record_fetch(&mut self, location: &str, outcome: &FetchOutcome) -> StorageResult<()> {
        let now = format_timestamp(Utc::now());

        if outcome.is_success() {
            self.conn.execute(
                "INSERT INTO document_content (location, content, content_digest, size_bytes,
                     http_status, fetch_status, retry_count, consecutive_failures,
                     first_fetched_at, last_fetched_at, last_success_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8, ?8)
                 ON CONFLICT(location) DO UPDATE SET
                     content = excluded.content,
                     content_digest = excluded.content_digest,
                     size_bytes = excluded.size_bytes,
                     http_status = excluded.http_status,
                     fetch_status = excluded.fetch_status,
                     retry_count = excluded.retry_count,
                     consecutive_failures = 0,
                     last_fetched_at = excluded.last_fetched_at,
                     last_success_at = excluded.last_success_at",
                params![
                    location,
                    outcome.content,
                    outcome.content_digest,
                    outcome.size_bytes as i64,
                    outcome.http_status,
                    outcome.status.to_db_string(),
                    outcome.retry_count,
                    now,
                ],
            )?;
        } else {
            self.conn.execute(
                "INSERT INTO document_content (location, size_bytes, http_status, fetch_status,
                     retry_count, consecutive_failures, first_fetched_at, last_fetched_at)
                 VALUES (?1, 0, ?2, ?3, ?4, 1, ?5, ?5)
                 ON CONFLICT(location) DO UPDATE SET
                     http_status = excluded.http_status,
                     fetch_status = excluded.fetch_status,
                     retry_count = excluded.retry_count,
                     consecutive_failures = consecutive_failures + 1,
                     last_fetched_at = excluded.last_fetched_at",
                params![
                    location,
                    outcome.http_status,
                    outcome.status.to_db_string(),
                    outcome.retry_count,
                    now,
                ],
            )?;
        }

        Ok(())
    }

    fn consecutive_failures(&self, location: &str) -> StorageResult<u32> {
        let failures: Option<u32> = self
            .conn
            .query_row(
                "SELECT consecutive_failures FROM document_content WHERE location = ?1",
                params![location],
                |row| row.get(0),
            )
            .optional()?;

        Ok(failures.unwrap_or(0))
    }

    fn get_content(&self, location: &str) -> StorageResult<Option<ContentRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {CONTENT_COLUMNS} FROM document_content WHERE location = ?1"),
                params![location],
                content_from_row,
            )
            .optional()?;

        row.map(|(mut record, status)| -> StorageResult<ContentRecord> {
            record.fetch_status =
                FetchStatus::from_db_string(&status).ok_or(StorageError::InvalidValue {
                    field: "fetch_status",
                    value: status.clone(),
                })?;
            Ok(record)
        })
        .transpose()
    }

    fn count_content_by_status(&self, status: FetchStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM document_content WHERE fetch_status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
