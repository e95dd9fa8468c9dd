//! Ingestion driver - one run from discovered URLs to persisted alerts
//!
//! A run walks the distinct discovered locations in order, fetching each one
//! that has not failed too often, and records every outcome. Once the loop is done the
//! run is finalized, evaluated against the thresholds and recent history, and
//! persisted together with its alerts.

use crate::config::{Config, IngestConfig};
use crate::discovery::{merge_by_location, DiscoveredUrl};
use crate::fetch::{FetchStatus, Fetcher, Sleeper, TokioSleeper};
use crate::health::{Alert, AlertEvaluator, RunMetrics};
use crate::storage::{open_storage, SqliteStorage, Storage, StorageError};
use crate::IngestError;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Result of a finished ingestion run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub metrics: RunMetrics,
    pub alerts: Vec<Alert>,
}

/// Sequential ingestion pipeline
pub struct IngestPipeline<St = SqliteStorage, S = TokioSleeper> {
    fetcher: Fetcher<S>,
    evaluator: AlertEvaluator,
    storage: St,
    ingest: IngestConfig,
    history_window: usize,
}

impl IngestPipeline<SqliteStorage, TokioSleeper> {
    /// Creates a pipeline backed by the configured SQLite database
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(IngestPipeline)` - Storage opened and HTTP client built
    /// * `Err(IngestError)` - Failed to initialize
    pub fn new(config: &Config) -> Result<Self, IngestError> {
        let storage = open_storage(Path::new(&config.storage.database_path))?;
        let fetcher = Fetcher::new(config.fetch.clone())?;
        Ok(Self::with_parts(config, fetcher, storage))
    }
}

impl<St: Storage, S: Sleeper> IngestPipeline<St, S> {
    /// Assembles a pipeline from an existing fetcher and storage backend
    pub fn with_parts(config: &Config, fetcher: Fetcher<S>, storage: St) -> Self {
        Self {
            fetcher,
            evaluator: AlertEvaluator::new(config.alerts.clone()),
            storage,
            ingest: config.ingest.clone(),
            history_window: config.storage.history_window,
        }
    }

    pub fn storage(&self) -> &St {
        &self.storage
    }

    /// Runs one ingestion pass over `discovered`
    ///
    /// A storage failure before the run is evaluated marks it failed; its
    /// metrics are still finalized and saved if possible before the error is
    /// returned. Failing to store alerts is logged and does not fail the run.
    pub async fn run(&mut self, discovered: &[DiscoveredUrl]) -> Result<RunReport, IngestError> {
        let mut metrics = RunMetrics::start(self.ingest.stage.as_str());
        metrics.counters.urls_discovered = discovered.len() as u64;

        info!(
            run_id = %metrics.run_id,
            stage = %metrics.stage,
            "Starting run with {} discovered URLs",
            discovered.len()
        );

        let historical_avg = match self.ingest_urls(&mut metrics, discovered).await {
            Ok(avg) => avg,
            Err(e) => {
                error!(run_id = %metrics.run_id, "Run failed: {}", e);
                metrics.mark_failed(e.to_string());
                metrics.finish();
                if let Err(save_err) = self.storage.save_metrics(&metrics) {
                    warn!(run_id = %metrics.run_id, "Failed to save metrics for failed run: {}", save_err);
                }
                return Err(e.into());
            }
        };

        metrics.finish();
        let alerts = self.evaluator.evaluate_alerts(&metrics, historical_avg);

        self.storage.save_metrics(&metrics)?;
        if let Err(e) = self.storage.save_alerts(&alerts) {
            warn!(run_id = %metrics.run_id, "Failed to save {} alerts: {}", alerts.len(), e);
        }

        info!(
            run_id = %metrics.run_id,
            success = metrics.counters.fetch_success,
            failed = metrics.counters.fetch_failed,
            timeout = metrics.counters.fetch_timeout,
            skipped = metrics.counters.fetch_skipped,
            alerts = alerts.len(),
            "Run completed in {:.2}s",
            metrics.duration_seconds().unwrap_or(0.0)
        );

        Ok(RunReport { metrics, alerts })
    }

    /// Upserts, fetches and reads the duration baseline for a running run
    async fn ingest_urls(
        &mut self,
        metrics: &mut RunMetrics,
        discovered: &[DiscoveredUrl],
    ) -> Result<Option<f64>, StorageError> {
        let (inserted, updated) = self.storage.upsert_discovered(discovered)?;
        metrics.counters.urls_inserted = inserted;
        metrics.counters.urls_updated = updated;
        debug!(inserted, updated, "Merged discovered URLs");

        // One fetch per location, however many sitemaps named it
        let locations = merge_by_location(discovered);
        let total = locations.len();
        for (index, entry) in locations.iter().enumerate() {
            let failures = self.storage.consecutive_failures(&entry.location)?;
            if failures >= self.ingest.max_consecutive_failures {
                debug!(url = %entry.location, failures, "Skipping location after repeated failures");
                metrics.counters.fetch_skipped += 1;
                continue;
            }

            let outcome = self.fetcher.fetch(&entry.location).await;
            match outcome.status {
                FetchStatus::Success => metrics.counters.fetch_success += 1,
                FetchStatus::Failed => metrics.counters.fetch_failed += 1,
                FetchStatus::Timeout => metrics.counters.fetch_timeout += 1,
            }
            self.storage.record_fetch(&entry.location, &outcome)?;

            debug!(
                url = %entry.location,
                status = %outcome.status,
                position = index + 1,
                total,
                "Fetched"
            );
        }

        self.storage.historical_avg_duration(self.history_window)
    }

    /// Evaluates how long ago the last completed run ended and stores any alert
    pub fn check_staleness(&mut self) -> Result<Vec<Alert>, IngestError> {
        let last_run_end = self.storage.last_completed_run_end()?;
        let alerts = self.evaluator.evaluate_staleness_alert(last_run_end);
        self.storage.save_alerts(&alerts)?;
        Ok(alerts)
    }
}
