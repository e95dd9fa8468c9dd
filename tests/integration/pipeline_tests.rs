//! Integration tests for the ingestion pipeline
//!
//! These tests use wiremock to create mock HTTP servers and a SQLite database
//! in a temporary directory to run whole ingestion passes end-to-end.

use chrono::{Duration as ChronoDuration, Utc};
use doc_ingest::config::Config;
use doc_ingest::discovery::{parse_url_list, DiscoveredUrl};
use doc_ingest::fetch::{FetchOutcome, Fetcher, Sleeper};
use doc_ingest::health::{
    conditions, Alert, RunCounters, RunFinalization, RunMetrics, RunStatus, Severity,
};
use doc_ingest::pipeline::IngestPipeline;
use doc_ingest::storage::{
    ContentRecord, DocumentRecord, SqliteStorage, Storage, StorageError, StorageResult,
};
use doc_ingest::{FetchStatus, IngestError};
use std::future::{ready, Future};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
        ready(())
    }
}

fn open_db(dir: &TempDir) -> SqliteStorage {
    SqliteStorage::new(&dir.path().join("ingest.db")).expect("Failed to open database")
}

fn pipeline<St: Storage>(config: &Config, storage: St) -> IngestPipeline<St, NoSleep> {
    let fetcher =
        Fetcher::with_sleeper(config.fetch.clone(), NoSleep).expect("Failed to build fetcher");
    IngestPipeline::with_parts(config, fetcher, storage)
}

/// A completed run that ended `hours_ago` hours ago and took `duration_seconds`
fn past_run(hours_ago: i64, duration_seconds: f64) -> RunMetrics {
    let run_end = Utc::now() - ChronoDuration::hours(hours_ago);
    RunMetrics::restore(
        format!("past-{}-{}", hours_ago, duration_seconds),
        run_end - ChronoDuration::milliseconds((duration_seconds * 1000.0) as i64),
        "ingest".to_string(),
        RunCounters {
            urls_discovered: 1,
            urls_inserted: 1,
            fetch_success: 1,
            ..RunCounters::default()
        },
        RunStatus::Completed,
        None,
        Some(RunFinalization {
            run_end,
            duration_seconds,
            failure_rate_pct: 0.0,
        }),
    )
}

#[tokio::test]
async fn test_full_run_persists_documents_content_and_metrics() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/en/page1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>page one</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/en/page2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/en/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>page two</html>"))
        .mount(&server)
        .await;

    let list = format!(
        "# exported sitemap\n{base}/en/page1 2025-12-01\n{base}/en/page2\n{base}/en/page1/\n"
    );
    let discovered = parse_url_list(&list, "sitemap.xml");
    assert_eq!(discovered.len(), 2);

    let dir = TempDir::new().unwrap();
    let mut pipeline = pipeline(&Config::default(), open_db(&dir));
    let report = pipeline.run(&discovered).await.unwrap();

    let c = report.metrics.counters;
    assert_eq!(c.urls_discovered, 2);
    assert_eq!(c.urls_inserted, 2);
    assert_eq!(c.urls_updated, 0);
    assert_eq!(c.fetch_success, 2);
    assert_eq!(c.fetch_failed + c.fetch_timeout + c.fetch_skipped, 0);
    assert_eq!(report.metrics.status, RunStatus::Completed);
    assert_eq!(report.metrics.failure_rate_pct(), Some(0.0));
    assert!(report.alerts.is_empty());

    let storage = pipeline.storage();
    let page2 = storage
        .get_content(&format!("{base}/en/page2"))
        .unwrap()
        .unwrap();
    assert_eq!(page2.fetch_status, FetchStatus::Success);
    assert_eq!(page2.retry_count, 1);
    assert_eq!(page2.content.as_deref(), Some("<html>page two</html>"));

    let page1 = storage
        .get_document(&format!("{base}/en/page1"))
        .unwrap()
        .unwrap();
    assert_eq!(page1.last_modified.as_deref(), Some("2025-12-01"));
    assert_eq!(page1.sources, vec!["sitemap.xml"]);

    // Everything survives reopening the database
    drop(pipeline);
    let reopened = open_db(&dir);
    let stored = reopened.get_run(&report.metrics.run_id).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.counters, c);
    assert_eq!(reopened.count_documents().unwrap(), 2);
    assert!(reopened.last_completed_run_end().unwrap().is_some());
}

#[tokio::test]
async fn test_second_run_counts_updates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut pipeline = pipeline(&Config::default(), open_db(&dir));

    let first = vec![DiscoveredUrl::new(format!("{}/a", server.uri()), "sitemap-1.xml")];
    pipeline.run(&first).await.unwrap();

    let second = vec![
        DiscoveredUrl::new(format!("{}/a", server.uri()), "sitemap-2.xml"),
        DiscoveredUrl::new(format!("{}/b", server.uri()), "sitemap-2.xml"),
    ];
    let report = pipeline.run(&second).await.unwrap();

    assert_eq!(report.metrics.counters.urls_inserted, 1);
    assert_eq!(report.metrics.counters.urls_updated, 1);

    let doc = pipeline
        .storage()
        .get_document(&format!("{}/a", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(doc.sources, vec!["sitemap-1.xml", "sitemap-2.xml"]);
}

#[tokio::test]
async fn test_high_failure_rate_raises_critical_alert() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let discovered: Vec<_> = ["/ok", "/x", "/y", "/z"]
        .iter()
        .map(|p| DiscoveredUrl::new(format!("{}{}", server.uri(), p), "list"))
        .collect();

    let dir = TempDir::new().unwrap();
    let mut pipeline = pipeline(&Config::default(), open_db(&dir));
    let report = pipeline.run(&discovered).await.unwrap();

    assert_eq!(report.metrics.counters.fetch_failed, 3);
    assert_eq!(report.metrics.failure_rate_pct(), Some(75.0));
    assert_eq!(report.alerts.len(), 1);

    let alert = &report.alerts[0];
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.condition_name, conditions::FAILURE_RATE_CRITICAL);
    assert_eq!(
        alert.message,
        "Failure rate 75.0% exceeds critical threshold (25.0%)"
    );
    assert_eq!(alert.run_id.as_deref(), Some(report.metrics.run_id.as_str()));

    let stored = pipeline
        .storage()
        .get_alerts(Some(&report.metrics.run_id))
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].alert_id, alert.alert_id);
    assert_eq!(stored[0].message, alert.message);
    assert_eq!(stored[0].metric_value, Some(75.0));
    assert_eq!(stored[0].threshold, Some(25.0));
}

#[tokio::test]
async fn test_location_skipped_after_consecutive_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dead"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.ingest.max_consecutive_failures = 2;

    let dir = TempDir::new().unwrap();
    let mut pipeline = pipeline(&config, open_db(&dir));
    let discovered = vec![DiscoveredUrl::new(format!("{}/dead", server.uri()), "list")];

    for _ in 0..2 {
        let report = pipeline.run(&discovered).await.unwrap();
        assert_eq!(report.metrics.counters.fetch_failed, 1);
    }

    let report = pipeline.run(&discovered).await.unwrap();
    assert_eq!(report.metrics.counters.fetch_skipped, 1);
    assert_eq!(report.metrics.counters.total_fetches(), 0);
    assert_eq!(report.metrics.failure_rate_pct(), Some(0.0));
    assert_eq!(
        pipeline
            .storage()
            .consecutive_failures(&discovered[0].location)
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_slow_run_raises_performance_alert() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("ok")
                .set_delay(Duration::from_millis(600)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut storage = open_db(&dir);
    for hours_ago in 1..=3 {
        storage.save_metrics(&past_run(hours_ago, 0.25)).unwrap();
    }

    let mut pipeline = pipeline(&Config::default(), storage);
    let discovered = vec![DiscoveredUrl::new(format!("{}/slow", server.uri()), "list")];
    let report = pipeline.run(&discovered).await.unwrap();

    let duration = report.metrics.duration_seconds().unwrap();
    assert!(duration >= 0.6);

    assert_eq!(report.alerts.len(), 1);
    let alert = &report.alerts[0];
    assert_eq!(alert.condition_name, conditions::PERFORMANCE_DEGRADATION);
    assert_eq!(alert.severity, Severity::Warning);
    assert_eq!(alert.metric_value, Some(duration));
    assert_eq!(alert.threshold, Some(0.5));
    assert!(alert.message.starts_with("Run took "));
}

#[tokio::test]
async fn test_staleness_checks() {
    let dir = TempDir::new().unwrap();
    let mut storage = open_db(&dir);
    storage.save_metrics(&past_run(30, 5.0)).unwrap();

    let mut pipeline = pipeline(&Config::default(), storage);
    let alerts = pipeline.check_staleness().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].condition_name, conditions::PIPELINE_STALE_WARNING);
    assert_eq!(alerts[0].run_id, None);
    assert!(alerts[0]
        .message
        .starts_with("Last successful run was 30.0h ago"));

    // A fresh run clears the condition
    pipeline.run(&[]).await.unwrap();
    assert!(pipeline.check_staleness().unwrap().is_empty());

    assert_eq!(pipeline.storage().get_alerts(None).unwrap().len(), 1);
}

#[tokio::test]
async fn test_very_stale_pipeline_is_critical() {
    let dir = TempDir::new().unwrap();
    let mut storage = open_db(&dir);
    storage.save_metrics(&past_run(80, 5.0)).unwrap();

    let mut pipeline = pipeline(&Config::default(), storage);
    let alerts = pipeline.check_staleness().unwrap();

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(alerts[0].condition_name, conditions::PIPELINE_STALE_CRITICAL);
}

/// Delegates to SQLite but refuses to record fetch outcomes
struct BrokenContentStorage {
    inner: SqliteStorage,
}

impl Storage for BrokenContentStorage {
    fn save_metrics(&mut self, metrics: &RunMetrics) -> StorageResult<()> {
        self.inner.save_metrics(metrics)
    }
    fn get_run(&self, run_id: &str) -> StorageResult<Option<RunMetrics>> {
        self.inner.get_run(run_id)
    }
    fn last_completed_run_end(&self) -> StorageResult<Option<chrono::DateTime<Utc>>> {
        self.inner.last_completed_run_end()
    }
    fn recent_completed_durations(&self, limit: usize) -> StorageResult<Vec<f64>> {
        self.inner.recent_completed_durations(limit)
    }
    fn save_alerts(&mut self, alerts: &[Alert]) -> StorageResult<()> {
        self.inner.save_alerts(alerts)
    }
    fn get_alerts(&self, run_id: Option<&str>) -> StorageResult<Vec<Alert>> {
        self.inner.get_alerts(run_id)
    }
    fn upsert_discovered(&mut self, urls: &[DiscoveredUrl]) -> StorageResult<(u64, u64)> {
        self.inner.upsert_discovered(urls)
    }
    fn get_document(&self, location: &str) -> StorageResult<Option<DocumentRecord>> {
        self.inner.get_document(location)
    }
    fn count_documents(&self) -> StorageResult<u64> {
        self.inner.count_documents()
    }
    fn record_fetch(&mut self, _location: &str, _outcome: &FetchOutcome) -> StorageResult<()> {
        Err(StorageError::Database("disk I/O error".to_string()))
    }
    fn consecutive_failures(&self, location: &str) -> StorageResult<u32> {
        self.inner.consecutive_failures(location)
    }
    fn get_content(&self, location: &str) -> StorageResult<Option<ContentRecord>> {
        self.inner.get_content(location)
    }
    fn count_content_by_status(&self, status: FetchStatus) -> StorageResult<u64> {
        self.inner.count_content_by_status(status)
    }
}

#[tokio::test]
async fn test_storage_failure_marks_run_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let storage = BrokenContentStorage {
        inner: open_db(&dir),
    };
    let mut pipeline = pipeline(&Config::default(), storage);
    let discovered = vec![DiscoveredUrl::new(format!("{}/doc", server.uri()), "list")];

    let result = pipeline.run(&discovered).await;
    assert!(matches!(result, Err(IngestError::Storage(_))));

    // The failed run is still on record and finalized, but is not a completed run
    drop(pipeline);
    let storage = open_db(&dir);
    assert_eq!(storage.last_completed_run_end().unwrap(), None);
    assert!(storage.recent_completed_durations(10).unwrap().is_empty());

    let conn = rusqlite::Connection::open(dir.path().join("ingest.db")).unwrap();
    let (status, error, has_end): (String, Option<String>, bool) = conn
        .query_row(
            "SELECT status, error_message, run_end IS NOT NULL FROM pipeline_metrics",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(status, "failed");
    assert!(error.unwrap().contains("disk I/O error"));
    assert!(has_end);
}
