//! Integration tests for the fetch engine
//!
//! These tests use wiremock to serve canned responses and a recording sleeper
//! to observe backoff and throttle pauses without waiting for them.

use doc_ingest::config::{FetchConfig, MAX_BACKOFF_SECS};
use doc_ingest::fetch::{content_digest, truncation_marker, AttemptFailure, Fetcher, Sleeper};
use doc_ingest::FetchStatus;
use std::future::{ready, Future};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records requested pauses and returns immediately
#[derive(Clone, Default)]
struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    fn recorded(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.sleeps.lock().unwrap().push(duration);
        ready(())
    }
}

fn fetcher(config: FetchConfig) -> (Fetcher<RecordingSleeper>, RecordingSleeper) {
    let sleeper = RecordingSleeper::default();
    let fetcher = Fetcher::with_sleeper(config, sleeper.clone()).expect("Failed to build fetcher");
    (fetcher, sleeper)
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[tokio::test]
async fn test_success_first_try() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>OK</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(FetchConfig::default());
    let outcome = fetcher.fetch(&format!("{}/doc", server.uri())).await;

    assert_eq!(outcome.status, FetchStatus::Success);
    assert_eq!(outcome.http_status, Some(200));
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(outcome.content.as_deref(), Some("<html>OK</html>"));
    assert_eq!(outcome.size_bytes, 15);
    assert!(!outcome.truncated);
    assert_eq!(
        outcome.content_digest,
        Some(content_digest("<html>OK</html>"))
    );
    // Only the politeness pause
    assert_eq!(sleeper.recorded(), vec![Duration::from_millis(300)]);
}

#[tokio::test]
async fn test_sends_identifying_headers() {
    let server = MockServer::start().await;
    let config = FetchConfig::default();
    Mock::given(method("GET"))
        .and(header("user-agent", config.user_agent.as_str()))
        .and(header("accept", config.accept.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(config);
    let outcome = fetcher.fetch(&server.uri()).await;

    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_transient_status_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>OK</html>"))
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(FetchConfig::default());
    let outcome = fetcher.fetch(&format!("{}/flaky", server.uri())).await;

    assert_eq!(outcome.status, FetchStatus::Success);
    assert_eq!(outcome.retry_count, 1);
    assert_eq!(outcome.http_status, Some(200));
    assert_eq!(
        sleeper.recorded(),
        vec![secs(2), Duration::from_millis(300)]
    );
}

#[tokio::test]
async fn test_non_transient_status_fails_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(FetchConfig::default());
    let outcome = fetcher.fetch(&format!("{}/missing", server.uri())).await;

    assert_eq!(outcome.status, FetchStatus::Failed);
    assert_eq!(outcome.http_status, Some(404));
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(outcome.content, None);
    assert_eq!(outcome.content_digest, None);
    assert!(sleeper.recorded().is_empty());
}

#[tokio::test]
async fn test_transient_status_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(FetchConfig::default());
    let outcome = fetcher.fetch(&format!("{}/broken", server.uri())).await;

    assert_eq!(outcome.status, FetchStatus::Failed);
    assert_eq!(outcome.http_status, Some(500));
    assert_eq!(outcome.retry_count, 3);
    assert_eq!(outcome.last_failure, Some(AttemptFailure::TransientStatus(500)));
    assert_eq!(sleeper.recorded(), vec![secs(2), secs(4), secs(8)]);
}

#[tokio::test]
async fn test_transient_then_rejected_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(FetchConfig::default());
    let outcome = fetcher.fetch(&format!("{}/moved", server.uri())).await;

    assert_eq!(outcome.status, FetchStatus::Failed);
    assert_eq!(outcome.retry_count, 1);
    assert_eq!(outcome.http_status, Some(404));
    assert_eq!(outcome.content, None);
    assert_eq!(sleeper.recorded(), vec![secs(2)]);
}

#[tokio::test]
async fn test_timeout_then_transient_status_exhausts_as_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(3)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = FetchConfig {
        request_timeout_secs: 1,
        max_retries: 1,
        ..FetchConfig::default()
    };
    let (fetcher, sleeper) = fetcher(config);
    let outcome = fetcher.fetch(&format!("{}/mixed", server.uri())).await;

    // Classified by the last attempt
    assert_eq!(outcome.status, FetchStatus::Failed);
    assert_eq!(outcome.http_status, Some(503));
    assert_eq!(outcome.retry_count, 1);
    assert_eq!(outcome.last_failure, Some(AttemptFailure::TransientStatus(503)));
    assert_eq!(sleeper.recorded(), vec![secs(2)]);
}

#[tokio::test]
async fn test_transient_status_then_timeout_exhausts_as_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = FetchConfig {
        request_timeout_secs: 1,
        max_retries: 1,
        ..FetchConfig::default()
    };
    let (fetcher, _) = fetcher(config);
    let outcome = fetcher.fetch(&format!("{}/mixed", server.uri())).await;

    assert_eq!(outcome.status, FetchStatus::Timeout);
    assert_eq!(outcome.http_status, None);
    assert_eq!(outcome.retry_count, 1);
    assert_eq!(outcome.last_failure, Some(AttemptFailure::Timeout));
}

#[tokio::test]
async fn test_unvalidated_huge_backoff_is_clamped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(11)
        .mount(&server)
        .await;

    // Built directly, bypassing config validation
    let config = FetchConfig {
        backoff_base: 90.0,
        max_retries: 10,
        ..FetchConfig::default()
    };
    let (fetcher, sleeper) = fetcher(config);
    let outcome = fetcher.fetch(&server.uri()).await;

    assert_eq!(outcome.status, FetchStatus::Failed);
    assert_eq!(outcome.retry_count, 10);
    assert_eq!(outcome.http_status, Some(503));

    let sleeps = sleeper.recorded();
    assert_eq!(sleeps.len(), 10);
    assert_eq!(sleeps[0], secs(90));
    assert!(sleeps[1..].iter().all(|d| *d == secs(MAX_BACKOFF_SECS)));
}

#[tokio::test]
async fn test_rate_limited_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let (fetcher, sleeper) = fetcher(FetchConfig::default());
    let outcome = fetcher.fetch(&server.uri()).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.retry_count, 2);
    assert_eq!(
        sleeper.recorded(),
        vec![secs(2), secs(4), Duration::from_millis(300)]
    );
}

#[tokio::test]
async fn test_timeout_on_every_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = FetchConfig {
        request_timeout_secs: 1,
        max_retries: 1,
        ..FetchConfig::default()
    };
    let (fetcher, sleeper) = fetcher(config);
    let outcome = fetcher.fetch(&format!("{}/slow", server.uri())).await;

    assert_eq!(outcome.status, FetchStatus::Timeout);
    assert_eq!(outcome.http_status, None);
    assert_eq!(outcome.retry_count, 1);
    assert_eq!(outcome.content, None);
    assert_eq!(outcome.last_failure, Some(AttemptFailure::Timeout));
    assert_eq!(sleeper.recorded(), vec![secs(2)]);
}

#[tokio::test]
async fn test_connection_refused() {
    // Reserve a port, then free it so nothing is listening
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = FetchConfig {
        max_retries: 2,
        ..FetchConfig::default()
    };
    let (fetcher, sleeper) = fetcher(config);
    let outcome = fetcher.fetch(&format!("http://127.0.0.1:{}/doc", port)).await;

    assert_eq!(outcome.status, FetchStatus::Failed);
    assert_eq!(outcome.http_status, None);
    assert_eq!(outcome.retry_count, 2);
    assert!(matches!(
        outcome.last_failure,
        Some(AttemptFailure::ConnectionFailure(_))
    ));
    assert_eq!(sleeper.recorded(), vec![secs(2), secs(4)]);
}

#[tokio::test]
async fn test_oversized_body_is_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a".repeat(2500)))
        .mount(&server)
        .await;

    let config = FetchConfig {
        max_content_size: 1000,
        chunk_size: 100,
        ..FetchConfig::default()
    };
    let (fetcher, _) = fetcher(config);
    let outcome = fetcher.fetch(&format!("{}/big", server.uri())).await;

    assert_eq!(outcome.status, FetchStatus::Success);
    assert!(outcome.truncated);

    let content = outcome.content.unwrap();
    let expected = format!("{}{}", "a".repeat(1000), truncation_marker(1000));
    assert_eq!(content, expected);
    assert_eq!(outcome.size_bytes, expected.len() as u64);
    assert_eq!(outcome.content_digest, Some(content_digest(&expected)));
}

#[tokio::test]
async fn test_body_at_exact_cap_is_not_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("b".repeat(1000)))
        .mount(&server)
        .await;

    let config = FetchConfig {
        max_content_size: 1000,
        chunk_size: 100,
        ..FetchConfig::default()
    };
    let (fetcher, _) = fetcher(config);
    let outcome = fetcher.fetch(&server.uri()).await;

    assert!(!outcome.truncated);
    assert_eq!(outcome.size_bytes, 1000);
}

#[tokio::test]
async fn test_non_utf8_body_is_decoded_lossily() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'o', b'k', 0xff]))
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(FetchConfig::default());
    let outcome = fetcher.fetch(&server.uri()).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.content.as_deref(), Some("ok\u{fffd}"));
}

#[tokio::test]
async fn test_cap_applies_to_decoded_length() {
    let server = MockServer::start().await;
    // 8 raw bytes that decode to 24
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff; 8]))
        .mount(&server)
        .await;

    let config = FetchConfig {
        max_content_size: 12,
        chunk_size: 4,
        ..FetchConfig::default()
    };
    let (fetcher, _) = fetcher(config);
    let outcome = fetcher.fetch(&server.uri()).await;

    assert!(outcome.is_success());
    assert!(outcome.truncated);
    let expected = format!("{}{}", "\u{fffd}".repeat(4), truncation_marker(12));
    assert_eq!(outcome.content.as_deref(), Some(expected.as_str()));
}
