//! HTTP fetch engine
//!
//! This module handles all document requests, including:
//! - Building the HTTP client with the fixed identifying headers
//! - Bounded retries with exponential backoff
//! - Classification of transient vs. terminal failures
//! - Size-capped streaming of the body
//! - The pacing delay after every success

use crate::config::FetchConfig;
use crate::fetch::body::{Body, BodyAccumulator};
use crate::fetch::digest::content_digest;
use crate::fetch::sleep::{Sleeper, TokioSleeper};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use std::fmt;
use tracing::{debug, warn};

/// Terminal classification of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStatus {
    Success,
    Failed,
    Timeout,
}

impl FetchStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Why a single attempt did not produce a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The per-attempt transport timeout elapsed
    Timeout,
    /// Connection, TLS, or body read failure
    ConnectionFailure(String),
    /// The server answered with a retryable status
    TransientStatus(u16),
}

impl AttemptFailure {
    fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::ConnectionFailure(error.to_string())
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::ConnectionFailure(message) => write!(f, "connection_error: {}", message),
            Self::TransientStatus(code) => write!(f, "HTTP {}", code),
        }
    }
}

/// Result of one fetch attempt sequence for a single URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Body text; absent on any failure
    pub content: Option<String>,
    /// Digest of `content`; present iff `content` is
    pub content_digest: Option<String>,
    /// Size of `content` in bytes (after truncation), 0 on failure
    pub size_bytes: u64,
    /// Last HTTP status seen; absent if the last attempt got no response
    pub http_status: Option<u16>,
    pub status: FetchStatus,
    /// Retries actually performed
    pub retry_count: u32,
    pub truncated: bool,
    /// Reason the final retryable attempt failed, if the sequence was exhausted
    pub last_failure: Option<AttemptFailure>,
}

impl FetchOutcome {
    fn success(body: Body, http_status: u16, attempt: u32) -> Self {
        let digest = content_digest(&body.content);
        Self {
            size_bytes: body.size_bytes,
            truncated: body.truncated,
            content: Some(body.content),
            content_digest: Some(digest),
            http_status: Some(http_status),
            status: FetchStatus::Success,
            retry_count: attempt,
            last_failure: None,
        }
    }

    fn rejected(http_status: u16, attempt: u32) -> Self {
        Self {
            content: None,
            content_digest: None,
            size_bytes: 0,
            http_status: Some(http_status),
            status: FetchStatus::Failed,
            retry_count: attempt,
            truncated: false,
            last_failure: None,
        }
    }

    fn exhausted(last_failure: Option<AttemptFailure>, max_retries: u32) -> Self {
        let (status, http_status) = match &last_failure {
            Some(AttemptFailure::Timeout) => (FetchStatus::Timeout, None),
            Some(AttemptFailure::TransientStatus(code)) => (FetchStatus::Failed, Some(*code)),
            Some(AttemptFailure::ConnectionFailure(_)) | None => (FetchStatus::Failed, None),
        };

        Self {
            content: None,
            content_digest: None,
            size_bytes: 0,
            http_status,
            status,
            retry_count: max_retries,
            truncated: false,
            last_failure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }
}

/// What a single attempt produced
enum Attempt {
    Fetched { http_status: u16, body: Body },
    Rejected(u16),
    Retry(AttemptFailure),
}

/// Builds an HTTP client carrying the fixed identifying headers
///
/// # Arguments
///
/// * `config` - The fetch configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&config.accept) {
        Ok(accept) => {
            headers.insert(ACCEPT, accept);
        }
        Err(_) => warn!(accept = %config.accept, "Ignoring invalid Accept header value"),
    }

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(config.request_timeout())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches single documents under the configured retry and pacing policy
///
/// The fetcher holds no per-URL state, so one instance can serve any number of
/// sequential or concurrent calls.
pub struct Fetcher<S = TokioSleeper> {
    client: Client,
    config: FetchConfig,
    sleeper: S,
}

impl Fetcher<TokioSleeper> {
    /// Creates a fetcher that sleeps on the tokio timer
    pub fn new(config: FetchConfig) -> Result<Self, reqwest::Error> {
        Self::with_sleeper(config, TokioSleeper)
    }
}

impl<S: Sleeper> Fetcher<S> {
    /// Creates a fetcher with a custom pacing implementation
    pub fn with_sleeper(config: FetchConfig, sleeper: S) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config)?;
        Ok(Self {
            client,
            config,
            sleeper,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches a URL, never failing
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx/3xx | Stream body, throttle, return `Success` |
    /// | Transient status (408, 429, 500, 502-504) | Retry |
    /// | Other status >= 400 | Immediate `Failed` |
    /// | Timeout | Retry; `Timeout` if it was the last failure |
    /// | Connection failure | Retry |
    ///
    /// Attempt `k > 0` is preceded by a `backoff_base^k` second sleep. Once all
    /// `max_retries + 1` attempts are used up, `retry_count` is `max_retries`.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let max_retries = self.config.max_retries;
        let mut last_failure = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let wait = self.config.backoff_delay(attempt);
                debug!(url, attempt, wait_secs = wait.as_secs_f64(), "Backing off before retry");
                self.sleeper.sleep(wait).await;
            }

            match self.attempt(url).await {
                Attempt::Fetched { http_status, body } => {
                    if body.truncated {
                        warn!(url, size_bytes = body.size_bytes, "Content truncated at size cap");
                    }
                    let outcome = FetchOutcome::success(body, http_status, attempt);
                    debug!(url, http_status, retries = attempt, "Fetched successfully");
                    self.sleeper.sleep(self.config.throttle_delay()).await;
                    return outcome;
                }
                Attempt::Rejected(http_status) => {
                    warn!(url, http_status, "Non-retryable status, giving up");
                    return FetchOutcome::rejected(http_status, attempt);
                }
                Attempt::Retry(failure) => {
                    warn!(url, attempt, error = %failure, "Attempt failed");
                    last_failure = Some(failure);
                }
            }
        }

        warn!(url, retries = max_retries, "Retries exhausted");
        FetchOutcome::exhausted(last_failure, max_retries)
    }

    async fn attempt(&self, url: &str) -> Attempt {
        let mut response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(AttemptFailure::from_transport(&e)),
        };

        let http_status = response.status().as_u16();
        if self.config.is_transient(http_status) {
            return Attempt::Retry(AttemptFailure::TransientStatus(http_status));
        }
        if http_status >= 400 {
            return Attempt::Rejected(http_status);
        }

        let mut body = BodyAccumulator::new(self.config.max_content_size, self.config.chunk_size);
        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    if !body.push(&bytes) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => return Attempt::Retry(AttemptFailure::from_transport(&e)),
            }
        }

        Attempt::Fetched {
            http_status,
            body: body.finish(),
        }
    }
}
