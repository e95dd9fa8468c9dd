//! Fetch engine for document retrieval
//!
//! This module contains the per-document fetch policy:
//! - HTTP fetching with bounded retries and exponential backoff
//! - Size-capped body streaming with an explicit truncation marker
//! - Content digests for change detection
//! - The pacing seam used for backoff and throttle sleeps

mod body;
mod digest;
mod engine;
mod sleep;

pub use body::{truncation_marker, Body, BodyAccumulator};
pub use digest::content_digest;
pub use engine::{build_http_client, AttemptFailure, FetchOutcome, FetchStatus, Fetcher};
pub use sleep::{Sleeper, TokioSleeper};
