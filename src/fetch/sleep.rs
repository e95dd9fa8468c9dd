//! Pacing seam for the fetch engine
//!
//! The engine suspends in exactly two places: the backoff before a retry and
//! the throttle after a success. Both go through a [`Sleeper`].

use std::future::Future;
use std::time::Duration;

/// Something that can suspend the current task for a duration
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
