//! A reusable retry/backoff primitive (§2.1, §4.5).
//!
//! Grounded on the shape the teacher crate's own call sites expect from this module
//! (`client::controller::maybe_retry`'s use of `ErrorOrThrottle`/`Backoff` and
//! `throttle::maybe_throttle`'s `ErrorOrThrottle::Throttle` arm): a small state machine
//! that hands back either "wait this long and try again" or "give up", and a wrapper
//! type distinguishing "the operation failed" from "the server asked us to slow down".

use std::ops::ControlFlow;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// An operation either failed outright, or the server asked the caller to wait and try
/// again (e.g. a quota/throttle response). Distinguishing the two lets a retry loop
/// treat them identically for control flow while still logging them differently.
#[derive(Debug)]
pub enum ErrorOrThrottle<E> {
    Error(E),
    Throttle(Duration),
}

/// Configuration for a [`Backoff`] sequence (§4.1: `SEND_MAX_ATTEMPTS`, `RETRY_BACKOFF`).
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Maximum number of attempts, including the first. Must be at least 1.
    pub max_attempts: u32,

    /// Base delay between attempts.
    pub base_delay: Duration,

    /// Upper bound applied after exponential growth, so retries don't grow unbounded.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Drives one retry sequence: each call to [`Backoff::next`] either returns the delay to
/// sleep before the next attempt, or `None` once the attempt budget is exhausted.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of attempts made so far (including ones not yet started).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay to wait before the next attempt, or `None` if the attempt
    /// budget (`max_attempts`) has been exhausted.
    pub fn next(&mut self) -> Option<Duration> {
        if self.attempt + 1 >= self.config.max_attempts {
            self.attempt += 1;
            return None;
        }

        let exp = 2u32.saturating_pow(self.attempt);
        let backoff = self.config.base_delay.saturating_mul(exp).min(self.config.max_delay);

        // +/-10% jitter so a cluster of retrying clients doesn't reconverge in lockstep.
        let jitter_frac = rand::thread_rng().gen_range(0.9..1.1);
        let delay = backoff.mul_f64(jitter_frac);

        self.attempt += 1;
        Some(delay)
    }
}

/// Drives `f` through a [`Backoff`] sequence, sleeping between attempts, until it
/// succeeds, hits a non-retryable error, or exhausts its attempt budget.
///
/// `f` returns `Ok(T)` on success or `Err(ControlFlow::Break(e))` for a failure that
/// should be raised immediately without consuming the retry budget (the boundary
/// argument-validation and `NoKnownBrokers` cases of §4.5), or
/// `Err(ControlFlow::Continue(e))` for one that should be retried with backoff (the
/// IO/stale-leadership cases of §4.5 step 4).
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: BackoffConfig,
    mut f: F,
) -> Result<T, ErrorOrThrottle<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ControlFlow<E, E>>>,
{
    let mut backoff = Backoff::new(config);

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(ControlFlow::Break(err)) => return Err(ErrorOrThrottle::Error(err)),
            Err(ControlFlow::Continue(err)) => match backoff.next() {
                Some(delay) => {
                    warn!(attempt = backoff.attempt(), ?delay, "retrying after backoff");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(ErrorOrThrottle::Error(err)),
            },
        }
    }
}
