//! Bounded retry with exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::warn;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl RetryPolicy {
    /// Doubling delays from `base_delay`, capped at `max_delay`, without
    /// jitter or an elapsed-time limit. The attempt ceiling is enforced by
    /// [`retry`], not by the schedule.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_randomization_factor(0.0)
            .with_multiplier(2.0)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Result of [`retry`].
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success(T),
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last_error: E },
    /// A non-retryable error; no further attempts were made.
    Fatal(E),
}

/// Runs `op` until it succeeds, fails with an error `is_retryable` rejects,
/// or `policy.max_attempts` attempts have failed. `op` receives the 1-based
/// attempt number.
pub async fn retry<T, E, F, Fut, P>(policy: &RetryPolicy, is_retryable: P, mut op: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.backoff();
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return RetryOutcome::Success(value),
            Err(e) if !is_retryable(&e) => return RetryOutcome::Fatal(e),
            Err(e) if attempt >= max_attempts => {
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: e,
                }
            }
            Err(e) => {
                let delay = backoff.next_backoff().unwrap_or(policy.max_delay);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable failure, trying again"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
