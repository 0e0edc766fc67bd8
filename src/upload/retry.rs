//! Retry policy for part uploads.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::TransportError;

/// Default number of attempts per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff unit.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// How a retried operation ended without success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// A terminal error; no further attempts were made.
    Rejected {
        /// The error that stopped the loop.
        error: TransportError,
        /// Attempts made.
        attempts: u32,
    },
    /// Every attempt failed with a transient error.
    Exhausted {
        /// Error of the last attempt.
        error: TransportError,
        /// Attempts made.
        attempts: u32,
    },
    /// The cancellation token fired.
    Cancelled,
}

/// Bounded retries with linearly growing backoff.
///
/// The wait after failed attempt `n` is `n * backoff_base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff unit.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    /// Create a policy. At least one attempt is always made.
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Wait after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }

    /// Run `op` until it succeeds, fails terminally or runs out of attempts.
    ///
    /// Each attempt is bounded by `timeout`; an elapsed timeout counts as a
    /// transient failure. Cancellation interrupts both the attempt and the
    /// backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                r = tokio::time::timeout(timeout, op(attempt)) => match r {
                    Ok(r) => r,
                    Err(_) => Err(TransportError::Timeout(timeout)),
                },
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(RetryError::Rejected {
                    error,
                    attempts: attempt,
                });
            }
            if attempt >= self.max_attempts {
                return Err(RetryError::Exhausted {
                    error,
                    attempts: attempt,
                });
            }

            let delay = self.backoff(attempt);
            tracing::warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Request failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
