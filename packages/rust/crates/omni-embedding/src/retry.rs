//! Structured retry wrapper with exponential backoff and cancellation.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::EmbeddingError;

const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// Attempt budget and backoff base for one provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts (at least one is always made)
    pub max_retries: u32,
    /// Delay after the first failed attempt; doubles each time
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from millisecond settings.
    #[must_use]
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Backoff after the 0-based `attempt` failed: `2^attempt * base`, capped.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let multiplier = 1_u64 << attempt.min(16);
        Duration::from_millis(base_ms.saturating_mul(multiplier).min(MAX_RETRY_BACKOFF_MS))
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
///
/// Only [`EmbeddingError::Transient`] is retried. The last error is returned
/// when attempts run out. Cancellation interrupts both the in-flight attempt
/// and the backoff sleep.
///
/// # Errors
///
/// Returns the operation's error, or [`EmbeddingError::Cancelled`].
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, EmbeddingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EmbeddingError>>,
{
    let attempts = policy.attempts();
    let started = Instant::now();
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(EmbeddingError::Cancelled);
        }
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(EmbeddingError::Cancelled),
            outcome = operation() => outcome,
        };
        let error = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        event = "embedding.retry.recovered",
                        label,
                        attempt = attempt + 1,
                        elapsed_ms = started.elapsed().as_millis(),
                        "embedding call succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        attempt += 1;
        if !error.is_retryable() || attempt >= attempts {
            tracing::debug!(
                event = "embedding.retry.gave_up",
                label,
                attempt,
                attempts,
                retryable = error.is_retryable(),
                error = %error,
                "embedding call failed"
            );
            return Err(error);
        }

        let delay = policy.backoff(attempt - 1);
        tracing::warn!(
            event = "embedding.retry.scheduled",
            label,
            attempt,
            attempts,
            delay_ms = delay.as_millis(),
            error = %error,
            "transient embedding failure; backing off"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(EmbeddingError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
