//! Retry with exponential backoff
//!
//! Shared by the elevation batches and the model tiers.
//!
//! **Algorithm:**
//! 1. If cancellation was requested, stop
//! 2. Attempt operation; on success return the result
//! 3. If the error is not retryable, return it immediately
//! 4. If attempts are exhausted, return the last error
//! 5. Sleep `backoff_base_secs ^ attempt` seconds (cancellable), go to 1

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Attempt budget and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after failed attempt `n` is `backoff_base_secs ^ n` seconds
    pub backoff_base_secs: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base_secs: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base_secs,
        }
    }

    /// Backoff before the attempt following failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base_secs.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            tphysio_common::config::DEFAULT_MAX_ATTEMPTS,
            tphysio_common::config::DEFAULT_BACKOFF_BASE_SECS,
        )
    }
}

/// Why a retry loop gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Cancellation observed before an attempt or during a backoff
    Cancelled,
    /// Non-retryable error on `attempt`
    Aborted { attempt: u32, error: E },
    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    /// Underlying error, if any
    pub fn into_error(self) -> Option<E> {
        match self {
            RetryError::Cancelled => None,
            RetryError::Aborted { error, .. } | RetryError::Exhausted { error, .. } => Some(error),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, runs
/// out of attempts, or `cancel` fires.
///
/// `operation` receives the 1-based attempt number.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    operation_name: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    should_retry: R,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            tracing::debug!(operation = operation_name, attempt, "Cancelled before attempt");
            return Err(RetryError::Cancelled);
        }

        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !should_retry(&error) {
            tracing::warn!(
                operation = operation_name,
                attempt,
                error = %error,
                "Non-retryable failure"
            );
            return Err(RetryError::Aborted { attempt, error });
        }

        if attempt >= policy.max_attempts {
            tracing::error!(
                operation = operation_name,
                attempt,
                error = %error,
                "Giving up: max attempts exhausted"
            );
            return Err(RetryError::Exhausted { attempts: attempt, error });
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            operation = operation_name,
            attempt,
            max_attempts = policy.max_attempts,
            backoff_secs = delay.as_secs(),
            error = %error,
            "Attempt failed, will retry after backoff"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(operation = operation_name, attempt, "Cancelled during backoff");
                return Err(RetryError::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
