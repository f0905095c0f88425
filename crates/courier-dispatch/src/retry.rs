//! Transient-failure retry with a fixed inter-attempt delay.
//!
//! Only failures where no response was received (status `0`) are retried.
//! Attempts are strictly sequential; the next one starts only after the
//! previous failure has been observed and the delay has elapsed.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::constants::{MAX_ATTEMPTS, RETRY_DELAY};
use crate::error::{DispatchError, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included (default: 3).
    pub max_attempts: u32,
    /// Delay between attempts (default: 1 second).
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            delay: RETRY_DELAY,
        }
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// Operation succeeded.
    Success(T),
    /// The last attempt failed, or a failure was not retryable.
    Exhausted {
        /// The last error that occurred.
        last_error: DispatchError,
        /// Total number of attempts made.
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    /// Converts the outcome into a plain result.
    pub fn into_result(self) -> Result<T> {
        match self {
            RetryOutcome::Success(value) => Ok(value),
            RetryOutcome::Exhausted { last_error, .. } => Err(last_error),
        }
    }
}

/// Runs operations under the retry policy.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new RetryExecutor with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt ceiling is reached.
    ///
    /// A cancelled `cancel` token ends the backoff wait early with
    /// [`DispatchError::Cancelled`].
    pub async fn execute<F, Fut, T>(
        &self,
        cancel: Option<&CancellationToken>,
        operation: F,
    ) -> RetryOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => return RetryOutcome::Success(value),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= max_attempts {
                return RetryOutcome::Exhausted {
                    last_error: err,
                    attempts: attempt,
                };
            }

            info!(
                "Attempt {}/{} failed with status 0 ({}), retrying in {}ms",
                attempt,
                max_attempts,
                err,
                self.config.delay.as_millis()
            );

            if !self.backoff(cancel).await {
                return RetryOutcome::Exhausted {
                    last_error: DispatchError::Cancelled,
                    attempts: attempt,
                };
            }
        }
    }

    /// Sleeps for the configured delay; `false` if cancelled first.
    async fn backoff(&self, cancel: Option<&CancellationToken>) -> bool {
        match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => false,
                _ = tokio::time::sleep(self.config.delay) => true,
            },
            None => {
                tokio::time::sleep(self.config.delay).await;
                true
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
