//! Retry executor with exponential backoff and jitter
//!
//! Wraps one logical remote invocation. Each failure is classified through
//! the [`RetryPolicy`]; retryable failures are absorbed until the policy's
//! limit, after which the error from the last attempt is returned unchanged.

use crate::policy::{with_jitter, RetryPolicy, RetryableError};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Bookkeeping for one failed attempt inside a single `execute` call
#[derive(Debug)]
pub struct RetryAttempt<'a, E> {
    /// 0-based index of the attempt that failed
    pub index: u32,
    /// Backoff slept so far across this call
    pub elapsed_backoff: Duration,
    /// Failure produced by this attempt
    pub last_error: &'a E,
}

/// Executes operations under a retry policy
///
/// # Example
///
/// ```
/// use follicore_core_resilience::{RetryExecutor, RetryPolicy, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let executor = RetryExecutor::new(RetryPolicy::default());
///
/// let result = executor
///     .execute("vision.Analyze", |attempt| async move {
///         if attempt == 0 {
///             Err(StatusCode::Unavailable)
///         } else {
///             Ok(7)
///         }
///     })
///     .await;
///
/// assert_eq!(result, Ok(7));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create an executor for the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Policy this executor applies
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// policy's retry budget is spent.
    ///
    /// `op` receives the 0-based attempt index. The returned error is always
    /// the one produced by the final attempt.
    pub async fn execute<F, Fut, T, E>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + Display,
    {
        let mut backoff = self.policy.backoff_for(0);
        let mut elapsed_backoff = Duration::ZERO;
        let mut index = 0u32;

        loop {
            let error = match op(index).await {
                Ok(value) => {
                    if index > 0 {
                        debug!(operation, attempts = index + 1, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let attempt = RetryAttempt {
                index,
                elapsed_backoff,
                last_error: &error,
            };

            if !self.policy.should_retry(attempt.last_error, attempt.index) {
                if attempt.last_error.is_retryable() {
                    warn!(
                        operation,
                        attempts = attempt.index + 1,
                        backoff_ms = attempt.elapsed_backoff.as_millis() as u64,
                        error = %attempt.last_error,
                        "retries exhausted"
                    );
                } else {
                    debug!(
                        operation,
                        attempt = attempt.index,
                        error = %attempt.last_error,
                        "non-retryable failure"
                    );
                }
                return Err(error);
            }

            let delay = with_jitter(backoff);
            warn!(
                operation,
                attempt = attempt.index + 1,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %attempt.last_error,
                "retrying after failure"
            );

            sleep(delay).await;
            elapsed_backoff += delay;
            backoff = self.policy.next_backoff(backoff);
            index += 1;
        }
    }
}
