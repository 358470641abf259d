//! Retry policy evaluation
//!
//! Pure decision logic: given a failure and the index of the attempt that
//! produced it, decide whether another attempt is allowed and how long to
//! wait before making it.
//!
//! # Example
//!
//! ```
//! use follicore_core_resilience::{RetryPolicy, StatusCode};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy {
//!     max_retries: 2,
//!     initial_backoff: Duration::from_millis(100),
//!     max_backoff: Duration::from_secs(5),
//!     multiplier: 2.0,
//! };
//!
//! assert!(policy.should_retry(&StatusCode::Unavailable, 0));
//! assert!(policy.should_retry(&StatusCode::Unavailable, 1));
//! assert!(!policy.should_retry(&StatusCode::Unavailable, 2));
//! assert!(!policy.should_retry(&StatusCode::InvalidArgument, 0));
//!
//! assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
//! ```

use crate::status::StatusCode;
use rand::Rng;
use std::time::Duration;

/// Upper bound of the random jitter, as a fraction of the base delay
pub const JITTER_RATIO: f64 = 0.1;

/// Classification hook for errors that flow through the retry machinery
pub trait RetryableError {
    /// Whether repeating the failed operation could succeed
    fn is_retryable(&self) -> bool;
}

impl RetryableError for StatusCode {
    fn is_retryable(&self) -> bool {
        StatusCode::is_retryable(*self)
    }
}

/// Retry parameters shared by the retry executor and the reconnection scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Cap applied to every computed delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Decide whether the failure of attempt `attempt_index` (0-based) may be retried
    pub fn should_retry<E: RetryableError + ?Sized>(&self, error: &E, attempt_index: u32) -> bool {
        attempt_index < self.max_retries && error.is_retryable()
    }

    /// Base delay after attempt `attempt`: `min(initial × multiplier^attempt, max)`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let nanos = self.initial_backoff.as_nanos() as f64 * self.multiplier.powi(exponent);
        let cap = self.max_backoff.as_nanos() as f64;
        if nanos.is_nan() || nanos >= cap {
            self.max_backoff
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }

    /// Delay following `current`, grown by the multiplier and capped
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let nanos = current.as_nanos() as f64 * self.multiplier;
        let cap = self.max_backoff.as_nanos() as f64;
        if nanos.is_nan() || nanos >= cap {
            self.max_backoff
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }

    /// Total number of attempts the executor may make
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Free-function form of [`RetryPolicy::should_retry`]
pub fn should_retry<E: RetryableError + ?Sized>(
    error: &E,
    attempt_index: u32,
    policy: &RetryPolicy,
) -> bool {
    policy.should_retry(error, attempt_index)
}

/// Add up to [`JITTER_RATIO`] of `base` as uniform random jitter
pub fn with_jitter(base: Duration) -> Duration {
    if base.is_zero() {
        return base;
    }
    let factor = rand::rng().random_range(0.0..=JITTER_RATIO);
    base + base.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(5000),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = policy(3);
        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(3200));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = policy(3);
        assert_eq!(policy.backoff_for(6), Duration::from_millis(5000));
        assert_eq!(policy.backoff_for(1000), Duration::from_millis(5000));
        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn test_next_backoff_matches_closed_form() {
        let policy = policy(3);
        let mut current = policy.backoff_for(0);
        for attempt in 1..10 {
            current = policy.next_backoff(current);
            assert_eq!(current, policy.backoff_for(attempt));
        }
    }

    #[test]
    fn test_should_retry_stops_at_max_retries() {
        let policy = policy(2);
        assert!(policy.should_retry(&StatusCode::Unavailable, 0));
        assert!(policy.should_retry(&StatusCode::Unavailable, 1));
        assert!(!policy.should_retry(&StatusCode::Unavailable, 2));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_should_retry_rejects_request_shape_errors() {
        let policy = policy(5);
        for code in [
            StatusCode::InvalidArgument,
            StatusCode::NotFound,
            StatusCode::PermissionDenied,
            StatusCode::Unauthenticated,
        ] {
            assert!(!should_retry(&code, 0, &policy), "{code} must not retry");
        }
    }

    #[test]
    fn test_zero_retries_never_retries() {
        let policy = policy(0);
        assert!(!policy.should_retry(&StatusCode::Unavailable, 0));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let base = Duration::from_millis(200);
        for _ in 0..1000 {
            let delay = with_jitter(base);
            assert!(delay >= base);
            assert!(delay <= base + base.mul_f64(JITTER_RATIO));
        }
    }

    #[test]
    fn test_jitter_of_zero_is_zero() {
        assert_eq!(with_jitter(Duration::ZERO), Duration::ZERO);
    }
}
