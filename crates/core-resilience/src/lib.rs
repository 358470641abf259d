//! FolliCore Core Resilience: retry primitives for remote inference calls
//!
//! # Overview
//!
//! This crate holds the transport-agnostic half of the inference client's
//! fault tolerance:
//!
//! - **Status taxonomy**: the standard RPC status codes and which of them are retryable
//! - **Retry policy**: attempt limits and the exponential backoff schedule
//! - **Retry executor**: runs an async operation under a policy, sleeping with jitter between attempts
//!
//! The crate has no knowledge of channels, schemas or any RPC framework.
//! Connection handling builds on it from `follicore-connect`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        InferenceClient::call            │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       RetryExecutor                     │  ← attempt loop
//! │  (sleep with_jitter(backoff) on retry)  │
//! └─────────────┬───────────────────────────┘
//!               │ classify failure
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       RetryPolicy + StatusCode          │  ← pure decisions
//! │  (attempt < max_retries && retryable)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```
//! use follicore_core_resilience::{RetryExecutor, RetryPolicy, StatusCode};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let executor = RetryExecutor::new(RetryPolicy {
//!     max_retries: 2,
//!     initial_backoff: Duration::from_millis(1),
//!     max_backoff: Duration::from_millis(10),
//!     multiplier: 2.0,
//! });
//!
//! let outcome: Result<(), StatusCode> = executor
//!     .execute("vision.Analyze", |_| async { Err(StatusCode::InvalidArgument) })
//!     .await;
//!
//! // Request-shape failures are never retried
//! assert_eq!(outcome, Err(StatusCode::InvalidArgument));
//! # }
//! ```

pub mod policy;
pub mod retry;
pub mod status;

// Re-export main types for convenience
pub use policy::{should_retry, with_jitter, RetryPolicy, RetryableError, JITTER_RATIO};
pub use retry::{RetryAttempt, RetryExecutor};
pub use status::StatusCode;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use follicore_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::policy::{RetryPolicy, RetryableError};
    pub use super::retry::RetryExecutor;
    pub use super::status::StatusCode;
}
