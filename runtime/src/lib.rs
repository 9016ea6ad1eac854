//! # `iam-runtime`
//!
//! Resilience primitives shared by the eventstore and the projection
//! runtime: retry with exponential backoff, a circuit breaker, and the
//! Prometheus metric descriptions used across the workspace.
//!
//! This crate deliberately does not provide a generic effect-execution
//! loop: the command layer (spec §4.4) is a direct `async fn` that
//! validates, loads, checks, and appends in sequence, not an
//! action/reducer/effect interpreter.
//!
//! ## Example
//!
//! ```
//! use iam_runtime::retry::{RetryPolicy, retry_with_backoff};
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::default();
//! let value = retry_with_backoff(policy, || async { Ok::<_, String>(7) }).await?;
//! assert_eq!(value, 7);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
pub use retry::{retry_with_backoff, retry_with_predicate, RetryPolicy};
