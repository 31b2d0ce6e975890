//! Resilience primitives shared by the notification pipeline.
//!
//! - [`retry`]: bounded exponential backoff with optional jitter, cancellable
//!   between attempts through a [`CancellationToken`](tokio_util::sync::CancellationToken).
//! - [`circuit_breaker`]: a three-state (CLOSED / OPEN / HALF_OPEN) gate driven by a
//!   rolling failure count.
//!
//! The two compose: [`CircuitBreaker::execute_with_retry`] runs the retry loop inside
//! the breaker's gate, so one breaker admission covers all attempts of one call.
//!
//! # Example
//!
//! ```ignore
//! use resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let breaker = CircuitBreaker::new("notification-http", CircuitBreakerConfig::default());
//! let cancel = CancellationToken::new();
//!
//! let result = breaker
//!     .execute_with_retry(&cancel, &RetryConfig::default(), |_token| async {
//!         send().await
//!     })
//!     .await;
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use error::{BreakerError, ConfigError, RetryError};
pub use retry::{AlwaysRetry, RetryConfig, RetryPolicy, with_retry, with_retry_if};
