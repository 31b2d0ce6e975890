//! Retry executor with exponential backoff and jitter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ConfigError, RetryError};

/// Upper bound on `max_attempts` accepted by [`RetryConfig::validate`].
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Jitter is drawn uniformly from `[0, JITTER_RATIO * delay]`.
const JITTER_RATIO: f64 = 0.1;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds.
    pub initial_delay_ms: u64,
    /// Cap on the computed delay in milliseconds (jitter is added on top).
    pub max_delay_ms: u64,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Whether to add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Validate the configuration. Called once at load time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(ConfigError::new(
                "retry.max_attempts",
                format!("must be between 1 and {MAX_ATTEMPTS_LIMIT}, got {}", self.max_attempts),
            ));
        }
        if self.initial_delay_ms == 0 {
            return Err(ConfigError::new("retry.initial_delay_ms", "must be at least 1ms"));
        }
        if self.max_delay_ms == 0 {
            return Err(ConfigError::new("retry.max_delay_ms", "must be at least 1ms"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::new(
                "retry.backoff_factor",
                format!("must be a finite value >= 1.0, got {}", self.backoff_factor),
            ));
        }
        Ok(())
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// `min(initial * factor^(attempt-1), max)`, plus jitter when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for_attempt(attempt);
        if !self.jitter {
            return delay;
        }

        let jitter_ns = delay.as_nanos() as f64 * JITTER_RATIO * rand::random::<f64>();
        delay + Duration::from_nanos(jitter_ns as u64)
    }

    /// Longest total time spent sleeping between attempts, jitter included.
    pub fn max_total_delay(&self) -> Duration {
        let total: Duration = (1..self.max_attempts.max(1))
            .map(|attempt| self.base_delay_for_attempt(attempt))
            .sum();
        if self.jitter {
            total.mul_f64(1.0 + JITTER_RATIO)
        } else {
            total
        }
    }

    fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let initial_ns = self.initial_delay().as_nanos() as f64;
        let max_ns = self.max_delay().as_nanos() as f64;

        // powi overflows to +inf for large exponents, which min() then caps.
        let delay_ns = (initial_ns * self.backoff_factor.powi(exponent)).min(max_ns);
        Duration::from_nanos(delay_ns as u64)
    }
}

/// Classifies an error as worth retrying.
pub trait RetryPolicy<E>: Send + Sync {
    fn is_retryable(&self, error: &E) -> bool;
}

/// Policy that retries every error.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E> RetryPolicy<E> for AlwaysRetry {
    fn is_retryable(&self, _error: &E) -> bool {
        true
    }
}

impl<E, F> RetryPolicy<E> for F
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_retryable(&self, error: &E) -> bool {
        self(error)
    }
}

/// Run `operation` with retries, treating every error as retryable.
pub async fn with_retry<T, E, F, Fut>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    with_retry_if(cancel, config, operation, &AlwaysRetry).await
}

/// Run `operation` up to `config.max_attempts` times, sequentially.
///
/// Between attempts the executor sleeps for [`RetryConfig::delay_for_attempt`]; the
/// sleep races against `cancel`, and a cancellation returns
/// [`RetryError::Cancelled`] without invoking the operation again. An error the
/// policy rejects is returned immediately as [`RetryError::NonRetryable`].
pub async fn with_retry_if<T, E, F, Fut, P>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    mut operation: F,
    policy: &P,
) -> Result<T, RetryError<E>>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: RetryPolicy<E> + ?Sized,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        let err = match operation(cancel.clone()).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !policy.is_retryable(&err) {
            info!(attempt, error = %err, "Error is not retryable, stopping");
            return Err(RetryError::NonRetryable {
                attempt,
                source: err,
            });
        }

        if attempt >= max_attempts {
            error!(attempts = attempt, error = %err, "All retry attempts exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                source: err,
            });
        }

        let delay = config.delay_for_attempt(attempt);
        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Operation failed, retrying after delay"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(attempt, "Retry cancelled while waiting for next attempt");
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last_error: err,
                });
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}
