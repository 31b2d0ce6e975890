//! Circuit breaker for protecting a downstream call path.
//!
//! ```text
//! CLOSED ──[failure_threshold failures]──> OPEN
//!   ▲                                       │
//!   │                                       │ [recovery_timeout elapsed]
//!   │                                       ▼
//!   └──[minimum_requests successes]── HALF_OPEN
//!            [any failure] ─────────────────> OPEN
//! ```
//!
//! One breaker guards one call path; breakers are never shared between independent
//! paths. Admission and result bookkeeping run under the breaker's write lock, the
//! protected operation itself runs outside of it.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{BreakerError, ConfigError, RetryError};
use crate::retry::{AlwaysRetry, RetryConfig, RetryPolicy, with_retry_if};

/// Minimum accepted recovery timeout.
const MIN_RECOVERY_TIMEOUT: Duration = Duration::from_secs(1);

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation, all calls pass.
    Closed,
    /// Failing fast, calls are rejected.
    Open,
    /// Probing recovery with a limited number of calls.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures while CLOSED that open the circuit.
    pub failure_threshold: u32,
    /// Time spent OPEN before a probe call is admitted, in milliseconds.
    pub recovery_timeout_ms: u64,
    /// Calls admitted in HALF_OPEN; that many successes close the circuit.
    pub minimum_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            minimum_requests: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::new(
                "circuit_breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.recovery_timeout() < MIN_RECOVERY_TIMEOUT {
            return Err(ConfigError::new(
                "circuit_breaker.recovery_timeout_ms",
                format!("must be at least 1000ms, got {}ms", self.recovery_timeout_ms),
            ));
        }
        if self.minimum_requests == 0 {
            return Err(ConfigError::new(
                "circuit_breaker.minimum_requests",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Diagnostic snapshot of a breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub request_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    /// Calls admitted since entering HALF_OPEN.
    request_count: u32,
    /// Successful completions since entering HALF_OPEN.
    half_open_successes: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            request_count: 0,
            half_open_successes: 0,
            last_failure: None,
            last_failure_at: None,
        }
    }

    fn reset_half_open(&mut self) {
        self.request_count = 0;
        self.half_open_successes = 0;
    }
}

/// Failure-count circuit breaker.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker in the CLOSED state.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: RwLock::new(BreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    /// Snapshot of state and counters.
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.read();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            request_count: inner.request_count,
            last_failure_time: inner.last_failure_at,
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns [`BreakerError::Open`] without invoking the operation when the gate is
    /// closed to traffic. Every admitted call's outcome is recorded.
    pub async fn execute<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(admission) = self.try_acquire() else {
            debug!(breaker = %self.name, "Circuit breaker rejected call");
            return Err(BreakerError::Open {
                name: self.name.clone(),
            });
        };

        let result = operation(cancel.clone()).await;
        admission.record(result.is_ok());
        result.map_err(BreakerError::Operation)
    }

    /// Run `operation` with retries inside a single breaker admission, retrying every
    /// error.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        retry: &RetryConfig,
        operation: F,
    ) -> Result<T, BreakerError<RetryError<E>>>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_with_retry_if(cancel, retry, operation, &AlwaysRetry)
            .await
    }

    /// Like [`execute_with_retry`](Self::execute_with_retry) with a custom retry policy.
    pub async fn execute_with_retry_if<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        retry: &RetryConfig,
        operation: F,
        policy: &P,
    ) -> Result<T, BreakerError<RetryError<E>>>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: RetryPolicy<E> + ?Sized,
    {
        self.execute(cancel, move |token| async move {
            with_retry_if(&token, retry, operation, policy).await
        })
        .await
    }

    /// Admission decision. Performs the OPEN -> HALF_OPEN transition.
    fn try_acquire(&self) -> Option<Admission<'_>> {
        let mut inner = self.inner.write();

        let admitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let recovered = inner
                    .last_failure
                    .is_none_or(|at| at.elapsed() >= self.config.recovery_timeout());
                if recovered {
                    inner.state = CircuitState::HalfOpen;
                    inner.reset_half_open();
                    inner.request_count = 1;
                    info!(breaker = %self.name, "Circuit breaker transitioning to HALF_OPEN state");
                }
                recovered
            }
            CircuitState::HalfOpen => {
                let admitted = inner.request_count < self.config.minimum_requests;
                if admitted {
                    inner.request_count += 1;
                }
                admitted
            }
        };

        admitted.then_some(Admission {
            breaker: self,
            recorded: false,
        })
    }

    fn record_result(&self, success: bool) {
        let mut inner = self.inner.write();

        if success {
            match inner.state {
                CircuitState::Closed => {
                    if inner.failure_count > 0 {
                        inner.failure_count = 0;
                    }
                }
                CircuitState::HalfOpen => {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.minimum_requests {
                        inner.state = CircuitState::Closed;
                        inner.failure_count = 0;
                        inner.reset_half_open();
                        info!(
                            breaker = %self.name,
                            "Circuit breaker closing after successful requests in HALF_OPEN"
                        );
                    }
                }
                // A call admitted before the circuit opened; nothing to record.
                CircuitState::Open => {}
            }
            return;
        }

        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    error!(
                        breaker = %self.name,
                        failure_count = inner.failure_count,
                        "Circuit breaker opening due to failure threshold"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.reset_half_open();
                warn!(
                    breaker = %self.name,
                    "Circuit breaker returning to OPEN state after failure in HALF_OPEN"
                );
            }
            // Late failure of a call admitted earlier restarts the recovery timeout.
            CircuitState::Open => {}
        }
    }
}

/// An admitted call. Dropping it without [`record`](Self::record) counts as a failure,
/// so an abandoned call never keeps a HALF_OPEN slot.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    recorded: bool,
}

impl Admission<'_> {
    fn record(mut self, success: bool) {
        self.recorded = true;
        self.breaker.record_result(success);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            warn!(breaker = %self.breaker.name, "Admitted call abandoned before completion");
            self.breaker.record_result(false);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
