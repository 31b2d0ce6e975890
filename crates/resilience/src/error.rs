//! Error types for retry and circuit breaker execution.

use thiserror::Error;

/// Invalid retry or circuit breaker configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Terminal outcome of a failed [`with_retry`](crate::with_retry) call.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("operation failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The retry policy classified the error as permanent.
    #[error("operation failed with non-retryable error on attempt {attempt}: {source}")]
    NonRetryable {
        attempt: u32,
        #[source]
        source: E,
    },

    /// The cancellation token fired while waiting for the next attempt.
    #[error("context cancelled during retry after {attempts} attempts (last error: {last_error})")]
    Cancelled { attempts: u32, last_error: E },
}

impl<E> RetryError<E> {
    /// The last error returned by the operation.
    pub fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => source,
            Self::Cancelled { last_error, .. } => last_error,
        }
    }

    /// Number of times the operation was invoked.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
            Self::NonRetryable { attempt, .. } => *attempt,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn into_last_error(self) -> E {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => source,
            Self::Cancelled { last_error, .. } => last_error,
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute).
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// The breaker rejected the call without invoking the operation.
    #[error("circuit breaker '{name}' is OPEN, failing fast")]
    Open { name: String },

    /// The operation ran and failed.
    #[error(transparent)]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Whether the call was rejected by the gate (treat as "try later").
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Open { .. } => None,
            Self::Operation(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Error, Debug, PartialEq)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_retry_error_accessors() {
        let err = RetryError::Exhausted {
            attempts: 3,
            source: Boom,
        };
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.last_error(), &Boom);
        assert!(!err.is_cancelled());
        assert_eq!(err.to_string(), "operation failed after 3 attempts: boom");

        let err = RetryError::Cancelled {
            attempts: 1,
            last_error: Boom,
        };
        assert!(err.is_cancelled());
        assert!(err.to_string().starts_with("context cancelled during retry"));
    }

    #[test]
    fn test_breaker_error_open_is_distinct() {
        let open: BreakerError<Boom> = BreakerError::Open {
            name: "test".to_string(),
        };
        assert!(open.is_open());
        assert!(open.operation_error().is_none());
        assert!(open.to_string().contains("is OPEN"));

        let failed = BreakerError::Operation(Boom);
        assert!(!failed.is_open());
        assert_eq!(failed.to_string(), "boom");
    }
}
