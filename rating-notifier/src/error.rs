//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::delivery::TransportError),

    /// The circuit breaker rejected the call without running it.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The protected call ran and failed (retries exhausted, non-retryable error or
    /// cancellation).
    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Map the outcome of a breaker-protected retry call.
    pub fn from_protected<E: std::fmt::Display>(
        err: resilience::BreakerError<resilience::RetryError<E>>,
    ) -> Self {
        match err {
            resilience::BreakerError::Open { .. } => Self::Unavailable(err.to_string()),
            resilience::BreakerError::Operation(inner) => Self::Delivery(inner.to_string()),
        }
    }
}

impl From<resilience::ConfigError> for Error {
    fn from(err: resilience::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
