//! Transport seam for rating notifications and its breaker/retry wrapper.

use std::sync::Arc;

use async_trait::async_trait;
use resilience::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, RetryConfig,
    RetryError, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::http::is_retryable_transport_error;
use super::payload::RatingNotification;
use crate::notification::{Notification, NotificationStore, RatingNotificationRequest};
use crate::{Error, Result};

/// Destination for rating notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Short name used in logs and breaker names.
    fn name(&self) -> &'static str;

    /// Deliver one payload. Must return promptly once `cancel` fires.
    async fn send(&self, payload: &RatingNotification, cancel: &CancellationToken) -> Result<()>;
}

/// Writes notifications straight into a colocated store.
pub struct StoreSink {
    store: Arc<NotificationStore>,
}

impl StoreSink {
    pub fn new(store: Arc<NotificationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationSink for StoreSink {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn send(&self, payload: &RatingNotification, _cancel: &CancellationToken) -> Result<()> {
        let request = RatingNotificationRequest::from(payload.clone());
        request.validate()?;

        let notification = Notification::from_request(&request);
        debug!(
            notification_id = %notification.id,
            service_provider_id = %notification.service_provider_id,
            "Notification written to local store"
        );
        self.store.store(notification);
        Ok(())
    }
}

/// Retry classifier selectable per call site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPredicate {
    /// Retry every error.
    Always,
    /// Retry network errors, timeouts and 5xx; stop on 4xx and validation errors.
    #[default]
    Transport,
}

impl RetryPolicy<Error> for RetryPredicate {
    fn is_retryable(&self, error: &Error) -> bool {
        match self {
            Self::Always => true,
            Self::Transport => is_retryable_transport_error(error),
        }
    }
}

/// Outcome of a protected delivery.
pub type DeliveryResult = std::result::Result<(), BreakerError<RetryError<Error>>>;

/// A sink guarded by its own circuit breaker and retry policy.
pub struct ProtectedSink {
    sink: Arc<dyn NotificationSink>,
    breaker: CircuitBreaker,
    retry: RetryConfig,
    predicate: RetryPredicate,
}

impl ProtectedSink {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        retry: RetryConfig,
        circuit_breaker: CircuitBreakerConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(format!("delivery-{}", sink.name()), circuit_breaker);
        Self {
            sink,
            breaker,
            retry,
            predicate: RetryPredicate::default(),
        }
    }

    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Send `payload` through breaker and retry.
    pub async fn deliver(
        &self,
        payload: &RatingNotification,
        cancel: &CancellationToken,
    ) -> DeliveryResult {
        let sink = &self.sink;
        self.breaker
            .execute_with_retry_if(
                cancel,
                &self.retry,
                |token| async move { sink.send(payload, &token).await },
                &self.predicate,
            )
            .await
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    pub fn breaker_stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }
}

impl std::fmt::Debug for ProtectedSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedSink")
            .field("sink", &self.sink.name())
            .field("breaker", &self.breaker)
            .field("retry", &self.retry)
            .field("predicate", &self.predicate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::http::TransportError;
    use chrono::DateTime;
    use resilience::CircuitState;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls with the given status, then succeeds.
    struct FlakySink {
        calls: AtomicU32,
        failures: u32,
        status: u16,
    }

    impl FlakySink {
        fn new(failures: u32, status: u16) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                failures,
                status,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn send(&self, _payload: &RatingNotification, _cancel: &CancellationToken) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(TransportError::Status {
                    status: self.status,
                    body: String::new(),
                }
                .into());
            }
            Ok(())
        }
    }

    fn payload() -> RatingNotification {
        RatingNotification {
            service_provider_id: "2f1f4c4e-9f3b-4d5e-8a43-6f0f3f0d8d11".to_string(),
            rating_id: "8b6c2d0a-5a8e-4c1f-b3d3-0d6a3b1e7c22".to_string(),
            rating: 5,
            customer_name: "John".to_string(),
            comment: String::new(),
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            backoff_factor: 2.0,
            jitter: false,
        }
    }

    fn breaker(threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout_ms: 60_000,
            minimum_requests: 1,
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let sink = FlakySink::new(2, 503);
        let protected = ProtectedSink::new(sink.clone(), fast_retry(), breaker(5));

        protected
            .deliver(&payload(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sink.calls(), 3);
        assert_eq!(protected.breaker_stats().failure_count, 0);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let sink = FlakySink::new(10, 400);
        let protected = ProtectedSink::new(sink.clone(), fast_retry(), breaker(5));

        let err = protected
            .deliver(&payload(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(sink.calls(), 1);
        assert!(matches!(
            err,
            BreakerError::Operation(RetryError::NonRetryable { attempt: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_always_predicate_retries_client_errors() {
        let sink = FlakySink::new(10, 400);
        let protected = ProtectedSink::new(sink.clone(), fast_retry(), breaker(5))
            .with_predicate(RetryPredicate::Always);

        let err = protected
            .deliver(&payload(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(sink.calls(), 3);
        assert!(matches!(
            err,
            BreakerError::Operation(RetryError::Exhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_breaker_fails_fast_after_threshold() {
        let sink = FlakySink::new(u32::MAX, 500);
        let protected = ProtectedSink::new(sink.clone(), fast_retry(), breaker(2));
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            let err = protected.deliver(&payload(), &cancel).await.unwrap_err();
            assert!(!err.is_open());
        }
        assert_eq!(protected.breaker_stats().state, CircuitState::Open);
        let calls_before = sink.calls();

        let err = protected.deliver(&payload(), &cancel).await.unwrap_err();
        assert!(err.is_open());
        assert_eq!(sink.calls(), calls_before);
    }

    #[tokio::test]
    async fn test_store_sink_writes_notification() {
        let store = Arc::new(NotificationStore::new());
        let sink = StoreSink::new(store.clone());

        sink.send(&payload(), &CancellationToken::new())
            .await
            .unwrap();

        let stored = store.get_notifications(&payload().service_provider_id, DateTime::UNIX_EPOCH);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message, "New 5-star rating received from John");
    }

    #[tokio::test]
    async fn test_store_sink_rejects_invalid_payload() {
        let store = Arc::new(NotificationStore::new());
        let protected = ProtectedSink::new(
            Arc::new(StoreSink::new(store.clone())),
            fast_retry(),
            breaker(5),
        );
        let mut bad = payload();
        bad.rating = 0;

        let err = protected
            .deliver(&bad, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BreakerError::Operation(RetryError::NonRetryable { .. })
        ));
        assert!(store.is_empty());
    }
}
