//! Notification-side delivery service.
//!
//! Owns the [`NotificationStore`] and protects writes and polls with its own circuit
//! breaker. Writes additionally go through the retry executor. A background worker
//! sweeps entries older than the configured maximum age.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use resilience::{
    AlwaysRetry, BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats,
    RetryConfig, RetryPolicy,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::models::{
    CreateNotificationResponse, GetNotificationsResponse, Notification, RatingNotificationRequest,
};
use super::store::{NotificationStore, StoreStats};
use crate::{Error, Result};

const BREAKER_NAME: &str = "notification-store";

/// Runtime configuration for [`NotificationService`].
#[derive(Debug, Clone)]
pub struct NotificationServiceConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Period of the cleanup sweep.
    pub cleanup_interval: Duration,
    /// Entries at least this old are removed by the sweep.
    pub max_age: Duration,
}

impl Default for NotificationServiceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cleanup_interval: Duration::from_secs(5 * 60),
            max_age: Duration::from_secs(60 * 60),
        }
    }
}

/// Accepts notifications from producers and serves them to polling consumers.
pub struct NotificationService {
    config: NotificationServiceConfig,
    store: Arc<NotificationStore>,
    breaker: CircuitBreaker,
    retry_policy: Arc<dyn RetryPolicy<Error>>,
}

impl NotificationService {
    /// Create a service with a fresh store and the permissive retry policy.
    pub fn new(config: NotificationServiceConfig) -> Self {
        Self::with_store(config, Arc::new(NotificationStore::new()))
    }

    /// Create a service around an existing store.
    pub fn with_store(config: NotificationServiceConfig, store: Arc<NotificationStore>) -> Self {
        let breaker = CircuitBreaker::new(BREAKER_NAME, config.circuit_breaker.clone());
        Self {
            config,
            store,
            breaker,
            retry_policy: Arc::new(AlwaysRetry),
        }
    }

    /// Replace the retry classifier used on the store-write path.
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy<Error> + 'static) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    pub fn config(&self) -> &NotificationServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    /// Validate a rating notification and store it.
    pub async fn create_notification(
        &self,
        cancel: &CancellationToken,
        request: RatingNotificationRequest,
    ) -> Result<CreateNotificationResponse> {
        request.validate()?;

        let notification = Notification::from_request(&request);
        let id = notification.id.clone();
        let store = &self.store;

        self.breaker
            .execute_with_retry_if(
                cancel,
                &self.config.retry,
                |_token| {
                    let notification = notification.clone();
                    async move {
                        store.store(notification);
                        Ok::<_, Error>(())
                    }
                },
                &*self.retry_policy,
            )
            .await
            .map_err(Error::from_protected)?;

        info!(
            notification_id = %id,
            service_provider_id = %request.service_provider_id,
            rating_id = %request.rating_id,
            "Notification created"
        );

        Ok(CreateNotificationResponse {
            id,
            message: "Notification created successfully".to_string(),
        })
    }

    /// Return notifications for `recipient` created after `since` that were not
    /// returned before.
    pub async fn get_notifications(
        &self,
        cancel: &CancellationToken,
        recipient: &str,
        since: DateTime<Utc>,
    ) -> Result<GetNotificationsResponse> {
        let store = &self.store;
        let notifications = self
            .breaker
            .execute(cancel, |_token| async move {
                Ok::<_, Error>(store.get_notifications(recipient, since))
            })
            .await
            .map_err(|err| match err {
                BreakerError::Open { .. } => Error::Unavailable(err.to_string()),
                BreakerError::Operation(inner) => inner,
            })?;

        debug!(
            service_provider_id = %recipient,
            since = %since,
            count = notifications.len(),
            "Notifications polled"
        );

        Ok(GetNotificationsResponse {
            notifications,
            has_more: false,
        })
    }

    /// Sweep old entries every `cleanup_interval` until `cancel` fires.
    pub async fn run_cleanup_worker(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            interval_secs = self.config.cleanup_interval.as_secs(),
            max_age_secs = self.config.max_age.as_secs(),
            "Notification cleanup worker started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Notification cleanup worker stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let report = self.store.cleanup(self.config.max_age);
                    debug!(removed = report.removed, "Cleanup sweep finished");
                }
            }
        }
    }

    /// Spawn [`run_cleanup_worker`](Self::run_cleanup_worker) onto the runtime.
    pub fn spawn_cleanup_worker(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.run_cleanup_worker(cancel).await })
    }

    pub fn breaker_stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }
}

impl std::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationService")
            .field("config", &self.config)
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}
