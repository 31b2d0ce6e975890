//! Fire-and-forget delivery of rating notifications.
//!
//! Each notification runs as its own task on a [`TaskTracker`], under a child token of
//! the notifier's cancellation token and a fixed time limit. The task that triggered
//! the notification never waits on it and never sees its failure.

use std::sync::Arc;
use std::time::Duration;

use resilience::{BreakerError, RetryError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::payload::{RatingEvent, RatingNotification};
use super::sink::ProtectedSink;

/// Default upper bound for a single delivery, retries included.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawns protected deliveries in the background.
#[derive(Clone)]
pub struct RatingNotifier {
    sink: Arc<ProtectedSink>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    delivery_timeout: Duration,
}

impl RatingNotifier {
    /// `shutdown` is the process-wide token; cancelling it aborts in-flight deliveries.
    pub fn new(sink: ProtectedSink, shutdown: &CancellationToken) -> Self {
        Self {
            sink: Arc::new(sink),
            tracker: TaskTracker::new(),
            cancel: shutdown.child_token(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn sink(&self) -> &ProtectedSink {
        &self.sink
    }

    /// Number of deliveries still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Queue a notification for `event`.
    ///
    /// Returns false when the notifier is shutting down and the notification was
    /// dropped.
    pub fn notify(&self, event: &RatingEvent) -> bool {
        let payload = RatingNotification::from(event);

        if self.tracker.is_closed() || self.cancel.is_cancelled() {
            warn!(
                rating_id = %payload.rating_id,
                "Notifier is shutting down, dropping notification"
            );
            return false;
        }

        let sink = Arc::clone(&self.sink);
        let token = self.cancel.child_token();
        let limit = self.delivery_timeout;

        self.tracker.spawn(async move {
            deliver(&sink, &payload, &token, limit).await;
        });
        true
    }

    /// Stop accepting notifications and wait for in-flight ones.
    ///
    /// Deliveries still running after `grace` are cancelled.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                in_flight = self.tracker.len(),
                "Grace period elapsed, cancelling in-flight notifications"
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }

        info!("Rating notifier stopped");
    }
}

async fn deliver(
    sink: &ProtectedSink,
    payload: &RatingNotification,
    token: &CancellationToken,
    limit: Duration,
) {
    let delivery = sink.deliver(payload, token);
    tokio::pin!(delivery);

    // Past the deadline the token is cancelled; the delivery is never dropped mid-call.
    let mut timed_out = false;
    let outcome = tokio::select! {
        biased;
        outcome = &mut delivery => outcome,
        _ = tokio::time::sleep(limit) => {
            timed_out = true;
            token.cancel();
            delivery.await
        }
    };
    token.cancel();

    if timed_out && let Err(err) = &outcome {
        error!(
            sink = sink.sink_name(),
            rating_id = %payload.rating_id,
            timeout_ms = limit.as_millis() as u64,
            error = %err,
            "Failed to send notification: timed out"
        );
        return;
    }

    match outcome {
        Ok(()) => {
            debug!(
                sink = sink.sink_name(),
                rating_id = %payload.rating_id,
                "Rating notification delivered"
            );
        }
        Err(BreakerError::Open { name }) => {
            error!(
                sink = sink.sink_name(),
                breaker = %name,
                rating_id = %payload.rating_id,
                "Failed to send notification: circuit open"
            );
        }
        Err(BreakerError::Operation(err)) => {
            let kind = match &err {
                RetryError::Exhausted { .. } => "exhausted",
                RetryError::NonRetryable { .. } => "non_retryable",
                RetryError::Cancelled { .. } => "cancelled",
            };
            error!(
                sink = sink.sink_name(),
                rating_id = %payload.rating_id,
                kind,
                attempts = err.attempts(),
                error = %err,
                "Failed to send notification"
            );
        }
    }
}

impl std::fmt::Debug for RatingNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatingNotifier")
            .field("sink", &self.sink)
            .field("in_flight", &self.tracker.len())
            .field("delivery_timeout", &self.delivery_timeout)
            .finish()
    }
}
