//! In-memory notification store with at-most-once delivery per recipient.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use super::models::Notification;

/// Outcome of a cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Pending entries removed.
    pub removed: usize,
    /// Recipients dropped because they had no pending entries left.
    pub recipients_dropped: usize,
}

/// Store-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub recipients: usize,
    pub pending: usize,
    pub delivered: usize,
}

#[derive(Debug, Default)]
struct StoreInner {
    /// Per-recipient notifications in arrival order.
    pending: HashMap<String, Vec<Notification>>,
    /// Per-recipient ids already handed to a poller.
    delivered: HashMap<String, HashSet<String>>,
}

/// Process-local notification store.
///
/// All operations take the write lock: polling marks entries delivered as a side
/// effect of reading.
#[derive(Debug, Default)]
pub struct NotificationStore {
    inner: RwLock<StoreInner>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a notification to its recipient's pending sequence.
    pub fn store(&self, notification: Notification) {
        let mut inner = self.inner.write();
        debug!(
            notification_id = %notification.id,
            service_provider_id = %notification.service_provider_id,
            "Storing notification"
        );
        inner
            .pending
            .entry(notification.service_provider_id.clone())
            .or_default()
            .push(notification);
    }

    /// Return the recipient's notifications created strictly after `since` that have
    /// not been returned before, and mark them delivered.
    pub fn get_notifications(&self, recipient: &str, since: DateTime<Utc>) -> Vec<Notification> {
        let mut guard = self.inner.write();
        let StoreInner { pending, delivered } = &mut *guard;

        let Some(entries) = pending.get(recipient) else {
            return Vec::new();
        };

        let delivered_ids = delivered.entry(recipient.to_string()).or_default();
        let fresh: Vec<Notification> = entries
            .iter()
            .filter(|n| n.created_at > since && !delivered_ids.contains(&n.id))
            .cloned()
            .collect();

        for notification in &fresh {
            delivered_ids.insert(notification.id.clone());
        }

        if delivered_ids.is_empty() {
            delivered.remove(recipient);
        }

        if !fresh.is_empty() {
            debug!(
                service_provider_id = %recipient,
                count = fresh.len(),
                "Returning notifications"
            );
        }

        fresh
    }

    /// Remove entries older than `max_age` relative to now.
    pub fn cleanup(&self, max_age: Duration) -> CleanupReport {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.cleanup_before(cutoff)
    }

    /// Remove entries with `created_at <= cutoff`, together with their delivered markers.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> CleanupReport {
        let mut guard = self.inner.write();
        let StoreInner { pending, delivered } = &mut *guard;
        let mut report = CleanupReport::default();

        pending.retain(|recipient, entries| {
            let mut markers = delivered.get_mut(recipient);
            entries.retain(|n| {
                if n.created_at > cutoff {
                    return true;
                }
                if let Some(ids) = markers.as_deref_mut() {
                    ids.remove(&n.id);
                }
                report.removed += 1;
                false
            });

            if entries.is_empty() {
                report.recipients_dropped += 1;
                false
            } else {
                true
            }
        });

        delivered.retain(|recipient, ids| !ids.is_empty() && pending.contains_key(recipient));

        if report.removed > 0 {
            info!(
                removed = report.removed,
                recipients_dropped = report.recipients_dropped,
                "Cleaned up old notifications"
            );
        }

        report
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            recipients: inner.pending.len(),
            pending: inner.pending.values().map(Vec::len).sum(),
            delivered: inner.delivered.values().map(HashSet::len).sum(),
        }
    }

    /// Total number of pending entries across recipients.
    pub fn len(&self) -> usize {
        self.inner.read().pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().pending.is_empty()
    }
}
