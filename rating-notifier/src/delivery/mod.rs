//! Producer side of the pipeline.
//!
//! Turns rating events into notification payloads and pushes them through a circuit
//! breaker and retry executor to either a remote notification service over HTTP or a
//! colocated store.

pub mod http;
pub mod notifier;
pub mod payload;
pub mod sink;

pub use http::{HttpNotificationSink, TransportError, is_retryable_transport_error};
pub use notifier::{DEFAULT_DELIVERY_TIMEOUT, RatingNotifier};
pub use payload::{RatingEvent, RatingNotification};
pub use sink::{DeliveryResult, NotificationSink, ProtectedSink, RetryPredicate, StoreSink};
