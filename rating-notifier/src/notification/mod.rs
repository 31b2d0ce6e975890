//! Notification side of the pipeline.
//!
//! Receives rating notifications from producers, keeps them in a process-local store
//! and hands each one to a polling consumer at most once.
//!
//! # Example
//!
//! ```ignore
//! use rating_notifier::notification::{NotificationService, NotificationServiceConfig};
//!
//! let service = NotificationService::new(NotificationServiceConfig::default());
//! let created = service.create_notification(&cancel, request).await?;
//! let polled = service.get_notifications(&cancel, &provider_id, since).await?;
//! ```

pub mod models;
pub mod service;
pub mod store;

pub use models::{
    CreateNotificationResponse, GetNotificationsResponse, Notification, RatingNotificationRequest,
    format_notification_message,
};
pub use service::{NotificationService, NotificationServiceConfig};
pub use store::{CleanupReport, NotificationStore, StoreStats};
