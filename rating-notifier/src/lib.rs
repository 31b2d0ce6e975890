//! rating-notifier library crate.
//!
//! Resilient delivery of rating notifications: a producer-side notifier that pushes
//! payloads through a circuit breaker and retry executor, and a notification service
//! that stores them in memory and serves each to a polling consumer at most once.

pub mod api;
pub mod config;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod notification;

pub use error::{Error, Result};
