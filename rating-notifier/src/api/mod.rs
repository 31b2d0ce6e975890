//! HTTP API of the notification service.
//!
//! Exposes the internal write endpoint used by producers, the polling endpoint used by
//! service providers, breaker diagnostics, the rating event hook and health probes.

pub mod error;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
