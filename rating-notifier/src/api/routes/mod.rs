//! API route modules.

pub mod health;
pub mod notifications;
pub mod ratings;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/internal/notifications", notifications::internal_router())
        .nest("/api/notifications", notifications::router())
        .nest("/api/ratings", ratings::router())
        .nest("/health", health::router())
        .with_state(state)
}
