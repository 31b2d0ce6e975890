//! Rating event hook.
//!
//! `POST /api/ratings/events` hands a persisted rating to the notifier and returns
//! immediately; delivery happens in the background.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::post,
};
use serde_json::{Value, json};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::delivery::RatingEvent;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", post(rating_created))
}

async fn rating_created(
    State(state): State<AppState>,
    payload: Result<Json<RatingEvent>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(event) = payload?;

    let Some(notifier) = &state.notifier else {
        return Err(ApiError::service_unavailable(
            "Rating notifications are not enabled",
        ));
    };

    if !notifier.notify(&event) {
        return Err(ApiError::service_unavailable("Shutting down"));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "ratingId": event.rating_id })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use crate::delivery::{ProtectedSink, RatingNotifier, StoreSink};
    use axum::body::Body;
    use axum::http::{Request, header};
    use chrono::DateTime;
    use resilience::{CircuitBreakerConfig, RetryConfig};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    const PROVIDER: &str = "2f1f4c4e-9f3b-4d5e-8a43-6f0f3f0d8d11";

    fn event_request() -> Request<Body> {
        let body = json!({
            "serviceProviderId": PROVIDER,
            "ratingId": "8b6c2d0a-5a8e-4c1f-b3d3-0d6a3b1e7c22",
            "ratingValue": 2,
            "comment": "Late"
        });
        Request::post("/api/ratings/events")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_event_is_delivered_to_colocated_store() {
        let state = AppState::default();
        let store = state.notification_service.store().clone();
        let notifier = RatingNotifier::new(
            ProtectedSink::new(
                Arc::new(StoreSink::new(store.clone())),
                RetryConfig::default(),
                CircuitBreakerConfig::default(),
            ),
            &CancellationToken::new(),
        );
        let app = create_router(state.with_notifier(notifier.clone()));

        let response = app.oneshot(event_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        notifier.shutdown(Duration::from_secs(1)).await;
        let stored = store.get_notifications(PROVIDER, DateTime::UNIX_EPOCH);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message, "New 2-star rating received: \"Late\"");
    }

    #[tokio::test]
    async fn test_event_without_notifier_is_unavailable() {
        let app = create_router(AppState::default());
        let response = app.oneshot(event_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
