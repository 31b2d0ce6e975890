//! Notification routes.
//!
//! - `POST /api/internal/notifications` accepts a rating notification from a producer.
//! - `GET /api/notifications/{service_provider_id}?lastChecked=<RFC3339>` polls.
//! - `GET /api/notifications/diagnostics/circuit-breaker` reports breaker state.

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use resilience::CircuitBreakerStats;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::notification::{
    CreateNotificationResponse, GetNotificationsResponse, RatingNotificationRequest, StoreStats,
};

/// Router for `/api/internal/notifications`.
pub fn internal_router() -> Router<AppState> {
    Router::new().route("/", post(create_notification))
}

/// Router for `/api/notifications`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/diagnostics/circuit-breaker", get(breaker_diagnostics))
        .route("/{service_provider_id}", get(get_notifications))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollQuery {
    pub last_checked: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerDiagnostics {
    pub notification: CircuitBreakerStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<CircuitBreakerStats>,
    pub store: StoreStats,
}

async fn create_notification(
    State(state): State<AppState>,
    payload: Result<Json<RatingNotificationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateNotificationResponse>)> {
    let Json(request) = payload?;

    let response = state
        .notification_service
        .create_notification(&state.shutdown, request)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_notifications(
    State(state): State<AppState>,
    Path(service_provider_id): Path<String>,
    Query(query): Query<PollQuery>,
) -> ApiResult<Json<GetNotificationsResponse>> {
    let since = parse_last_checked(query.last_checked.as_deref())?;

    let response = state
        .notification_service
        .get_notifications(&state.shutdown, &service_provider_id, since)
        .await?;

    Ok(Json(response))
}

async fn breaker_diagnostics(State(state): State<AppState>) -> Json<BreakerDiagnostics> {
    Json(BreakerDiagnostics {
        notification: state.notification_service.breaker_stats(),
        delivery: state
            .notifier
            .as_ref()
            .map(|notifier| notifier.sink().breaker_stats()),
        store: state.notification_service.store_stats(),
    })
}

/// A missing or empty value means "since the epoch".
fn parse_last_checked(value: Option<&str>) -> ApiResult<DateTime<Utc>> {
    match value.map(str::trim) {
        None | Some("") => Ok(DateTime::UNIX_EPOCH),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                ApiError::bad_request(format!(
                    "Invalid lastChecked timestamp, expected RFC3339: {}",
                    e
                ))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use axum::body::Body;
    use axum::http::{Request, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const PROVIDER: &str = "2f1f4c4e-9f3b-4d5e-8a43-6f0f3f0d8d11";

    fn valid_body() -> Value {
        json!({
            "serviceProviderId": PROVIDER,
            "ratingId": "8b6c2d0a-5a8e-4c1f-b3d3-0d6a3b1e7c22",
            "rating": 5,
            "customerName": "John Doe",
            "comment": "Excellent service!"
        })
    }

    fn post_json(body: String) -> Request<Body> {
        Request::post("/api/internal/notifications")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_parse_last_checked() {
        assert_eq!(parse_last_checked(None).unwrap(), DateTime::UNIX_EPOCH);
        assert_eq!(parse_last_checked(Some("")).unwrap(), DateTime::UNIX_EPOCH);

        let parsed = parse_last_checked(Some("2024-01-15T10:30:00+02:00")).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-15T08:30:00+00:00");

        let err = parse_last_checked(Some("yesterday")).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_then_poll() {
        let app = create_router(AppState::default());

        let response = app
            .clone()
            .oneshot(post_json(valid_body().to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["message"], "Notification created successfully");

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/notifications/{PROVIDER}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let polled = json_body(response).await;
        assert_eq!(polled["hasMore"], false);
        assert_eq!(polled["notifications"].as_array().unwrap().len(), 1);
        assert_eq!(polled["notifications"][0]["id"], created["id"]);
        assert_eq!(
            polled["notifications"][0]["message"],
            "New 5-star rating received from John Doe: \"Excellent service!\""
        );

        let response = app
            .oneshot(
                Request::get(format!("/api/notifications/{PROVIDER}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let polled = json_body(response).await;
        assert!(polled["notifications"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = create_router(AppState::default());
        let response = app.oneshot(post_json("{not json".to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_invalid_rating_is_unprocessable() {
        let app = create_router(AppState::default());
        let mut body = valid_body();
        body["rating"] = json!(6);

        let response = app.oneshot(post_json(body.to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_bad_last_checked_is_bad_request() {
        let app = create_router(AppState::default());
        let response = app
            .oneshot(
                Request::get(format!("/api/notifications/{PROVIDER}?lastChecked=soon"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_breaker_diagnostics() {
        let app = create_router(AppState::default());
        let response = app
            .oneshot(
                Request::get("/api/notifications/diagnostics/circuit-breaker")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["notification"]["state"], "CLOSED");
        assert_eq!(body["notification"]["name"], "notification-store");
        assert!(body.get("delivery").is_none());
        assert_eq!(body["store"]["pending"], 0);
    }
}
