//! Error responses of the HTTP API.
//!
//! Handlers return [`ApiResult`]; every failure becomes a `{ code, message }` JSON body
//! with the matching status.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;

/// JSON body written for a failed request.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Stable machine-readable code, e.g. `VALIDATION_ERROR`.
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Malformed body or query string.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Well-formed request whose fields fail validation (422).
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    /// Open breaker or a notifier that is shutting down.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => Self::validation(msg),
            Error::Unavailable(msg) => {
                tracing::warn!(reason = %msg, "Rejected by circuit breaker");
                Self::service_unavailable(msg)
            }
            Error::Delivery(msg) => {
                tracing::error!(reason = %msg, "Notification operation failed");
                Self::internal("Failed to process notification")
            }
            other => {
                // Internal detail stays in the log, never in the response.
                tracing::error!(error = %other, "Unhandled error in request");
                Self::internal("An unexpected error occurred")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::Value;

    async fn body_json(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_response_body_shape() {
        let (status, body) = body_json(ApiError::bad_request("bad input")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert_eq!(body["message"], "bad input");
        assert_eq!(body.as_object().unwrap().len(), 2);
    }

    #[rstest]
    #[case::validation(Error::validation("rating: must be between 1 and 5"), StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")]
    #[case::breaker_open(Error::Unavailable("open".to_string()), StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")]
    #[case::delivery(Error::Delivery("exhausted".to_string()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")]
    #[case::configuration(Error::config("secret path"), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")]
    fn test_from_domain_error(
        #[case] err: Error,
        #[case] status: StatusCode,
        #[case] code: &str,
    ) {
        let api_err = ApiError::from(err);
        assert_eq!(api_err.status, status);
        assert_eq!(api_err.code, code);
        assert!(!api_err.message.contains("secret"));
    }
}
