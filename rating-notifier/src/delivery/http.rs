//! HTTP transport to a remote notification service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::payload::RatingNotification;
use super::sink::NotificationSink;
use crate::{Error, Result};

/// Path of the internal notification endpoint, relative to the service base URL.
pub const NOTIFICATIONS_PATH: &str = "api/internal/notifications";

const USER_AGENT: &str = concat!("rating-notifier/", env!("CARGO_PKG_VERSION"));

/// Failure of a single HTTP delivery attempt.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network failure, timeout or other client-side request error.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("notification service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Network errors, timeouts and 5xx responses are worth retrying; 4xx responses
    /// are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(err) => {
                if err.is_timeout() || err.is_connect() {
                    return true;
                }
                match err.status() {
                    Some(status) => is_retryable_status(status.as_u16()),
                    None => !err.is_builder(),
                }
            }
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Encode(_) => false,
            Self::Cancelled => false,
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    !(400..500).contains(&status)
}

/// Retry classifier for the HTTP delivery path.
pub fn is_retryable_transport_error(err: &Error) -> bool {
    match err {
        Error::Transport(transport) => transport.is_retryable(),
        Error::Validation(_) => false,
        _ => true,
    }
}

/// Posts rating notifications to `{base_url}/api/internal/notifications`. A path prefix
/// on the base URL is kept.
pub struct HttpNotificationSink {
    client: Client,
    endpoint: Url,
}

impl HttpNotificationSink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid notification base URL '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let prefix = format!("{}/", base.path());
            base.set_path(&prefix);
        }
        let endpoint = base
            .join(NOTIFICATIONS_PATH)
            .map_err(|e| Error::config(format!("invalid notification endpoint: {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(TransportError::from)?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, body: Vec<u8>) -> std::result::Result<(), TransportError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "Notification service rejected request");
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, payload: &RatingNotification, cancel: &CancellationToken) -> Result<()> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled.into()),
            result = self.post(body) => {
                result?;
                debug!(
                    endpoint = %self.endpoint,
                    service_provider_id = %payload.service_provider_id,
                    rating_id = %payload.rating_id,
                    "Notification delivered over HTTP"
                );
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for HttpNotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpNotificationSink")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}
