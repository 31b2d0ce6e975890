use serde::{Deserialize, Serialize};

use crate::notification::RatingNotificationRequest;

/// A rating that has just been persisted by the rating side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingEvent {
    pub service_provider_id: String,
    pub rating_id: String,
    pub rating_value: i32,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Wire payload sent to the notification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingNotification {
    pub service_provider_id: String,
    pub rating_id: String,
    pub rating: i32,
    pub customer_name: String,
    pub comment: String,
}

impl From<&RatingEvent> for RatingNotification {
    fn from(event: &RatingEvent) -> Self {
        Self {
            service_provider_id: event.service_provider_id.clone(),
            rating_id: event.rating_id.clone(),
            rating: event.rating_value,
            customer_name: event.customer_name.clone().unwrap_or_default(),
            comment: event.comment.clone().unwrap_or_default(),
        }
    }
}

impl From<RatingNotification> for RatingNotificationRequest {
    fn from(payload: RatingNotification) -> Self {
        Self {
            service_provider_id: payload.service_provider_id,
            rating_id: payload.rating_id,
            rating: payload.rating,
            customer_name: payload.customer_name,
            comment: payload.comment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_from_event() {
        let event = RatingEvent {
            service_provider_id: "sp".to_string(),
            rating_id: "r".to_string(),
            rating_value: 5,
            customer_name: None,
            comment: Some("Great".to_string()),
        };

        let payload = RatingNotification::from(&event);
        assert_eq!(payload.rating, 5);
        assert!(payload.customer_name.is_empty());
        assert_eq!(payload.comment, "Great");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["serviceProviderId"], "sp");
        assert_eq!(json["ratingId"], "r");
        assert_eq!(json["rating"], 5);
        assert_eq!(json["customerName"], "");
    }

    #[test]
    fn test_payload_parses_as_request() {
        let payload = RatingNotification {
            service_provider_id: "sp".to_string(),
            rating_id: "r".to_string(),
            rating: 3,
            customer_name: "Ann".to_string(),
            comment: String::new(),
        };

        let json = serde_json::to_string(&payload).unwrap();
        let request: RatingNotificationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request, RatingNotificationRequest::from(payload));
    }
}
