//! Notification data model and request/response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Maximum length of the customer name in a notification request.
pub const MAX_CUSTOMER_NAME_LEN: usize = 255;

/// Maximum length of the rating comment in a notification request.
pub const MAX_COMMENT_LEN: usize = 1000;

/// A notification pending delivery to a service provider.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    /// Recipient key under which the notification is polled.
    pub service_provider_id: String,
    pub message: String,
    /// Id of the rating that produced this notification.
    pub rating_id: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build a notification from a rating request, stamped with the current time.
    pub fn from_request(req: &RatingNotificationRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            service_provider_id: req.service_provider_id.clone(),
            message: format_notification_message(
                req.rating,
                &req.customer_name,
                &req.comment,
            ),
            rating_id: req.rating_id.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Rating notification as sent by the rating side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingNotificationRequest {
    pub service_provider_id: String,
    pub rating_id: String,
    pub rating: i32,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub comment: String,
}

impl RatingNotificationRequest {
    /// Validate field formats and bounds.
    pub fn validate(&self) -> Result<()> {
        if self.service_provider_id.is_empty() {
            return Err(Error::validation("serviceProviderId: cannot be blank"));
        }
        if Uuid::parse_str(&self.service_provider_id).is_err() {
            return Err(Error::validation("serviceProviderId: must be a valid UUID"));
        }
        if self.rating_id.is_empty() {
            return Err(Error::validation("ratingId: cannot be blank"));
        }
        if Uuid::parse_str(&self.rating_id).is_err() {
            return Err(Error::validation("ratingId: must be a valid UUID"));
        }
        if !(1..=5).contains(&self.rating) {
            return Err(Error::validation("rating: must be between 1 and 5"));
        }
        if self.customer_name.chars().count() > MAX_CUSTOMER_NAME_LEN {
            return Err(Error::validation(format!(
                "customerName: the length must be no more than {MAX_CUSTOMER_NAME_LEN}"
            )));
        }
        if self.comment.chars().count() > MAX_COMMENT_LEN {
            return Err(Error::validation(format!(
                "comment: the length must be no more than {MAX_COMMENT_LEN}"
            )));
        }
        Ok(())
    }
}

/// Response to a notification poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNotificationsResponse {
    pub notifications: Vec<Notification>,
    /// Always false: the timestamp cursor is the only pagination.
    pub has_more: bool,
}

/// Response to a successful notification write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNotificationResponse {
    pub id: String,
    pub message: String,
}

/// Human-readable message for a rating.
pub fn format_notification_message(rating: i32, customer_name: &str, comment: &str) -> String {
    let mut message = match rating {
        1..=5 => format!("New {rating}-star rating received"),
        _ => "New rating received".to_string(),
    };

    if !customer_name.is_empty() {
        message.push_str(" from ");
        message.push_str(customer_name);
    }

    if !comment.is_empty() {
        message.push_str(": \"");
        message.push_str(comment);
        message.push('"');
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn valid_request() -> RatingNotificationRequest {
        RatingNotificationRequest {
            service_provider_id: "2f1f4c4e-9f3b-4d5e-8a43-6f0f3f0d8d11".to_string(),
            rating_id: "8b6c2d0a-5a8e-4c1f-b3d3-0d6a3b1e7c22".to_string(),
            rating: 5,
            customer_name: "John Doe".to_string(),
            comment: "Excellent service!".to_string(),
        }
    }

    #[rstest]
    #[case(1, "", "", "New 1-star rating received")]
    #[case(3, "Jane", "", "New 3-star rating received from Jane")]
    #[case(5, "John Doe", "Excellent service!", "New 5-star rating received from John Doe: \"Excellent service!\"")]
    #[case(4, "", "Good", "New 4-star rating received: \"Good\"")]
    #[case(0, "Ann", "", "New rating received from Ann")]
    #[case(7, "", "", "New rating received")]
    fn test_format_message(
        #[case] rating: i32,
        #[case] customer_name: &str,
        #[case] comment: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(
            format_notification_message(rating, customer_name, comment),
            expected
        );
    }

    #[test]
    fn test_from_request() {
        let req = valid_request();
        let before = Utc::now();
        let notification = Notification::from_request(&req);

        assert!(Uuid::parse_str(&notification.id).is_ok());
        assert_eq!(notification.service_provider_id, req.service_provider_id);
        assert_eq!(notification.rating_id, req.rating_id);
        assert!(notification.message.starts_with("New 5-star rating received"));
        assert!(notification.created_at >= before);
    }

    #[test]
    fn test_notification_serializes_camel_case() {
        let notification = Notification::from_request(&valid_request());
        let json = serde_json::to_value(&notification).unwrap();

        assert!(json.get("serviceProviderId").is_some());
        assert!(json.get("ratingId").is_some());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_validate_accepts_valid_request() {
        assert!(valid_request().validate().is_ok());
    }

    #[rstest]
    #[case::blank_provider(RatingNotificationRequest { service_provider_id: String::new(), ..valid_request() })]
    #[case::provider_not_uuid(RatingNotificationRequest { service_provider_id: "provider-1".to_string(), ..valid_request() })]
    #[case::rating_not_uuid(RatingNotificationRequest { rating_id: "rating-1".to_string(), ..valid_request() })]
    #[case::rating_too_low(RatingNotificationRequest { rating: 0, ..valid_request() })]
    #[case::rating_too_high(RatingNotificationRequest { rating: 6, ..valid_request() })]
    #[case::long_name(RatingNotificationRequest { customer_name: "x".repeat(256), ..valid_request() })]
    #[case::long_comment(RatingNotificationRequest { comment: "x".repeat(1001), ..valid_request() })]
    fn test_validate_rejects(#[case] req: RatingNotificationRequest) {
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_request_optional_fields_default() {
        let json = r#"{
            "serviceProviderId": "2f1f4c4e-9f3b-4d5e-8a43-6f0f3f0d8d11",
            "ratingId": "8b6c2d0a-5a8e-4c1f-b3d3-0d6a3b1e7c22",
            "rating": 4
        }"#;
        let req: RatingNotificationRequest = serde_json::from_str(json).unwrap();
        assert!(req.customer_name.is_empty());
        assert!(req.comment.is_empty());
        assert!(req.validate().is_ok());
    }
}
