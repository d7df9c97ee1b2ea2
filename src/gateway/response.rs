//! Publish response wire format and error-to-status mapping

use crate::broker::PublishError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Response body: `{"message": ...}` or `{"error": ...}`, nothing else
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishResponse {
    Message(String),
    Error(String),
}

impl PublishResponse {
    /// Success body for a message accepted on `topic_name`
    pub fn published(topic_name: &str) -> Self {
        Self::Message(format!("Message published to Pub/Sub topic: {topic_name}"))
    }
}

/// Why a publish request did not succeed
///
/// `Display` is exactly the `error` text sent to the caller.
#[derive(Error, Debug)]
pub enum RequestRejection {
    #[error("Invalid JSON format in the request body.")]
    InvalidJson,

    #[error("Missing \"content\" field in the request body.")]
    MissingContent,

    #[error("Missing \"pubsub_name\" field in the request body.")]
    MissingPubsubName,

    #[error("Failed to publish message: {0}")]
    PublishFailed(#[source] PublishError),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl RequestRejection {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidJson | Self::MissingContent | Self::MissingPubsubName => {
                StatusCode::BAD_REQUEST
            }
            Self::PublishFailed(_) | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Static label for the `outcome` metrics dimension
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::MissingContent => "missing_content",
            Self::MissingPubsubName => "missing_pubsub_name",
            Self::PublishFailed(_) => "publish_failed",
            Self::Unexpected(_) => "unexpected",
        }
    }
}

impl IntoResponse for RequestRejection {
    fn into_response(self) -> Response {
        (self.status_code(), Json(PublishResponse::Error(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes_have_exactly_one_key() {
        let ok = serde_json::to_value(PublishResponse::published("orders")).unwrap();
        assert_eq!(ok, json!({"message": "Message published to Pub/Sub topic: orders"}));

        let err = serde_json::to_value(PublishResponse::Error("boom".to_string())).unwrap();
        assert_eq!(err, json!({"error": "boom"}));
    }

    #[test]
    fn test_rejection_texts() {
        assert_eq!(
            RequestRejection::InvalidJson.to_string(),
            "Invalid JSON format in the request body."
        );
        assert_eq!(
            RequestRejection::MissingContent.to_string(),
            "Missing \"content\" field in the request body."
        );
        assert_eq!(
            RequestRejection::MissingPubsubName.to_string(),
            "Missing \"pubsub_name\" field in the request body."
        );
        assert_eq!(
            RequestRejection::PublishFailed(PublishError::Broker("topic not found".to_string()))
                .to_string(),
            "Failed to publish message: topic not found"
        );
        assert_eq!(
            RequestRejection::Unexpected("missing Content-Length header".to_string()).to_string(),
            "An unexpected error occurred: missing Content-Length header"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(RequestRejection::InvalidJson.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(RequestRejection::MissingContent.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(RequestRejection::MissingPubsubName.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            RequestRejection::PublishFailed(PublishError::Broker(String::new())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RequestRejection::Unexpected(String::new()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
