//! Broker adapter port
//!
//! The gateway only knows the `Publisher` trait. Concrete adapters translate a
//! topic reference and payload into one broker publish and wait for the ack.

mod nats;
mod pubsub;

pub use nats::NatsPublisher;
pub use pubsub::{PubSubRestPublisher, TokenSource};

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::BrokerConfig;
use crate::error::GatewayError;

/// Fully qualified destination for one publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRef {
    /// Project/namespace the topic lives in
    pub project_id: String,
    /// Topic name as supplied by the caller
    pub name: String,
    /// Adapter-specific reference (resource path, subject, ...)
    pub resolved: String,
}

/// Broker acknowledgment of an accepted message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishAck {
    pub message_id: Option<String>,
}

/// Publish failure reported by an adapter
///
/// `Display` is the text surfaced to HTTP callers after
/// "Failed to publish message: ", so broker messages are kept verbatim.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Broker answered and refused the message
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Network or protocol failure before an answer arrived
    #[error("{0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// No credentials available for the broker
    #[error("failed to obtain access token: {0}")]
    Auth(String),

    /// Broker answered with something we cannot interpret
    #[error("invalid broker response: {0}")]
    InvalidResponse(String),

    /// Topic name the broker would refuse; nothing was sent
    #[error("invalid topic name \"{name}\": {reason}")]
    InvalidTopic { name: String, reason: &'static str },

    /// Payload could not be turned into message bytes; nothing was sent
    #[error("{0}")]
    InvalidPayload(String),

    /// Acknowledgment did not arrive within the configured bound
    #[error("publish not acknowledged within {0:?}")]
    TimedOut(Duration),

    /// Adapter-specific failure text
    #[error("{0}")]
    Broker(String),
}

impl PublishError {
    /// Static label for the `error_type` metrics dimension
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Transport(_) => "transport",
            Self::Auth(_) => "auth",
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidTopic { .. } => "invalid_topic",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::TimedOut(_) => "timed_out",
            Self::Broker(_) => "broker",
        }
    }
}

/// Broker adapter
///
/// Implementations are built once at startup and shared read-only across
/// all request handlers, so they must be safe for concurrent use.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Backend name for logs, metrics and health output
    fn backend(&self) -> &'static str;

    /// Build the fully qualified topic reference for `topic_name`
    fn resolve_topic(&self, project_id: &str, topic_name: &str) -> TopicRef;

    /// Publish one payload and wait until the broker acknowledges or fails
    async fn publish(&self, topic: &TopicRef, payload: Bytes) -> Result<PublishAck, PublishError>;

    /// Whether the adapter currently believes it can reach the broker
    fn is_connected(&self) -> bool {
        true
    }

    /// Release broker resources during shutdown
    async fn close(&self) {}
}

/// Build the configured adapter
pub async fn connect(config: &BrokerConfig) -> Result<Arc<dyn Publisher>, GatewayError> {
    match config {
        BrokerConfig::PubSub { endpoint, auth } => {
            let publisher = PubSubRestPublisher::new(endpoint, TokenSource::from_config(auth))?;
            Ok(Arc::new(publisher))
        }
        BrokerConfig::Nats { url } => {
            let publisher = NatsPublisher::connect(url).await?;
            Ok(publisher)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_displays_broker_message_verbatim() {
        let err = PublishError::Rejected {
            status: 404,
            message: "topic not found".to_string(),
        };
        assert_eq!(err.to_string(), "topic not found");
        assert_eq!(PublishError::Broker("boom".to_string()).to_string(), "boom");
    }

    #[test]
    fn every_variant_has_distinct_error_type_label() {
        let labels = [
            PublishError::Rejected {
                status: 500,
                message: String::new(),
            }
            .error_type_label(),
            PublishError::Transport(Box::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "test",
            )))
            .error_type_label(),
            PublishError::Auth(String::new()).error_type_label(),
            PublishError::InvalidResponse(String::new()).error_type_label(),
            PublishError::InvalidTopic {
                name: String::new(),
                reason: "",
            }
            .error_type_label(),
            PublishError::InvalidPayload(String::new()).error_type_label(),
            PublishError::TimedOut(Duration::from_secs(1)).error_type_label(),
            PublishError::Broker(String::new()).error_type_label(),
        ];

        let mut unique = labels.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(labels.len(), unique.len(), "Duplicate error_type_label found");
    }

    #[test]
    fn connect_builds_pubsub_adapter_without_network() {
        let config = BrokerConfig::PubSub {
            endpoint: "http://localhost:8085".to_string(),
            auth: crate::config::PubSubAuth::None,
        };

        let publisher = tokio_test::block_on(connect(&config)).unwrap();
        assert_eq!(publisher.backend(), "pubsub");
        assert!(publisher.is_connected());
        assert_eq!(
            publisher.resolve_topic("demo", "orders").resolved,
            "projects/demo/topics/orders"
        );
    }

    #[test]
    fn timeout_message_names_duration() {
        let err = PublishError::TimedOut(Duration::from_secs(5));
        assert_eq!(err.to_string(), "publish not acknowledged within 5s");
    }
}
