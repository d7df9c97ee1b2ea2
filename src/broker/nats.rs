//! NATS JetStream publisher
//!
//! Alternative backend for deployments that run NATS instead of Pub/Sub.
//! Topics map to `<project>.<topic>` subjects; a JetStream stream must
//! capture the subject or the publish fails with "no responders".

use super::{PublishAck, PublishError, Publisher, TopicRef};
use crate::error::GatewayError;
use async_nats::connection::State;
use async_nats::jetstream::{self, Context as JsContext};
use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// NATS publisher for gateway messages
pub struct NatsPublisher {
    client: Client,
    jetstream: JsContext,
    closed: AtomicBool,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
}

impl NatsPublisher {
    /// Connect to NATS server
    pub async fn connect(servers: &str) -> Result<Arc<Self>, GatewayError> {
        info!(servers, "Connecting to NATS");

        let client = async_nats::connect(servers)
            .await
            .map_err(|e| GatewayError::BrokerConnectionFailed {
                backend: "nats",
                source: Box::new(e),
            })?;

        let jetstream = jetstream::new(client.clone());

        info!("Connected to NATS JetStream");

        Ok(Arc::new(Self {
            client,
            jetstream,
            closed: AtomicBool::new(false),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
        }))
    }

    /// Get total messages published
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Get total publish failures
    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    fn record_failure(&self, subject: &str, error: &dyn std::fmt::Display) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
        warn!(subject, error = %error, "Failed to publish message to NATS");
    }
}

/// Subject for a topic within a project namespace
fn subject_for(project_id: &str, topic_name: &str) -> String {
    format!("{project_id}.{topic_name}")
}

/// Topic must stay literal tokens under the project prefix: no wildcards,
/// whitespace or empty tokens
fn validate_topic_name(name: &str) -> Result<(), PublishError> {
    let reason = if name.split('.').any(str::is_empty) {
        Some("must not contain empty subject tokens")
    } else if name.contains(['*', '>']) {
        Some("must not contain wildcards")
    } else if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("must not contain whitespace")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(PublishError::InvalidTopic {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    fn backend(&self) -> &'static str {
        "nats"
    }

    fn resolve_topic(&self, project_id: &str, topic_name: &str) -> TopicRef {
        TopicRef {
            project_id: project_id.to_string(),
            name: topic_name.to_string(),
            resolved: subject_for(project_id, topic_name),
        }
    }

    async fn publish(&self, topic: &TopicRef, payload: Bytes) -> Result<PublishAck, PublishError> {
        validate_topic_name(&topic.name)?;
        let subject = topic.resolved.clone();

        debug!(subject, bytes = payload.len(), "Publishing to NATS");

        let pending = match self.jetstream.publish(subject.clone(), payload).await {
            Ok(pending) => pending,
            Err(e) => {
                self.record_failure(&subject, &e);
                return Err(PublishError::Transport(Box::new(e)));
            }
        };

        // Second await resolves once the stream has stored the message
        match pending.await {
            Ok(ack) => {
                self.messages_published.fetch_add(1, Ordering::Relaxed);
                debug!(
                    subject,
                    stream = %ack.stream,
                    seq = ack.sequence,
                    "Message acknowledged"
                );
                Ok(PublishAck {
                    message_id: Some(format!("{}:{}", ack.stream, ack.sequence)),
                })
            }
            Err(e) => {
                self.record_failure(&subject, &e);
                Err(PublishError::Broker(e.to_string()))
            }
        }
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && matches!(self.client.connection_state(), State::Connected)
    }

    /// Graceful shutdown
    async fn close(&self) {
        info!(
            published = self.messages_published(),
            failures = self.publish_failures(),
            "Closing NATS connection"
        );
        self.closed.store(true, Ordering::SeqCst);
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "Failed to flush NATS connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_is_project_scoped() {
        assert_eq!(subject_for("demo", "orders"), "demo.orders");
    }

    #[test]
    fn test_topic_name_must_be_literal_tokens() {
        for name in ["orders", "orders.eu", "bad-topic"] {
            assert!(validate_topic_name(name).is_ok(), "{name} should be accepted");
        }

        for name in ["orders.*", ">", "a..b", ".orders", "orders.", "two words", "line\nbreak"] {
            assert!(
                matches!(validate_topic_name(name), Err(PublishError::InvalidTopic { .. })),
                "{name:?} should be refused"
            );
        }
    }
}
