//! Publish gateway
//!
//! Every POST, whatever its path, is one publish attempt:
//! body read → JSON parse → field validation → broker publish → JSON response.
//! Nothing is retried and nothing survives the request.

pub mod request;
pub mod response;

pub use request::PublishRequest;
pub use response::{PublishResponse, RequestRejection};

use crate::broker::{PublishError, Publisher};
use crate::config::{GatewayConfig, DEFAULT_MAX_BODY_BYTES};
use crate::metrics::{record_publish_failure, record_publish_success, record_request};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, field, info, instrument, warn, Span};
use uuid::Uuid;

/// Shared, read-only dependencies of the publish handler
#[derive(Clone)]
pub struct GatewayState {
    publisher: Arc<dyn Publisher>,
    project_id: Arc<str>,
    publish_timeout: Option<Duration>,
    max_body_bytes: usize,
}

impl GatewayState {
    pub fn new(publisher: Arc<dyn Publisher>, project_id: impl Into<Arc<str>>) -> Self {
        Self {
            publisher,
            project_id: project_id.into(),
            publish_timeout: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn from_config(config: &GatewayConfig, publisher: Arc<dyn Publisher>) -> Self {
        Self::new(publisher, config.project_id.as_str())
            .with_publish_timeout(config.publish_timeout)
            .with_max_body_bytes(config.max_body_bytes)
    }

    /// Bound the broker acknowledgment wait; `None` waits indefinitely
    pub fn with_publish_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

/// Create the publish router
///
/// The path is never inspected; non-POST methods get axum's 405.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", post(publish_handler))
        .route("/{*path}", post(publish_handler))
        .with_state(state)
}

#[instrument(
    name = "publish_request",
    skip_all,
    fields(request_id = %Uuid::new_v4(), topic = field::Empty)
)]
async fn publish_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match handle_publish(&state, &headers, body).await {
        Ok(topic_name) => {
            record_request("published");
            (StatusCode::OK, Json(PublishResponse::published(&topic_name))).into_response()
        }
        Err(rejection) => {
            record_request(rejection.outcome_label());
            match &rejection {
                RequestRejection::PublishFailed(e) => {
                    warn!(error = %e, "Error publishing message");
                }
                RequestRejection::Unexpected(reason) => {
                    error!(error = %reason, "An unexpected error occurred");
                }
                other => debug!(reason = %other, "Rejected publish request"),
            }
            rejection.into_response()
        }
    }
}

/// Run one request through validation and publish; returns the topic name
async fn handle_publish(
    state: &GatewayState,
    headers: &HeaderMap,
    body: Body,
) -> Result<String, RequestRejection> {
    let raw = read_body(headers, body, state.max_body_bytes).await?;
    let PublishRequest {
        content,
        pubsub_name,
    } = PublishRequest::from_body(&raw)?;

    let publisher = &state.publisher;
    let backend = publisher.backend();
    let topic = publisher.resolve_topic(&state.project_id, &pubsub_name);
    Span::current().record("topic", topic.name.as_str());
    let payload = Bytes::from(content);

    let started = Instant::now();
    let outcome = match state.publish_timeout {
        Some(limit) => tokio::time::timeout(limit, publisher.publish(&topic, payload))
            .await
            .unwrap_or_else(|_| Err(PublishError::TimedOut(limit))),
        None => publisher.publish(&topic, payload).await,
    };

    match outcome {
        Ok(ack) => {
            let elapsed = started.elapsed();
            record_publish_success(backend, elapsed);
            info!(
                backend,
                resolved = %topic.resolved,
                message_id = ack.message_id.as_deref().unwrap_or("-"),
                elapsed_ms = elapsed.as_millis() as u64,
                "Message published"
            );
            Ok(pubsub_name)
        }
        Err(e) => {
            record_publish_failure(backend, e.error_type_label());
            debug!(backend, resolved = %topic.resolved, "Broker did not acknowledge");
            Err(RequestRejection::PublishFailed(e))
        }
    }
}

/// Read exactly the declared `Content-Length` bytes
async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, RequestRejection> {
    let declared = declared_length(headers)?;
    if declared > limit {
        return Err(RequestRejection::Unexpected(format!(
            "request body of {declared} bytes exceeds the {limit} byte limit"
        )));
    }

    let bytes = axum::body::to_bytes(body, declared)
        .await
        .map_err(|e| RequestRejection::Unexpected(format!("failed to read request body: {e}")))?;

    if bytes.len() != declared {
        return Err(RequestRejection::Unexpected(format!(
            "Content-Length declared {declared} bytes but the body had {}",
            bytes.len()
        )));
    }

    Ok(bytes)
}

fn declared_length(headers: &HeaderMap) -> Result<usize, RequestRejection> {
    let value = headers.get(CONTENT_LENGTH).ok_or_else(|| {
        RequestRejection::Unexpected("missing Content-Length header".to_string())
    })?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            RequestRejection::Unexpected(format!("invalid Content-Length header: {value:?}"))
        })
}
