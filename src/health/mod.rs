//! Health check and metrics endpoints
//!
//! Served on the ops port so the publish port can accept POSTs on any path.

use crate::broker::Publisher;
use crate::metrics::{set_broker_connected, GatewayMetrics};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub backend: &'static str,
    pub broker_connected: bool,
}

/// Application state for ops endpoints
#[derive(Clone)]
pub struct OpsState {
    pub publisher: Arc<dyn Publisher>,
    pub metrics: Option<GatewayMetrics>,
}

/// Create the ops router
pub fn router(state: OpsState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health endpoint - always returns 200 if process is running
async fn health_handler(State(state): State<OpsState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.publisher.backend(),
    })
}

/// Readiness endpoint - returns 200 while the broker adapter reports connected
async fn ready_handler(State(state): State<OpsState>) -> impl IntoResponse {
    let broker_connected = state.publisher.is_connected();
    set_broker_connected(broker_connected);

    let response = ReadyResponse {
        ready: broker_connected,
        backend: state.publisher.backend(),
        broker_connected,
    };

    if broker_connected {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler(State(state): State<OpsState>) -> impl IntoResponse {
    set_broker_connected(state.publisher.is_connected());

    match state.metrics {
        Some(ref metrics) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            metrics.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{PublishAck, PublishError, TopicRef};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    struct StubPublisher {
        connected: AtomicBool,
    }

    #[async_trait]
    impl Publisher for StubPublisher {
        fn backend(&self) -> &'static str {
            "stub"
        }

        fn resolve_topic(&self, project_id: &str, topic_name: &str) -> TopicRef {
            TopicRef {
                project_id: project_id.to_string(),
                name: topic_name.to_string(),
                resolved: topic_name.to_string(),
            }
        }

        async fn publish(&self, _topic: &TopicRef, _payload: Bytes) -> Result<PublishAck, PublishError> {
            Ok(PublishAck::default())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    fn ops_router(connected: bool) -> Router {
        router(OpsState {
            publisher: Arc::new(StubPublisher {
                connected: AtomicBool::new(connected),
            }),
            metrics: None,
        })
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy",
            version: "0.1.0",
            backend: "pubsub",
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("\"backend\":\"pubsub\""));
    }

    #[tokio::test]
    async fn test_health_reports_backend() {
        let (status, body) = get_json(ops_router(true), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend"], "stub");
    }

    #[tokio::test]
    async fn test_ready_follows_broker_connection() {
        let (status, body) = get_json(ops_router(true), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);

        let (status, body) = get_json(ops_router(false), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["broker_connected"], false);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let response = ops_router(true)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
