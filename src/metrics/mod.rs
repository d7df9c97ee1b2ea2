//! Prometheus metrics module
//!
//! Recording goes through the global `metrics` facade, so handlers emit
//! metrics whether or not a recorder is installed (tests never install one).
//! `GatewayMetrics` owns the Prometheus handle used by the `/metrics` route.

use crate::error::GatewayError;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;

/// Gateway metrics exporter
#[derive(Clone)]
pub struct GatewayMetrics {
    handle: Arc<PrometheusHandle>,
}

impl GatewayMetrics {
    /// Install the Prometheus recorder and register descriptions
    ///
    /// Only one recorder can exist per process.
    pub fn install() -> Result<Self, GatewayError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| GatewayError::MetricsInstall(Box::new(e)))?;

        Self::register_metrics();

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Register metric descriptions
    fn register_metrics() {
        describe_counter!(
            "gateway_requests_total",
            Unit::Count,
            "Publish requests handled, by outcome"
        );
        describe_counter!(
            "gateway_publish_failures_total",
            Unit::Count,
            "Broker publish failures, by backend and error type"
        );
        describe_histogram!(
            "gateway_publish_duration_seconds",
            Unit::Seconds,
            "Time from publish call to broker acknowledgment"
        );
        describe_gauge!(
            "gateway_broker_connected",
            Unit::Count,
            "Broker connection status (1=connected, 0=disconnected)"
        );
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Record the final outcome of one publish request
pub fn record_request(outcome: &'static str) {
    counter!("gateway_requests_total", "outcome" => outcome).increment(1);
}

/// Record a broker acknowledgment
pub fn record_publish_success(backend: &'static str, duration: Duration) {
    histogram!(
        "gateway_publish_duration_seconds",
        "backend" => backend
    )
    .record(duration.as_secs_f64());
}

/// Record a broker failure
pub fn record_publish_failure(backend: &'static str, error_type: &'static str) {
    counter!(
        "gateway_publish_failures_total",
        "backend" => backend,
        "error_type" => error_type
    )
    .increment(1);
}

/// Set broker connection status
pub fn set_broker_connected(connected: bool) {
    gauge!("gateway_broker_connected").set(if connected { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        // No recorder installed in unit tests; the facade must swallow these
        record_request("published");
        record_publish_success("pubsub", Duration::from_millis(12));
        record_publish_failure("pubsub", "rejected");
        set_broker_connected(true);
    }
}
