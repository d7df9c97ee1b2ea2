//! Process-level error types for the publish gateway
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! Startup and infrastructure code returns Result<T, GatewayError>. Per-request
//! failures live in `gateway::response::RequestRejection` and
//! `broker::PublishError` because they become HTTP responses, not exits.

use thiserror::Error;

/// Gateway startup and infrastructure errors
///
/// Every variant carries enough context to diagnose a failed boot without
/// reading the environment of the crashed process.
///
/// Example log output:
/// ```text
/// GatewayError::Config("GOOGLE_CLOUD_PROJECT must be set")
/// → "configuration error: GOOGLE_CLOUD_PROJECT must be set"
/// ```
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration error (environment variable missing or invalid)
    #[error("configuration error: {0}")]
    Config(String),

    /// Broker connection could not be established at startup
    #[error("{backend} broker connection failed")]
    BrokerConnectionFailed {
        backend: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Prometheus recorder could not be installed
    #[error("metrics recorder installation failed")]
    MetricsInstall(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Listener could not bind its port
    #[error("failed to bind {listener} listener on port {port}")]
    Bind {
        listener: &'static str,
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

impl GatewayError {
    /// Returns a static label string suitable for Prometheus metrics.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::BrokerConnectionFailed { .. } => "broker_connection",
            Self::MetricsInstall(_) => "metrics_install",
            Self::Bind { .. } => "bind",
        }
    }
}
