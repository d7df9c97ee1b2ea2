//! Pub/Sub Gateway process entry point
//!
//! Loads configuration (fatal if the project id is missing), connects the
//! broker adapter, then serves the publish and ops listeners until SIGINT or
//! SIGTERM.

use anyhow::Result;
use pubsub_gateway::broker;
use pubsub_gateway::config::GatewayConfig;
use pubsub_gateway::error::GatewayError;
use pubsub_gateway::gateway::{self, GatewayState};
use pubsub_gateway::health::{self, OpsState};
use pubsub_gateway::metrics::{set_broker_connected, GatewayMetrics};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let gateway_config = GatewayConfig::from_env()?;

    // Initialize tracing with configured log level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("pubsub_gateway={}", gateway_config.log_level).parse()?)
                .add_directive("async_nats=warn".parse()?)
                .add_directive("hyper=warn".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        project_id = %gateway_config.project_id,
        backend = gateway_config.broker.backend(),
        publish_timeout = ?gateway_config.publish_timeout,
        "Starting Pub/Sub gateway"
    );

    let metrics = GatewayMetrics::install().map_err(startup_failed)?;
    info!("Prometheus metrics initialized");

    let publisher = broker::connect(&gateway_config.broker)
        .await
        .map_err(startup_failed)?;
    set_broker_connected(publisher.is_connected());
    info!(backend = publisher.backend(), "Broker adapter ready");

    let gateway_state = GatewayState::from_config(&gateway_config, Arc::clone(&publisher));
    let ops_state = OpsState {
        publisher: Arc::clone(&publisher),
        metrics: Some(metrics),
    };

    let gateway_listener = bind("gateway", gateway_config.http_port)
        .await
        .map_err(startup_failed)?;
    let ops_listener = bind("ops", gateway_config.ops_port)
        .await
        .map_err(startup_failed)?;

    info!(
        port = gateway_config.http_port,
        ops_port = gateway_config.ops_port,
        "Starting HTTP servers"
    );

    let gateway_server = axum::serve(gateway_listener, gateway::router(gateway_state));
    let ops_server = axum::serve(ops_listener, health::router(ops_state));

    // Run everything concurrently
    tokio::select! {
        result = gateway_server => {
            if let Err(e) = result {
                error!(error = %e, "Gateway HTTP server error");
            }
        }
        result = ops_server => {
            if let Err(e) = result {
                error!(error = %e, "Ops HTTP server error");
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    // Listeners are dropped above; in-flight requests are abandoned
    info!("Shutting down gateway...");
    publisher.close().await;

    info!("Gateway shutdown complete");
    Ok(())
}

/// Log a fatal startup error once tracing is up, then hand it back to `main`
fn startup_failed(e: GatewayError) -> GatewayError {
    error!(error = %e, error_type = e.error_type_label(), "Gateway startup failed");
    e
}

async fn bind(listener: &'static str, port: u16) -> Result<TcpListener, GatewayError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind {
            listener,
            port,
            source,
        })
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
