//! Gateway configuration module
//!
//! Handles loading configuration from environment variables (and a `.env`
//! file when present). A missing project id is fatal: the process must never
//! serve requests without it.

use crate::error::GatewayError;
use std::env;
use std::time::Duration;

/// Default REST endpoint for Google Cloud Pub/Sub
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Default GCE metadata server host
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// Pub/Sub's own message size ceiling
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Project/namespace identifier used to resolve topic references
    pub project_id: String,

    /// Publish endpoint HTTP port
    pub http_port: u16,

    /// Health/metrics HTTP port
    pub ops_port: u16,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Broker backend and its connection settings
    pub broker: BrokerConfig,

    /// Upper bound on the publish wait; `None` waits until the broker answers
    pub publish_timeout: Option<Duration>,

    /// Largest request body accepted
    pub max_body_bytes: usize,
}

/// Broker backend selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerConfig {
    /// Google Cloud Pub/Sub over its REST API
    PubSub { endpoint: String, auth: PubSubAuth },
    /// NATS JetStream
    Nats { url: String },
}

/// How the Pub/Sub adapter authenticates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubSubAuth {
    /// Emulator mode, no credentials
    None,
    /// Pre-issued OAuth access token
    Static(String),
    /// Fetch tokens from the GCE metadata server
    Metadata { host: String },
}

impl BrokerConfig {
    /// Backend name used in logs, metrics and health output
    pub fn backend(&self) -> &'static str {
        match self {
            Self::PubSub { .. } => "pubsub",
            Self::Nats { .. } => "nats",
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let project_id = var("GOOGLE_CLOUD_PROJECT").ok_or_else(|| {
            GatewayError::Config("GOOGLE_CLOUD_PROJECT environment variable not set".to_string())
        })?;

        let http_port = parse_port(var("PORT"), "PORT", 8080)?;
        let ops_port = parse_port(var("OPS_PORT"), "OPS_PORT", 9090)?;
        if http_port == ops_port {
            return Err(GatewayError::Config(format!(
                "PORT and OPS_PORT must differ (both are {http_port})"
            )));
        }

        let log_level = var("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let broker = match var("BROKER").as_deref().unwrap_or("pubsub") {
            "pubsub" => {
                if let Some(host) = var("PUBSUB_EMULATOR_HOST") {
                    BrokerConfig::PubSub {
                        endpoint: format!("http://{}", host.trim_end_matches('/')),
                        auth: PubSubAuth::None,
                    }
                } else {
                    let endpoint = var("PUBSUB_ENDPOINT")
                        .unwrap_or_else(|| DEFAULT_PUBSUB_ENDPOINT.to_string())
                        .trim_end_matches('/')
                        .to_string();
                    let auth = match var("GOOGLE_OAUTH_ACCESS_TOKEN") {
                        Some(token) => PubSubAuth::Static(token),
                        None => PubSubAuth::Metadata {
                            host: var("GCE_METADATA_HOST")
                                .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string()),
                        },
                    };
                    BrokerConfig::PubSub { endpoint, auth }
                }
            }
            "nats" => BrokerConfig::Nats {
                url: var("NATS_URL").ok_or_else(|| {
                    GatewayError::Config("NATS_URL must be set when BROKER=nats".to_string())
                })?,
            },
            other => {
                return Err(GatewayError::Config(format!(
                    "BROKER must be 'pubsub' or 'nats', got '{other}'"
                )))
            }
        };

        let publish_timeout = match var("PUBLISH_TIMEOUT_SECS") {
            None => None,
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|e| {
                    GatewayError::Config(format!("PUBLISH_TIMEOUT_SECS must be a valid number: {e}"))
                })?;
                if secs == 0 {
                    return Err(GatewayError::Config(
                        "PUBLISH_TIMEOUT_SECS must be greater than zero".to_string(),
                    ));
                }
                Some(Duration::from_secs(secs))
            }
        };

        let max_body_bytes = match var("MAX_BODY_BYTES") {
            None => DEFAULT_MAX_BODY_BYTES,
            Some(raw) => raw.parse().map_err(|e| {
                GatewayError::Config(format!("MAX_BODY_BYTES must be a valid number: {e}"))
            })?,
        };

        Ok(Self {
            project_id,
            http_port,
            ops_port,
            log_level,
            broker,
            publish_timeout,
            max_body_bytes,
        })
    }
}

fn parse_port(raw: Option<String>, key: &str, default: u16) -> Result<u16, GatewayError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| GatewayError::Config(format!("{key} must be a valid port number: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<GatewayConfig, GatewayError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_missing_project_is_fatal() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_CLOUD_PROJECT"));

        // Empty counts as unset
        assert!(load(&[("GOOGLE_CLOUD_PROJECT", "")]).is_err());
    }

    #[test]
    fn test_default_values() {
        let config = load(&[("GOOGLE_CLOUD_PROJECT", "demo")]).unwrap();

        assert_eq!(config.project_id, "demo");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.ops_port, 9090);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.publish_timeout, None);
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(
            config.broker,
            BrokerConfig::PubSub {
                endpoint: DEFAULT_PUBSUB_ENDPOINT.to_string(),
                auth: PubSubAuth::Metadata {
                    host: DEFAULT_METADATA_HOST.to_string()
                },
            }
        );
    }

    #[test]
    fn test_emulator_host_disables_auth() {
        let config = load(&[
            ("GOOGLE_CLOUD_PROJECT", "demo"),
            ("PUBSUB_EMULATOR_HOST", "localhost:8085"),
            ("GOOGLE_OAUTH_ACCESS_TOKEN", "ignored"),
        ])
        .unwrap();

        assert_eq!(
            config.broker,
            BrokerConfig::PubSub {
                endpoint: "http://localhost:8085".to_string(),
                auth: PubSubAuth::None,
            }
        );
    }

    #[test]
    fn test_static_token_and_custom_endpoint() {
        let config = load(&[
            ("GOOGLE_CLOUD_PROJECT", "demo"),
            ("PUBSUB_ENDPOINT", "https://pubsub.example.test/"),
            ("GOOGLE_OAUTH_ACCESS_TOKEN", "ya29.token"),
        ])
        .unwrap();

        assert_eq!(
            config.broker,
            BrokerConfig::PubSub {
                endpoint: "https://pubsub.example.test".to_string(),
                auth: PubSubAuth::Static("ya29.token".to_string()),
            }
        );
    }

    #[test]
    fn test_nats_backend_requires_url() {
        let err = load(&[("GOOGLE_CLOUD_PROJECT", "demo"), ("BROKER", "nats")]).unwrap_err();
        assert!(err.to_string().contains("NATS_URL"));

        let config = load(&[
            ("GOOGLE_CLOUD_PROJECT", "demo"),
            ("BROKER", "nats"),
            ("NATS_URL", "nats://localhost:4222"),
        ])
        .unwrap();
        assert_eq!(config.broker.backend(), "nats");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = load(&[("GOOGLE_CLOUD_PROJECT", "demo"), ("BROKER", "kafka")]).unwrap_err();
        assert!(err.to_string().contains("kafka"));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        assert!(load(&[("GOOGLE_CLOUD_PROJECT", "demo"), ("PORT", "http")]).is_err());
        assert!(load(&[("GOOGLE_CLOUD_PROJECT", "demo"), ("PUBLISH_TIMEOUT_SECS", "0")]).is_err());
        assert!(load(&[("GOOGLE_CLOUD_PROJECT", "demo"), ("MAX_BODY_BYTES", "-1")]).is_err());
        assert!(load(&[
            ("GOOGLE_CLOUD_PROJECT", "demo"),
            ("PORT", "9000"),
            ("OPS_PORT", "9000")
        ])
        .is_err());
    }

    #[test]
    fn test_publish_timeout_parsed() {
        let config = load(&[("GOOGLE_CLOUD_PROJECT", "demo"), ("PUBLISH_TIMEOUT_SECS", "5")]).unwrap();
        assert_eq!(config.publish_timeout, Some(Duration::from_secs(5)));
    }
}
