//! Google Cloud Pub/Sub publisher
//!
//! Talks to the Pub/Sub REST surface (`topics.publish`) so the same adapter
//! works against production, a regional endpoint or the local emulator.

use super::{PublishAck, PublishError, Publisher, TopicRef};
use crate::config::PubSubAuth;
use crate::error::GatewayError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Tokens are refreshed this long before the metadata server says they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Where bearer tokens come from
pub enum TokenSource {
    /// Emulator: no Authorization header
    None,
    /// Fixed token supplied by the operator
    Static(String),
    /// GCE/Cloud Run metadata server, cached until shortly before expiry
    Metadata {
        url: String,
        cache: Mutex<Option<CachedToken>>,
    },
}

pub struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

impl TokenSource {
    pub fn from_config(auth: &PubSubAuth) -> Self {
        match auth {
            PubSubAuth::None => Self::None,
            PubSubAuth::Static(token) => Self::Static(token.clone()),
            PubSubAuth::Metadata { host } => Self::metadata(host),
        }
    }

    /// Metadata source for `host` (`host` or `host:port`)
    pub fn metadata(host: &str) -> Self {
        Self::Metadata {
            url: format!("http://{}{}", host.trim_end_matches('/'), METADATA_TOKEN_PATH),
            cache: Mutex::new(None),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Static(_) => "static",
            Self::Metadata { .. } => "metadata",
        }
    }

    async fn bearer(&self, http: &Client) -> Result<Option<String>, PublishError> {
        match self {
            Self::None => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::Metadata { url, cache } => {
                // Held across the fetch so concurrent requests share one refresh
                let mut cached = cache.lock().await;
                if let Some(token) = cached.as_ref() {
                    if Instant::now() < token.refresh_at {
                        return Ok(Some(token.value.clone()));
                    }
                }

                let fetched = fetch_metadata_token(http, url).await?;
                let lifetime = Duration::from_secs(fetched.expires_in);
                debug!(expires_in = fetched.expires_in, "Fetched access token from metadata server");

                let value = fetched.access_token;
                *cached = Some(CachedToken {
                    value: value.clone(),
                    refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
                });
                Ok(Some(value))
            }
        }
    }
}

async fn fetch_metadata_token(http: &Client, url: &str) -> Result<MetadataToken, PublishError> {
    let response = http
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| PublishError::Auth(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PublishError::Auth(format!(
            "metadata server returned {status}"
        )));
    }

    response
        .json::<MetadataToken>()
        .await
        .map_err(|e| PublishError::Auth(format!("malformed metadata token response: {e}")))
}

#[derive(Serialize)]
struct PublishBody {
    messages: Vec<OutgoingMessage>,
}

#[derive(Serialize)]
struct OutgoingMessage {
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishReply {
    #[serde(default)]
    message_ids: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(Deserialize)]
struct ErrorStatus {
    message: String,
}

/// Pub/Sub publisher over the REST API
pub struct PubSubRestPublisher {
    http: Client,
    endpoint: Url,
    token: TokenSource,
}

impl PubSubRestPublisher {
    pub fn new(endpoint: &str, token: TokenSource) -> Result<Self, GatewayError> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            GatewayError::Config(format!("Pub/Sub endpoint '{endpoint}' is not a valid URL: {e}"))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(GatewayError::Config(format!(
                "Pub/Sub endpoint '{endpoint}' cannot carry a path"
            )));
        }

        let http = Client::builder()
            .user_agent(concat!("pubsub-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::BrokerConnectionFailed {
                backend: "pubsub",
                source: Box::new(e),
            })?;

        info!(endpoint = %endpoint, auth = token.kind(), "Pub/Sub publisher ready");

        Ok(Self {
            http,
            endpoint,
            token,
        })
    }
}

#[async_trait]
impl Publisher for PubSubRestPublisher {
    fn backend(&self) -> &'static str {
        "pubsub"
    }

    fn resolve_topic(&self, project_id: &str, topic_name: &str) -> TopicRef {
        TopicRef {
            project_id: project_id.to_string(),
            name: topic_name.to_string(),
            resolved: format!("projects/{project_id}/topics/{topic_name}"),
        }
    }

    async fn publish(&self, topic: &TopicRef, payload: Bytes) -> Result<PublishAck, PublishError> {
        validate_topic_name(&topic.name)?;
        let url = publish_url(&self.endpoint, &topic.project_id, &topic.name)?;

        let body = PublishBody {
            messages: vec![OutgoingMessage {
                data: STANDARD.encode(&payload),
            }],
        };

        let mut request = self.http.post(url).json(&body);
        if let Some(token) = self.token.bearer(&self.http).await? {
            request = request.bearer_auth(token);
        }

        debug!(topic = %topic.resolved, bytes = payload.len(), "Publishing to Pub/Sub");

        let response = request
            .send()
            .await
            .map_err(|e| PublishError::Transport(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                message: rejection_message(status, &text),
            });
        }

        let reply: PublishReply = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;

        Ok(PublishAck {
            message_id: reply.message_ids.into_iter().next(),
        })
    }
}

/// Pub/Sub topic naming rules; anything else would be refused by the API
fn validate_topic_name(name: &str) -> Result<(), PublishError> {
    let reason = if !(3..=255).contains(&name.len()) {
        Some("must be between 3 and 255 characters")
    } else if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        Some("must start with a letter")
    } else if name.starts_with("goog") {
        Some("must not start with \"goog\"")
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_.~+%".contains(c))
    {
        Some("may only contain letters, numbers and - _ . ~ + %")
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

/// `{endpoint}/v1/projects/{project}/topics/{topic}:publish`, each part one encoded segment
fn publish_url(endpoint: &Url, project_id: &str, topic_name: &str) -> Result<Url, PublishError> {
    let method = format!("{topic_name}:publish");
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| PublishError::Broker(format!("endpoint {endpoint} cannot carry a path")))?
        .pop_if_empty()
        .extend(["v1", "projects", project_id, "topics", method.as_str()]);
    Ok(url)
}

/// Pull the human-readable part out of a Google API error body
fn rejection_message(status: StatusCode, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.error.message;
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    status.to_string()
}
