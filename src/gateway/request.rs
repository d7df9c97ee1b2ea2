//! Publish request parsing
//!
//! A field counts as missing when it is absent or holds a "falsy" JSON value:
//! `null`, `false`, `0`, `""`, `[]` or `{}`. `content` is checked before
//! `pubsub_name`, so a body missing both reports `content`.
//!
//! Present but non-string values: `pubsub_name` is rendered to text (`42`,
//! `True`) and left for the broker to accept or refuse; `content` cannot be
//! encoded to message bytes and fails as a publish failure.

use super::response::RequestRejection;
use crate::broker::PublishError;
use serde_json::{Map, Value};

/// Validated publish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    /// Message payload, published as its UTF-8 bytes
    pub content: String,
    /// Destination topic name
    pub pubsub_name: String,
}

impl PublishRequest {
    /// Decode and validate a raw request body
    pub fn from_body(body: &[u8]) -> Result<Self, RequestRejection> {
        let text = std::str::from_utf8(body).map_err(|e| {
            RequestRejection::Unexpected(format!("request body is not valid UTF-8: {e}"))
        })?;

        let value: Value = serde_json::from_str(text).map_err(|_| RequestRejection::InvalidJson)?;

        Self::from_value(value)
    }

    /// Validate an already-parsed JSON document
    pub fn from_value(value: Value) -> Result<Self, RequestRejection> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(RequestRejection::Unexpected(format!(
                    "request body must be a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let content = take_present(&mut fields, "content")
            .ok_or(RequestRejection::MissingContent)?;
        let pubsub_name = take_present(&mut fields, "pubsub_name")
            .ok_or(RequestRejection::MissingPubsubName)?;

        let pubsub_name = topic_name_text(pubsub_name);
        let content = match content {
            Value::String(content) => content,
            other => {
                return Err(RequestRejection::PublishFailed(PublishError::InvalidPayload(
                    format!(
                        "\"content\" of type {} cannot be encoded as UTF-8 bytes",
                        json_kind(&other)
                    ),
                )))
            }
        };

        Ok(Self {
            content,
            pubsub_name,
        })
    }
}

/// Remove `key` and return it only if it holds a truthy value
fn take_present(fields: &mut Map<String, Value>, key: &str) -> Option<Value> {
    fields.remove(key).filter(is_truthy)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn topic_name_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        // Only `true` gets here
        Value::Bool(_) => "True".to_string(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
