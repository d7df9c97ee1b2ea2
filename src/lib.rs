//! Pub/Sub Gateway - HTTP to message broker publish bridge
//!
//! Accepts `POST` requests carrying `{"content": ..., "pubsub_name": ...}`,
//! publishes `content` to the named topic and answers once the broker has
//! acknowledged (or refused) the message:
//! - Google Cloud Pub/Sub over REST (production, regional endpoints, emulator)
//! - NATS JetStream as an alternative backend
//! - Health/ready/metrics endpoints on a separate ops port

pub mod broker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod metrics;
