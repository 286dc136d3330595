//! Wire decoding and normalization of log records.
//!
//! Records arrive from the bus as UTF-8 JSON with no required fields;
//! normalization fills defaults and enforces the two invariants every
//! downstream component relies on: a non-empty message and a non-empty
//! namespace.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid record: {0}")]
    Invalid(&'static str),
}

/// Kubernetes metadata attached to a record by the log forwarder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct KubernetesMeta {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub pod: String,
    #[serde(default)]
    pub container: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// A single normalized observability event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub service: String,
    #[serde(default)]
    pub kubernetes: KubernetesMeta,
    #[serde(default)]
    pub host: String,
    /// Original wire bytes, kept for debugging.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw: String,
}

impl Default for LogRecord {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            level: String::new(),
            message: String::new(),
            service: String::new(),
            kubernetes: KubernetesMeta::default(),
            host: String::new(),
            raw: String::new(),
        }
    }
}

/// Flat wire shape. `@timestamp` is accepted in place of `timestamp`.
#[derive(Debug, Deserialize)]
struct WireRecord {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, rename = "@timestamp")]
    at_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    kubernetes: Option<KubernetesMeta>,
    #[serde(default)]
    host: Option<String>,
}

/// Fields recognized when the message body is itself a JSON document.
#[derive(Debug, Deserialize)]
struct InnerMessage {
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl LogRecord {
    /// Decode wire bytes into a normalized record.
    ///
    /// `default_level` is assigned when no level survives normalization; it
    /// also marks an outer level as overridable by a nested message body.
    pub fn decode(bytes: &[u8], default_level: &str) -> Result<Self, DecodeError> {
        Self::decode_at(bytes, default_level, Utc::now())
    }

    /// Decode with an explicit ingestion instant, used when the caller wants
    /// deterministic output for records that carry no timestamp.
    pub fn decode_at(
        bytes: &[u8],
        default_level: &str,
        ingested_at: DateTime<Utc>,
    ) -> Result<Self, DecodeError> {
        let wire: WireRecord = serde_json::from_slice(bytes)?;

        let mut timestamp = wire.timestamp.or(wire.at_timestamp);
        let mut level = wire.level.unwrap_or_default();
        let mut message = wire.message.unwrap_or_default();
        let mut service = wire.service.unwrap_or_default();
        let kubernetes = wire.kubernetes.unwrap_or_default();
        let host = wire.host.unwrap_or_default();

        // The body may itself be a JSON document whose fields take
        // precedence over the outer envelope. The outer level wins unless it
        // is empty or still the configured default.
        if message.trim_start().starts_with('{') {
            if let Ok(inner) = serde_json::from_str::<InnerMessage>(&message) {
                if let Some(inner_service) = non_empty(inner.service) {
                    service = inner_service;
                }
                if let Some(inner_level) = non_empty(inner.level) {
                    if level.is_empty() || level == default_level {
                        level = inner_level;
                    }
                }
                if let Some(inner_timestamp) = inner.timestamp {
                    timestamp = Some(inner_timestamp);
                }
                if let Some(inner_message) = non_empty(inner.message) {
                    message = inner_message;
                }
            }
        }

        if service.is_empty() {
            service = non_empty(kubernetes.labels.get("app").cloned())
                .or_else(|| non_empty(kubernetes.labels.get("service").cloned()))
                .unwrap_or_else(|| "unknown".to_string());
        }
        if level.is_empty() {
            level = default_level.to_string();
        }

        if message.is_empty() {
            return Err(DecodeError::Invalid("empty message"));
        }
        if kubernetes.namespace.is_empty() {
            return Err(DecodeError::Invalid("empty namespace"));
        }

        Ok(Self {
            timestamp: timestamp.unwrap_or(ingested_at),
            level,
            message,
            service,
            kubernetes,
            host,
            raw: String::from_utf8_lossy(bytes).into_owned(),
        })
    }
}
