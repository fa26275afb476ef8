//! JSON-RPC 2.0 envelopes exchanged with the server process.
//!
//! Outbound traffic is built from [`RequestEnvelope`]; inbound lines are
//! turned into [`ResponseEnvelope`]s by [`parse_responses`]. Anything on the
//! stdout stream that is not a response (log text, server notifications,
//! server-to-client requests) is dropped here without raising an error.

use serde::Serialize;
use serde_json::Value;

use crate::{AppError, Result};

/// Protocol version written into every outbound envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound request or notification.
///
/// A notification is an envelope without an `id`; the server never answers
/// it, so it is never tracked by the correlator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestEnvelope {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl RequestEnvelope {
    /// Build a request that expects a response correlated by `id`.
    #[must_use]
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Build a fire-and-forget notification.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Convert into a [`Value`] for the writer channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if serialisation fails.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self)
            .map_err(|e| AppError::Protocol(format!("failed to serialise envelope: {e}")))
    }
}

/// Inbound response matched to a pending request by its integer `id`.
///
/// The complete JSON object is kept so callers receive the envelope
/// verbatim, `error` member included.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    id: u64,
    raw: Value,
}

impl ResponseEnvelope {
    /// Interpret `value` as a response.
    ///
    /// Returns `None` unless `value` is an object with a non-negative integer
    /// `id` and no `method` member (which would make it a server-to-client
    /// request rather than an answer to one of ours).
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.contains_key("method") {
            return None;
        }
        let id = obj.get("id").and_then(Value::as_u64)?;
        Some(Self { id, raw: value })
    }

    /// Correlation id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the envelope carries an `error` member.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.raw.get("error").is_some_and(|e| !e.is_null())
    }

    /// `error.message`, when present.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.raw
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
    }

    /// Take the full envelope.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.raw
    }
}

/// Split one framed line into the JSON values it contains.
///
/// Servers normally write one object per line, but several objects written
/// back to back without a separator are accepted too. Parsing stops at the
/// first fragment that is not valid JSON; everything from there to the end
/// of the line is discarded.
#[must_use]
pub fn frame_values(line: &str) -> Vec<Value> {
    serde_json::Deserializer::from_str(line)
        .into_iter::<Value>()
        .map_while(std::result::Result::ok)
        .collect()
}

/// Extract every response envelope from one framed line.
#[must_use]
pub fn parse_responses(line: &str) -> Vec<ResponseEnvelope> {
    frame_values(line)
        .into_iter()
        .filter_map(ResponseEnvelope::from_value)
        .collect()
}
