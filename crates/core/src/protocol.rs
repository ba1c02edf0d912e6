//! Wire protocol for UI client <-> host communication
//!
//! All traffic between the two buses is one of three message shapes:
//! a correlated request, its correlated response, or a fire-and-forget
//! event broadcast. Correlation is solely by `requestId`, never by
//! arrival order.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message travelling over the transport in either direction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BusMessage {
    #[serde(rename = "request")]
    Request(RequestEnvelope),
    #[serde(rename = "response")]
    Response(ResponseEnvelope),
    #[serde(rename = "event")]
    Event(EventEnvelope),
}

/// A correlated request sent from the client bus to the host bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Unique per client bus instance for the lifetime of the pending entry
    pub id: String,
    /// Millis since epoch at send time
    pub timestamp: i64,
    /// Command name used for handler lookup on the host
    pub command: String,
    /// Command payload, parsed into the typed union at the dispatch boundary
    #[serde(default)]
    pub payload: Value,
}

impl RequestEnvelope {
    /// Build a request envelope stamped with the current time
    pub fn new(id: impl Into<String>, command: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now().timestamp_millis(),
            command: command.into(),
            payload,
        }
    }
}

/// The correlated response to a previously sent request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// Echoes the originating request id
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Successful response carrying the handler's value
    pub fn ok(request_id: impl Into<String>, payload: Value) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Failed response carrying a human-readable message
    pub fn err(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            success: false,
            payload: None,
            error: Some(message.into()),
        }
    }
}

/// An uncorrelated broadcast, delivered to zero or more subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl EventEnvelope {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}
