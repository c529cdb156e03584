//! Client and server events
//!
//! Every frame is `{"event": <name>, "data": <payload>}`. Event names match
//! the broker channel names they relate to.

use chat_core::{ChatMessage, ConnectionCount, CONNECTION_COUNT_UPDATED_CHANNEL, NEW_MESSAGE_CHANNEL};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::num::FpCategory;

/// Pushed to every local client when the global count changes
pub const COUNT_UPDATED_EVENT: &str = CONNECTION_COUNT_UPDATED_CHANNEL;

/// Sent by clients to post a message, and pushed to clients on fan-out
pub const NEW_MESSAGE_EVENT: &str = NEW_MESSAGE_CHANNEL;

/// Sent only to a client whose message could not be relayed
pub const DELIVERY_FAILED_EVENT: &str = "chat:delivery-failed";

/// Event sent from the server to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    pub event: String,
    pub data: Value,
}

impl ServerEvent {
    /// `{count: text}`
    #[must_use]
    pub fn count_updated(count: ConnectionCount) -> Self {
        Self {
            event: COUNT_UPDATED_EVENT.to_string(),
            data: json!({ "count": count.to_string() }),
        }
    }

    /// `{message, id, createdAt, originTag}`
    #[must_use]
    pub fn new_message(message: &ChatMessage) -> Self {
        Self {
            event: NEW_MESSAGE_EVENT.to_string(),
            data: serde_json::to_value(message).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn delivery_failed(message: &str, reason: &str) -> Self {
        Self {
            event: DELIVERY_FAILED_EVENT.to_string(),
            data: json!({ "message": message, "reason": reason }),
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Event received from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Post a message; `None` when the payload carries no usable text
    NewMessage { message: Option<String> },
    /// Any event this gateway does not handle
    Unknown(String),
}

impl ClientEvent {
    /// Parse a client text frame
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let frame: ClientFrame = serde_json::from_str(text)?;

        if frame.event != NEW_MESSAGE_EVENT {
            return Ok(Self::Unknown(frame.event));
        }

        // Falsy values carry no message; anything else is relayed as text
        let message = match frame.data.get("message") {
            None | Some(Value::Null | Value::Bool(false)) => None,
            Some(Value::Number(n)) if n.as_f64().map(f64::classify) == Some(FpCategory::Zero) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        Ok(Self::NewMessage { message })
    }
}
