//! Frames exchanged with the gateway

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COUNT_UPDATED: &str = "chat:connection-count-updated";
pub const NEW_MESSAGE: &str = "chat:new-message";
pub const DELIVERY_FAILED: &str = "chat:delivery-failed";

/// Any frame pushed by the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Client frame posting a message
#[derive(Debug, Serialize)]
pub struct OutgoingFrame {
    pub event: &'static str,
    pub data: Value,
}

impl OutgoingFrame {
    pub fn message(text: &str) -> Self {
        Self {
            event: NEW_MESSAGE,
            data: serde_json::json!({ "message": text }),
        }
    }

    pub fn without_message() -> Self {
        Self {
            event: NEW_MESSAGE,
            data: serde_json::json!({}),
        }
    }
}

/// `chat:connection-count-updated` payload
#[derive(Debug, Deserialize)]
pub struct CountUpdate {
    pub count: String,
}

/// `chat:new-message` payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedMessage {
    pub message: String,
    pub id: uuid::Uuid,
    pub created_at: String,
    pub origin_tag: String,
}

/// `chat:delivery-failed` payload
#[derive(Debug, Deserialize)]
pub struct DeliveryFailed {
    pub message: String,
    pub reason: String,
}

/// `GET /healthcheck` body
#[derive(Debug, Deserialize)]
pub struct HealthBody {
    pub status: String,
    pub port: u16,
}
