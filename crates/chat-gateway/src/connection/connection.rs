//! Individual WebSocket connection
//!
//! Holds the outbound queue drained by the connection's send task.

use crate::protocol::ServerEvent;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// A single WebSocket connection
pub struct Connection {
    /// Unique session ID
    session_id: String,

    /// Channel to send events to the WebSocket
    sender: mpsc::Sender<ServerEvent>,

    /// Connection creation time
    created_at: Instant,
}

impl Connection {
    /// Create a new connection
    pub fn new(session_id: String, sender: mpsc::Sender<ServerEvent>) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            sender,
            created_at: Instant::now(),
        })
    }

    /// Generate a new session ID
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Get the session ID
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get connection age
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Queue an event without waiting for space
    pub fn try_send(&self, event: ServerEvent) -> Result<(), mpsc::error::TrySendError<ServerEvent>> {
        self.sender.try_send(event)
    }

    /// Check if the send task has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("session_id", &self.session_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}
