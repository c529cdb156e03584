//! Connection manager
//!
//! Holds every WebSocket attached to this instance in a `DashMap` and
//! provides the broadcast-to-all-local operation used for fan-out.

use super::Connection;
use crate::protocol::ServerEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Manages all active WebSocket connections
pub struct ConnectionManager {
    /// Active connections by session ID
    connections: DashMap<String, Arc<Connection>>,

    /// Signalled whenever a connection is removed
    removed: Notify,
}

impl ConnectionManager {
    /// Create a new connection manager
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            removed: Notify::new(),
        }
    }

    /// Create a new connection manager wrapped in Arc
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection
    pub fn add_connection(
        &self,
        session_id: String,
        sender: mpsc::Sender<ServerEvent>,
    ) -> Arc<Connection> {
        let connection = Connection::new(session_id.clone(), sender);
        self.connections.insert(session_id.clone(), connection.clone());

        tracing::debug!(session_id = %session_id, "Connection added");

        connection
    }

    /// Remove a connection
    pub fn remove_connection(&self, session_id: &str) {
        if self.connections.remove(session_id).is_some() {
            tracing::debug!(session_id = %session_id, "Connection removed");
            self.removed.notify_waiters();
        }
    }

    /// Push an event to every local connection, returning how many accepted it
    ///
    /// A connection whose queue is full or closed misses this event; the
    /// others are unaffected.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        let mut sent = 0;

        for entry in self.connections.iter() {
            match entry.try_send(event.clone()) {
                Ok(()) => sent += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        session_id = %entry.key(),
                        event = %event.event,
                        "Outbound queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::trace!(session_id = %entry.key(), "Connection closing, skipped");
                }
            }
        }

        tracing::debug!(event = %event.event, sent = sent, "Event broadcast to local connections");

        sent
    }

    /// Get the total number of active connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Wait until every connection has been removed
    pub async fn wait_until_empty(&self) {
        loop {
            let removed = self.removed.notified();
            if self.connections.is_empty() {
                return;
            }
            removed.await;
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.connections.len())
            .finish()
    }
}
