//! Message relay
//!
//! A client message is published verbatim and reaches its sender only
//! through the broker subscription, the same way it reaches every other
//! client. Deliveries are stamped with this instance's origin tag.

use crate::connection::ConnectionManager;
use crate::error::GatewayResult;
use crate::protocol::ServerEvent;
use chat_cache::{PubSubChannel, SharedBroker};
use chat_core::{ChatMessage, OriginTag};
use std::sync::Arc;

/// Relays chat messages between local clients and the broker
pub struct MessageRelay {
    broker: SharedBroker,
    connections: Arc<ConnectionManager>,
    origin_tag: OriginTag,
}

impl MessageRelay {
    pub fn new(
        broker: SharedBroker,
        connections: Arc<ConnectionManager>,
        origin_tag: OriginTag,
    ) -> Self {
        Self {
            broker,
            connections,
            origin_tag,
        }
    }

    /// Publish a client's message on the message channel
    ///
    /// Empty or absent text is dropped and returns `Ok(false)`. There is no
    /// local echo: the sender sees its message through the subscription like
    /// every other client.
    pub async fn on_local_message(&self, text: Option<&str>) -> GatewayResult<bool> {
        let Some(text) = text.filter(|t| !t.is_empty()) else {
            tracing::debug!("Dropping empty message");
            return Ok(false);
        };

        self.broker.publish(&PubSubChannel::NewMessage, text).await?;
        Ok(true)
    }

    /// Stamp a message delivered by the broker and push it to local clients
    ///
    /// Returns how many local clients accepted it.
    pub fn on_broker_message(&self, text: &str) -> GatewayResult<usize> {
        let message = ChatMessage::stamp(text, self.origin_tag.clone())?;

        let sent = self.connections.broadcast(&ServerEvent::new_message(&message));
        tracing::trace!(id = %message.id(), sent = sent, "Message fanned out");

        Ok(sent)
    }

    pub fn origin_tag(&self) -> &OriginTag {
        &self.origin_tag
    }
}

impl std::fmt::Debug for MessageRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRelay")
            .field("origin_tag", &self.origin_tag)
            .finish()
    }
}
