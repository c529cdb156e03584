//! Pub/Sub channel definitions.
//!
//! Every gateway instance publishes and subscribes on the same two channels.

use chat_core::{CONNECTION_COUNT_UPDATED_CHANNEL, NEW_MESSAGE_CHANNEL};

/// Pub/Sub channel types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PubSubChannel {
    /// Carries the global connection count as decimal text
    ConnectionCountUpdated,
    /// Carries raw chat message text
    NewMessage,
    /// Any other channel name
    Custom(String),
}

impl PubSubChannel {
    /// The channels every gateway instance subscribes to
    #[must_use]
    pub fn relay_channels() -> [Self; 2] {
        [Self::ConnectionCountUpdated, Self::NewMessage]
    }

    /// Create a custom channel
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Get the broker channel name
    #[must_use]
    pub fn name(&self) -> String {
        self.as_str().to_string()
    }

    /// Borrow the broker channel name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ConnectionCountUpdated => CONNECTION_COUNT_UPDATED_CHANNEL,
            Self::NewMessage => NEW_MESSAGE_CHANNEL,
            Self::Custom(name) => name,
        }
    }

    /// Parse a channel name back to a `PubSubChannel`
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            CONNECTION_COUNT_UPDATED_CHANNEL => Self::ConnectionCountUpdated,
            NEW_MESSAGE_CHANNEL => Self::NewMessage,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for PubSubChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
