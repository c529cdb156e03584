//! Value objects - immutable types that represent domain concepts

mod connection_count;

pub use connection_count::ConnectionCount;

/// Broker key holding the global connection count
pub const CONNECTION_COUNT_KEY: &str = "chat:connection-count";

/// Channel announcing a new global connection count (payload: decimal text)
pub const CONNECTION_COUNT_UPDATED_CHANNEL: &str = "chat:connection-count-updated";

/// Channel carrying raw chat message text
pub const NEW_MESSAGE_CHANNEL: &str = "chat:new-message";
