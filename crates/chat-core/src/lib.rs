//! # chat-core
//!
//! Domain layer for the distributed chat room: the relayed chat message, the
//! shared connection count, and the well-known broker names every gateway
//! instance agrees on. This crate has no dependencies on infrastructure.

pub mod entities;
pub mod error;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{ChatMessage, OriginTag};
pub use error::DomainError;
pub use value_objects::{
    ConnectionCount, CONNECTION_COUNT_KEY, CONNECTION_COUNT_UPDATED_CHANNEL, NEW_MESSAGE_CHANNEL,
};
