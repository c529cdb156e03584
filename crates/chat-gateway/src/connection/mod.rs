//! Connection management
//!
//! Tracks the WebSocket connections attached to this instance so broker
//! events can be fanned out to them.

mod connection;
mod manager;

pub use connection::Connection;
pub use manager::ConnectionManager;
