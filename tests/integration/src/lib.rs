//! Integration test utilities for the chat relay
//!
//! Runs real gateway instances on ephemeral ports, all sharing one
//! in-memory broker hub, and talks to them over HTTP and WebSocket.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
