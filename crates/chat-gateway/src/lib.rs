//! # chat-gateway
//!
//! WebSocket gateway for a chat room spread across several instances.
//!
//! Every instance accepts clients directly and coordinates with the others
//! only through the shared broker:
//!
//! - **presence**: global connection count kept with atomic broker counters
//!   and announced on `chat:connection-count-updated`
//! - **relay**: client messages published on `chat:new-message` and fanned
//!   out by every subscribed instance, the sender's included
//! - **shutdown**: a draining instance removes its clients from the global
//!   count before it exits

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod presence;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod shutdown;

pub use error::{GatewayError, GatewayResult};
pub use server::{create_app, create_gateway_state, run, serve, GatewayState};
