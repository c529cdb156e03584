//! Gateway protocol
//!
//! JSON text frames exchanged with clients over the WebSocket.

mod events;

pub use events::{
    ClientEvent, ServerEvent, COUNT_UPDATED_EVENT, DELIVERY_FAILED_EVENT, NEW_MESSAGE_EVENT,
};
