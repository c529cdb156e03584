//! Message relay
//!
//! Client messages go out to the broker verbatim; messages coming back from
//! the broker are stamped and fanned out to local clients.

mod message_relay;

pub use message_relay::MessageRelay;
