//! Redis Pub/Sub module.
//!
//! Provides publish/subscribe functionality for cross-instance relay.

mod channels;
mod publisher;
mod subscriber;

pub use channels::PubSubChannel;
pub use publisher::Publisher;
pub use subscriber::{ReceivedMessage, Subscriber, SubscriberBuilder, SubscriberConfig};
