//! Broker client interface.
//!
//! The narrow set of operations the relay protocol needs from the shared
//! broker. Gateway components hold an injected [`SharedBroker`] and never
//! reach for a global connection, so tests can swap in [`MemoryBroker`].

mod memory_broker;
mod redis_broker;

pub use memory_broker::{MemoryBroker, MemoryBrokerHub};
pub use redis_broker::{RedisBroker, RedisBrokerConfig};

use crate::error::BrokerResult;
use crate::pubsub::{PubSubChannel, ReceivedMessage};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Publish/subscribe and atomic counter operations on the shared broker
///
/// Every call is fallible; callers decide whether a failure is fatal.
#[async_trait]
pub trait Broker: Send + Sync + std::fmt::Debug {
    /// Publish text on a channel, returning the number of subscribers reached
    async fn publish(&self, channel: &PubSubChannel, text: &str) -> BrokerResult<u32>;

    /// Subscribe to channels and get a receiver for everything this
    /// instance is subscribed to
    async fn subscribe(
        &self,
        channels: &[PubSubChannel],
    ) -> BrokerResult<broadcast::Receiver<ReceivedMessage>>;

    /// Read a key as text
    async fn get(&self, key: &str) -> BrokerResult<Option<String>>;

    /// Unconditionally write an integer value
    async fn set(&self, key: &str, value: i64) -> BrokerResult<()>;

    /// Atomically increment a counter and return the new value
    async fn increment_and_get(&self, key: &str) -> BrokerResult<i64>;

    /// Atomically decrement a counter and return the new value
    async fn decrement_and_get(&self, key: &str) -> BrokerResult<i64>;

    /// Check that the broker answers
    async fn health_check(&self) -> BrokerResult<()>;

    /// Release subscriptions and connections held for this instance
    async fn shutdown(&self) -> BrokerResult<()>;
}

/// Broker shared across gateway components
pub type SharedBroker = Arc<dyn Broker>;
