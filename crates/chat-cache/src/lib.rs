//! # chat-cache
//!
//! Broker client for the distributed chat relay.
//!
//! ## Features
//!
//! - **Broker trait**: publish, subscribe and atomic counter operations
//! - **Redis broker**: deadpool-redis pool for commands, a dedicated
//!   pub/sub connection with automatic reconnect for subscriptions
//! - **Memory broker**: in-process hub shared by several instances, with
//!   failure injection
//!
//! ## Example
//!
//! ```ignore
//! use chat_cache::{Broker, PubSubChannel, RedisBroker, RedisBrokerConfig};
//!
//! let broker = RedisBroker::connect(RedisBrokerConfig::from(&config.redis)).await?;
//! let mut updates = broker.subscribe(&PubSubChannel::relay_channels()).await?;
//! let total = broker.increment_and_get(chat_core::CONNECTION_COUNT_KEY).await?;
//! broker.publish(&PubSubChannel::ConnectionCountUpdated, &total.to_string()).await?;
//! ```

pub mod broker;
pub mod error;
pub mod pool;
pub mod pubsub;

pub use broker::{
    Broker, MemoryBroker, MemoryBrokerHub, RedisBroker, RedisBrokerConfig, SharedBroker,
};
pub use error::{BrokerError, BrokerResult};
pub use pool::{RedisPool, RedisPoolConfig};
pub use pubsub::{
    PubSubChannel, Publisher, ReceivedMessage, Subscriber, SubscriberBuilder, SubscriberConfig,
};
