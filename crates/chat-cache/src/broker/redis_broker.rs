//! Redis-backed broker.

use super::Broker;
use crate::error::BrokerResult;
use crate::pool::{RedisPool, RedisPoolConfig};
use crate::pubsub::{PubSubChannel, Publisher, ReceivedMessage, Subscriber, SubscriberBuilder};
use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::broadcast;

/// Configuration for the Redis broker
#[derive(Debug, Clone)]
pub struct RedisBrokerConfig {
    pub pool: RedisPoolConfig,
    /// Broadcast buffer for received pub/sub messages
    pub broadcast_buffer: usize,
    /// Delay before the subscriber reconnects after an error
    pub reconnect_delay_ms: u64,
}

impl Default for RedisBrokerConfig {
    fn default() -> Self {
        Self {
            pool: RedisPoolConfig::default(),
            broadcast_buffer: 1024,
            reconnect_delay_ms: 1000,
        }
    }
}

impl From<&chat_common::RedisConfig> for RedisBrokerConfig {
    fn from(config: &chat_common::RedisConfig) -> Self {
        Self {
            pool: RedisPoolConfig::from(config),
            ..Self::default()
        }
    }
}

/// Broker backed by a Redis server
///
/// Commands share a pool; subscriptions run on their own connection since a
/// Redis connection in subscribe mode cannot issue other commands.
#[derive(Debug)]
pub struct RedisBroker {
    pool: RedisPool,
    publisher: Publisher,
    subscriber: Subscriber,
}

impl RedisBroker {
    /// Create the pool and start the subscriber loop
    pub async fn connect(config: RedisBrokerConfig) -> BrokerResult<Self> {
        let pool = RedisPool::new(config.pool.clone())?;
        let subscriber = SubscriberBuilder::new()
            .redis_url(&config.pool.url)
            .broadcast_buffer(config.broadcast_buffer)
            .reconnect_delay_ms(config.reconnect_delay_ms)
            .build();

        Ok(Self {
            publisher: Publisher::new(pool.clone()),
            pool,
            subscriber,
        })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, channel: &PubSubChannel, text: &str) -> BrokerResult<u32> {
        self.publisher.publish(channel, text).await
    }

    async fn subscribe(
        &self,
        channels: &[PubSubChannel],
    ) -> BrokerResult<broadcast::Receiver<ReceivedMessage>> {
        // Take the receiver first so nothing published after SUBSCRIBE is missed
        let receiver = self.subscriber.receiver();
        self.subscriber.subscribe(channels).await?;
        Ok(receiver)
    }

    async fn get(&self, key: &str) -> BrokerResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: i64) -> BrokerResult<()> {
        let mut conn = self.pool.get().await?;
        conn.set::<_, _, ()>(key, value).await?;
        tracing::debug!(key = %key, value = value, "Counter set");
        Ok(())
    }

    async fn increment_and_get(&self, key: &str) -> BrokerResult<i64> {
        let mut conn = self.pool.get().await?;
        let value: i64 = conn.incr(key, 1).await?;
        tracing::debug!(key = %key, value = value, "Counter incremented");
        Ok(value)
    }

    async fn decrement_and_get(&self, key: &str) -> BrokerResult<i64> {
        let mut conn = self.pool.get().await?;
        let value: i64 = conn.decr(key, 1).await?;
        tracing::debug!(key = %key, value = value, "Counter decremented");
        Ok(value)
    }

    async fn health_check(&self) -> BrokerResult<()> {
        self.pool.health_check().await
    }

    async fn shutdown(&self) -> BrokerResult<()> {
        self.subscriber.shutdown().await
    }
}
