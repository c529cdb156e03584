//! Redis Pub/Sub publisher.
//!
//! Publishes plain-text payloads. The relay protocol never wraps payloads:
//! counts travel as decimal text and messages as the client's raw text.

use crate::error::BrokerResult;
use crate::pool::RedisPool;
use crate::pubsub::PubSubChannel;
use redis::AsyncCommands;

/// Redis Pub/Sub publisher
#[derive(Clone, Debug)]
pub struct Publisher {
    pool: RedisPool,
}

impl Publisher {
    /// Create a new publisher
    #[must_use]
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Publish a text payload, returning the number of subscribers reached
    pub async fn publish(&self, channel: &PubSubChannel, text: &str) -> BrokerResult<u32> {
        let mut conn = self.pool.get().await?;

        let receivers: u32 = conn.publish(channel.as_str(), text).await?;

        tracing::debug!(
            channel = %channel,
            receivers = receivers,
            "Published message"
        );

        Ok(receivers)
    }
}
