//! Broker error types.

/// Error type for broker operations
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Failed to create Redis pool: {0}")]
    CreatePool(String),

    #[error("Failed to get connection from pool: {0}")]
    GetConnection(#[from] deadpool_redis::PoolError),

    #[error("Redis command error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Value at {key} is not an integer: {value:?}")]
    InvalidCounter { key: String, value: String },

    #[error("Counter at {key} would overflow")]
    CounterOverflow { key: String },

    #[error("Subscriber channel closed")]
    ChannelClosed,
}

impl BrokerError {
    /// Create an unavailable error
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;
