//! Gateway error types
//!
//! Errors surfaced by presence and relay operations to the connection that
//! triggered them. They never propagate to other sessions.

use chat_cache::BrokerError;
use chat_core::DomainError;

/// Error type for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl GatewayError {
    /// Get an error code for client-facing payloads
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Broker(_) => "BROKER_UNAVAILABLE",
            Self::Domain(e) => e.code(),
        }
    }

    /// Check if the broker could not be reached
    #[must_use]
    pub fn is_broker_unavailable(&self) -> bool {
        matches!(self, Self::Broker(_))
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
