//! Domain errors - error types for the domain layer

use thiserror::Error;

/// Domain layer errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Invalid connection count: {0:?}")]
    InvalidCount(String),
}

impl DomainError {
    /// Get an error code string for client-facing payloads
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::InvalidCount(_) => "INVALID_COUNT",
        }
    }
}
