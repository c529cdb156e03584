//! Global connection count
//!
//! The broker stores the count as a signed integer. It may briefly go
//! negative while instances race; readers clamp it when reconciling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Number of clients connected across every gateway instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionCount(i64);

impl ConnectionCount {
    /// The seed value written when the broker has no count yet
    pub const ZERO: Self = Self(0);

    /// Create a count from a raw broker value
    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the inner value
    #[inline]
    pub const fn into_inner(self) -> i64 {
        self.0
    }

    /// Subtract `local` connections, never going below zero
    #[must_use]
    pub fn saturating_remove(self, local: u64) -> Self {
        let local = i64::try_from(local).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(local).max(0))
    }
}

impl From<i64> for ConnectionCount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for ConnectionCount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| DomainError::InvalidCount(s.to_string()))
    }
}

impl fmt::Display for ConnectionCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
