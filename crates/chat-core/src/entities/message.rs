//! Chat message entity - a message as delivered to local clients
//!
//! The broker only carries the raw text. Identity and timestamp are stamped
//! by each instance when it fans the text out, so two instances delivering
//! the same broker message produce two distinct `ChatMessage` values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::DomainError;

/// Identifies the gateway instance that fanned a message out
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginTag(String);

impl OriginTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OriginTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "message")]
    text: String,
    id: Uuid,
    created_at: DateTime<Utc>,
    origin_tag: OriginTag,
}

impl ChatMessage {
    /// Stamp broker-delivered text with a fresh id and the current time
    pub fn stamp(text: impl Into<String>, origin_tag: OriginTag) -> Result<Self, DomainError> {
        let text = text.into();
        if text.is_empty() {
            return Err(DomainError::EmptyMessage);
        }

        Ok(Self {
            text,
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            origin_tag,
        })
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn origin_tag(&self) -> &OriginTag {
        &self.origin_tag
    }
}
