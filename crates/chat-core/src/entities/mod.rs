//! Domain entities - core business objects

mod message;

pub use message::{ChatMessage, OriginTag};
