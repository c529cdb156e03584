//! Distributed presence counting
//!
//! Keeps this instance's connection count and the broker's global count in
//! step, and pushes global count updates to local clients.

mod counter;
mod registry;

pub use counter::PresenceCounter;
pub use registry::LocalRegistry;
