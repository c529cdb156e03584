//! Event broadcasting
//!
//! Routes broker deliveries to the presence counter and message relay.

mod dispatcher;

pub use dispatcher::EventDispatcher;
