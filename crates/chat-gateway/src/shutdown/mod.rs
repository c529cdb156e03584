//! Graceful shutdown
//!
//! A termination signal moves the instance from `Running` to `Draining`.
//! While draining, the instance's local connections are removed from the
//! global count, sockets are closed and the broker is released; the
//! process then reaches `Closed`. The whole drain is bounded by the
//! configured grace period.

mod coordinator;

pub use coordinator::{drain, DrainReport, ShutdownCoordinator, ShutdownState};
