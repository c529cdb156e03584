//! Local connection registry
//!
//! Counts the clients attached to this instance. Increments, decrements and
//! the shutdown detach all take the same lock, so a disconnect racing with
//! reconciliation is either included in the reconciled count or accounted
//! for by its own broker decrement, never both.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct RegistryState {
    count: u64,
    detached: bool,
}

/// Per-instance connection count
#[derive(Debug, Default)]
pub struct LocalRegistry {
    state: Mutex<RegistryState>,
}

impl LocalRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted connection
    ///
    /// Returns the new local count and whether the global counter needs the
    /// matching increment (false once the registry is detached).
    pub(crate) fn increment(&self) -> (u64, bool) {
        let mut state = self.state.lock();
        state.count += 1;
        (state.count, !state.detached)
    }

    /// Record a disconnect
    ///
    /// Returns the new local count and whether the global counter still
    /// needs its own decrement (false once the registry is detached).
    pub(crate) fn decrement(&self) -> (u64, bool) {
        let mut state = self.state.lock();
        if state.count == 0 {
            tracing::warn!("Disconnect without matching connect");
        }
        state.count = state.count.saturating_sub(1);
        (state.count, !state.detached)
    }

    /// Stop per-client global accounting and return the count to reconcile
    ///
    /// Returns `None` if the registry was already detached.
    pub(crate) fn detach(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.detached {
            return None;
        }
        state.detached = true;
        Some(state.count)
    }

    /// Current local count
    pub fn count(&self) -> u64 {
        self.state.lock().count
    }

    pub fn is_detached(&self) -> bool {
        self.state.lock().detached
    }
}
