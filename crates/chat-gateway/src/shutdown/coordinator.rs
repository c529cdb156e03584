use crate::connection::ConnectionManager;
use crate::presence::PresenceCounter;
use chat_cache::SharedBroker;
use chat_core::ConnectionCount;
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle of a gateway instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting connections and relaying
    Running,
    /// Termination requested: new sockets refused, global count being reconciled
    Draining,
    /// Local sockets being closed
    Disconnecting,
    /// Broker released, process about to exit
    Closed,
}

impl ShutdownState {
    #[must_use]
    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    /// Whether connection handlers should close their sockets
    #[must_use]
    pub fn closes_sockets(self) -> bool {
        matches!(self, Self::Disconnecting | Self::Closed)
    }
}

/// Owns the instance's shutdown state and broadcasts transitions
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    grace: Duration,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self { state, grace }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Get a receiver that observes every state transition
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Move from `Running` to `Draining`
    ///
    /// Returns false if shutdown had already begun.
    pub fn begin_draining(&self) -> bool {
        let started = self.state.send_if_modified(|state| {
            if state.is_running() {
                *state = ShutdownState::Draining;
                true
            } else {
                false
            }
        });

        if started {
            tracing::info!(grace_ms = self.grace.as_millis(), "Shutdown requested, draining");
        }
        started
    }

    /// Wait until shutdown has begun
    pub async fn draining(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|state| !state.is_running()).await;
    }

    pub(crate) fn disconnect_clients(&self) {
        self.state.send_if_modified(|state| {
            if *state == ShutdownState::Draining {
                *state = ShutdownState::Disconnecting;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn close(&self) {
        self.state.send_replace(ShutdownState::Closed);
        tracing::info!("Gateway closed");
    }

    /// Begin draining on Ctrl-C or SIGTERM
    pub async fn listen_for_signals(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => tracing::info!("Received Ctrl-C"),
            () = terminate => tracing::info!("Received SIGTERM"),
            () = self.draining() => return,
        }

        self.begin_draining();
    }
}

/// Outcome of a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Value written to the global counter, if reconciliation ran
    pub reconciled: Option<ConnectionCount>,
    /// True if the grace period ran out before every socket closed
    pub timed_out: bool,
}

/// Reconcile the global count, close local sockets, release the broker and
/// mark the instance closed
///
/// Call after [`ShutdownCoordinator::begin_draining`]. Sockets are closed
/// only after reconciliation, so the clients it accounted for are not
/// subtracted again by their own disconnects. Handlers watching the state
/// close their sockets on `Disconnecting`.
pub async fn drain(
    coordinator: &ShutdownCoordinator,
    presence: &PresenceCounter,
    connections: &ConnectionManager,
    broker: &SharedBroker,
) -> DrainReport {
    let mut reconciled = None;

    let work = async {
        match presence.reconcile_on_shutdown().await {
            Ok(count) => reconciled = count,
            Err(e) => {
                tracing::error!(error = %e, "Failed to reconcile the global count");
            }
        }
        coordinator.disconnect_clients();
        connections.wait_until_empty().await;
    };

    let timed_out = tokio::time::timeout(coordinator.grace(), work).await.is_err();
    if timed_out {
        tracing::warn!(
            remaining = connections.connection_count(),
            "Grace period elapsed with connections still open"
        );
    }

    if let Err(e) = broker.shutdown().await {
        tracing::warn!(error = %e, "Failed to release broker");
    }

    coordinator.close();

    DrainReport {
        reconciled,
        timed_out,
    }
}
