//! Event dispatcher
//!
//! Runs one subscriber task per relay channel. Each task receives broker
//! deliveries in order and hands them to the presence counter or the
//! message relay, which fan them out to local connections.

use crate::presence::PresenceCounter;
use crate::relay::MessageRelay;
use crate::shutdown::ShutdownState;
use chat_cache::{BrokerResult, PubSubChannel, ReceivedMessage, SharedBroker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Routes broker messages to local clients
pub struct EventDispatcher {
    broker: SharedBroker,
    presence: Arc<PresenceCounter>,
    relay: Arc<MessageRelay>,
    shutdown: watch::Receiver<ShutdownState>,
    running: AtomicBool,
}

impl EventDispatcher {
    pub fn new(
        broker: SharedBroker,
        presence: Arc<PresenceCounter>,
        relay: Arc<MessageRelay>,
        shutdown: watch::Receiver<ShutdownState>,
    ) -> Self {
        Self {
            broker,
            presence,
            relay,
            shutdown,
            running: AtomicBool::new(false),
        }
    }

    /// Subscribe to both relay channels and spawn their subscriber tasks
    ///
    /// Every subscription has been confirmed by the broker when this returns,
    /// so nothing published afterwards is missed. A refused subscription
    /// fails the whole start.
    pub async fn start(self: &Arc<Self>) -> BrokerResult<Vec<JoinHandle<()>>> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Event dispatcher is already running");
            return Ok(Vec::new());
        }

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        for channel in PubSubChannel::relay_channels() {
            let receiver = match self.broker.subscribe(std::slice::from_ref(&channel)).await {
                Ok(receiver) => receiver,
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    for task in &tasks {
                        task.abort();
                    }
                    return Err(e);
                }
            };

            let dispatcher = self.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher.run(channel, receiver).await;
            }));
        }

        tracing::info!("Event dispatcher started");
        Ok(tasks)
    }

    /// Subscriber loop for one channel
    async fn run(&self, channel: PubSubChannel, mut receiver: broadcast::Receiver<ReceivedMessage>) {
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                msg = receiver.recv() => match msg {
                    Ok(msg) if msg.channel == channel => {
                        self.handle(&msg);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(channel = %channel, lagged = n, "Subscriber lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!(channel = %channel, "Subscription closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() == ShutdownState::Closed {
                        break;
                    }
                }
            }
        }

        tracing::debug!(channel = %channel, "Subscriber task ended");
    }

    /// Route one broker delivery to local clients
    ///
    /// Returns how many local clients it reached. Malformed payloads are
    /// logged and dropped.
    pub fn handle(&self, msg: &ReceivedMessage) -> usize {
        let result = match &msg.channel {
            PubSubChannel::ConnectionCountUpdated => {
                self.presence.on_count_update_received(&msg.payload)
            }
            PubSubChannel::NewMessage => self.relay.on_broker_message(&msg.payload),
            PubSubChannel::Custom(name) => {
                tracing::debug!(channel = %name, "Message on unknown channel, ignoring");
                return 0;
            }
        };

        match result {
            Ok(sent) => sent,
            Err(e) => {
                tracing::warn!(
                    channel = %msg.channel,
                    error = %e,
                    "Dropping malformed broker message"
                );
                0
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("running", &self.is_running())
            .finish()
    }
}
