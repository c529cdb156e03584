//! Gateway state
//!
//! Application state shared by every request handler.

use crate::broadcast::EventDispatcher;
use crate::connection::ConnectionManager;
use crate::presence::PresenceCounter;
use crate::relay::MessageRelay;
use crate::shutdown::ShutdownCoordinator;
use chat_cache::SharedBroker;
use chat_common::AppConfig;
use std::sync::Arc;

/// Gateway application state
#[derive(Clone)]
pub struct GatewayState {
    /// Application configuration
    config: Arc<AppConfig>,
    /// Shared broker client
    broker: SharedBroker,
    /// Connections attached to this instance
    connection_manager: Arc<ConnectionManager>,
    /// Global connection count bookkeeping
    presence: Arc<PresenceCounter>,
    /// Client message relay
    relay: Arc<MessageRelay>,
    /// Broker subscriber tasks
    dispatcher: Arc<EventDispatcher>,
    /// Instance lifecycle
    shutdown: Arc<ShutdownCoordinator>,
}

impl GatewayState {
    /// Wire up the gateway components around a broker client
    pub fn new(config: AppConfig, broker: SharedBroker) -> Self {
        let connection_manager = ConnectionManager::new_shared();
        let shutdown = Arc::new(ShutdownCoordinator::new(config.shutdown.grace()));
        let presence = Arc::new(PresenceCounter::new(
            broker.clone(),
            connection_manager.clone(),
        ));
        let relay = Arc::new(MessageRelay::new(
            broker.clone(),
            connection_manager.clone(),
            chat_core::OriginTag::new(config.app.instance_id.clone()),
        ));
        let dispatcher = Arc::new(EventDispatcher::new(
            broker.clone(),
            presence.clone(),
            relay.clone(),
            shutdown.subscribe(),
        ));

        Self {
            config: Arc::new(config),
            broker,
            connection_manager,
            presence,
            relay,
            dispatcher,
            shutdown,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn broker(&self) -> &SharedBroker {
        &self.broker
    }

    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.connection_manager
    }

    pub fn presence(&self) -> &PresenceCounter {
        &self.presence
    }

    pub fn relay(&self) -> &MessageRelay {
        &self.relay
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("instance_id", &self.config.app.instance_id)
            .field("connection_manager", &self.connection_manager)
            .field("presence", &self.presence)
            .field("state", &self.shutdown.state())
            .finish()
    }
}
