//! Presence counter
//!
//! Connects and disconnects adjust the broker's global count atomically and
//! announce the result on the count channel. Announcements from any instance
//! (this one included) come back through the subscription and are pushed to
//! local clients by [`PresenceCounter::on_count_update_received`].

use super::LocalRegistry;
use crate::connection::ConnectionManager;
use crate::error::GatewayResult;
use crate::protocol::ServerEvent;
use chat_cache::{PubSubChannel, SharedBroker};
use chat_core::{ConnectionCount, CONNECTION_COUNT_KEY};
use std::sync::Arc;

/// Keeps the global connection count in step with local connections
pub struct PresenceCounter {
    broker: SharedBroker,
    connections: Arc<ConnectionManager>,
    registry: LocalRegistry,
}

impl PresenceCounter {
    pub fn new(broker: SharedBroker, connections: Arc<ConnectionManager>) -> Self {
        Self {
            broker,
            connections,
            registry: LocalRegistry::new(),
        }
    }

    /// Seed the global count with zero if no instance has created it yet
    ///
    /// Plain read-then-set: concurrently starting instances may both write 0.
    pub async fn initialize(&self) -> GatewayResult<()> {
        if self.broker.get(CONNECTION_COUNT_KEY).await?.is_none() {
            self.broker.set(CONNECTION_COUNT_KEY, 0).await?;
            tracing::info!(key = CONNECTION_COUNT_KEY, "Seeded connection count");
        }
        Ok(())
    }

    /// Account for a newly accepted local connection
    ///
    /// The connection is recorded locally only once the broker increment has
    /// succeeded, so an `Err` means it is counted nowhere and the caller must
    /// not report its disconnect. A failed announcement after a successful
    /// increment is logged and the connection stays counted.
    ///
    /// Returns `None` for a connection accepted after shutdown reconciliation,
    /// which is never added to the global count.
    pub async fn on_local_connect(&self) -> GatewayResult<Option<ConnectionCount>> {
        if self.registry.is_detached() {
            let (local, _) = self.registry.increment();
            tracing::debug!(local = local, "Connect after reconciliation, global count untouched");
            return Ok(None);
        }

        let total = ConnectionCount::new(self.broker.increment_and_get(CONNECTION_COUNT_KEY).await?);

        let (local, counts_globally) = self.registry.increment();
        if !counts_globally {
            // Reconciliation ran while the increment was in flight and did not
            // include this connection
            self.broker.decrement_and_get(CONNECTION_COUNT_KEY).await?;
            tracing::debug!(local = local, "Increment overtaken by reconciliation, reverted");
            return Ok(None);
        }

        if let Err(e) = self.announce(total).await {
            tracing::warn!(error = %e, total = %total, "Failed to announce connection count");
        }

        tracing::debug!(local = local, total = %total, "Connection counted");
        Ok(Some(total))
    }

    /// Account for a local disconnect
    ///
    /// Returns `None` once shutdown reconciliation has already removed this
    /// instance's connections from the global count.
    pub async fn on_local_disconnect(&self) -> GatewayResult<Option<ConnectionCount>> {
        let (local, counts_globally) = self.registry.decrement();
        if !counts_globally {
            tracing::debug!(local = local, "Disconnect after reconciliation, global count untouched");
            return Ok(None);
        }

        let total = ConnectionCount::new(self.broker.decrement_and_get(CONNECTION_COUNT_KEY).await?);
        self.announce(total).await?;

        tracing::debug!(local = local, total = %total, "Disconnect counted");
        Ok(Some(total))
    }

    /// Push a count announcement from the broker to every local client
    ///
    /// Never publishes back to the broker.
    pub fn on_count_update_received(&self, text: &str) -> GatewayResult<usize> {
        let count: ConnectionCount = text.parse()?;
        Ok(self.connections.broadcast(&ServerEvent::count_updated(count)))
    }

    /// Subtract this instance's connections from the global count
    ///
    /// Read-compute-write, clamped at zero. Detaches the registry first so
    /// connections torn down afterwards are not subtracted a second time.
    /// Returns the written value, or `None` when there was nothing to do.
    pub async fn reconcile_on_shutdown(&self) -> GatewayResult<Option<ConnectionCount>> {
        let local = match self.registry.detach() {
            Some(local) if local > 0 => local,
            _ => return Ok(None),
        };

        tracing::info!(local = local, "Removing local connections from the global count");

        let current = match self.broker.get(CONNECTION_COUNT_KEY).await? {
            Some(raw) => raw.parse::<ConnectionCount>()?,
            None => ConnectionCount::ZERO,
        };
        let reconciled = current.saturating_remove(local);
        self.broker
            .set(CONNECTION_COUNT_KEY, reconciled.into_inner())
            .await?;

        tracing::info!(before = %current, after = %reconciled, "Global count reconciled");
        Ok(Some(reconciled))
    }

    /// Connections currently attached to this instance
    pub fn local_count(&self) -> u64 {
        self.registry.count()
    }

    async fn announce(&self, total: ConnectionCount) -> GatewayResult<()> {
        self.broker
            .publish(&PubSubChannel::ConnectionCountUpdated, &total.to_string())
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for PresenceCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceCounter")
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use chat_cache::{Broker, BrokerError, MemoryBrokerHub};
    use chat_core::DomainError;
    use tokio::sync::mpsc;

    fn counter(hub: &MemoryBrokerHub) -> (PresenceCounter, Arc<ConnectionManager>) {
        let connections = ConnectionManager::new_shared();
        let counter = PresenceCounter::new(Arc::new(hub.connect()), connections.clone());
        (counter, connections)
    }

    #[tokio::test]
    async fn test_initialize_seeds_only_when_absent() {
        let hub = MemoryBrokerHub::new();
        let (presence, _) = counter(&hub);

        presence.initialize().await.unwrap();
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(0));

        hub.connect().set(CONNECTION_COUNT_KEY, 5).await.unwrap();
        presence.initialize().await.unwrap();
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(5));
    }

    #[tokio::test]
    async fn test_connect_increments_and_announces() {
        let hub = MemoryBrokerHub::new();
        let observer = hub.connect();
        let mut updates = observer
            .subscribe(&[PubSubChannel::ConnectionCountUpdated])
            .await
            .unwrap();
        let (presence, _) = counter(&hub);

        assert_eq!(presence.on_local_connect().await.unwrap(), Some(ConnectionCount::new(1)));
        assert_eq!(presence.on_local_connect().await.unwrap(), Some(ConnectionCount::new(2)));
        assert_eq!(presence.local_count(), 2);

        assert_eq!(updates.recv().await.unwrap().payload, "1");
        assert_eq!(updates.recv().await.unwrap().payload, "2");

        assert_eq!(
            presence.on_local_disconnect().await.unwrap(),
            Some(ConnectionCount::new(1))
        );
        assert_eq!(updates.recv().await.unwrap().payload, "1");
        assert_eq!(presence.local_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_is_counted_nowhere() {
        let hub = MemoryBrokerHub::new();
        let (presence, _) = counter(&hub);
        presence.initialize().await.unwrap();
        hub.set_available(false);

        let err = presence.on_local_connect().await.unwrap_err();
        assert!(matches!(err, GatewayError::Broker(BrokerError::Unavailable(_))));
        assert_eq!(presence.local_count(), 0);

        // Broker recovers; the uncounted client goes away without a decrement
        hub.set_available(true);
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(0));
        assert_eq!(presence.on_local_connect().await.unwrap(), Some(ConnectionCount::new(1)));
        assert_eq!(presence.on_local_disconnect().await.unwrap(), Some(ConnectionCount::ZERO));
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(0));
    }

    #[tokio::test]
    async fn test_failed_disconnect_surfaces_error() {
        let hub = MemoryBrokerHub::new();
        let (presence, _) = counter(&hub);
        presence.on_local_connect().await.unwrap();
        hub.set_available(false);

        assert!(presence.on_local_disconnect().await.is_err());
        assert_eq!(presence.local_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_instances_keep_exact_totals() {
        let hub = MemoryBrokerHub::new();
        let (first, _) = counter(&hub);
        let (second, _) = counter(&hub);
        first.initialize().await.unwrap();

        let connects = (0..25)
            .map(|_| first.on_local_connect())
            .chain((0..25).map(|_| second.on_local_connect()));
        let results = futures_util::future::join_all(connects).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(50));

        let disconnects = (0..10)
            .map(|_| first.on_local_disconnect())
            .chain((0..5).map(|_| second.on_local_disconnect()));
        let results = futures_util::future::join_all(disconnects).await;
        assert!(results.iter().all(Result::is_ok));

        assert_eq!(first.local_count(), 15);
        assert_eq!(second.local_count(), 20);
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(35));

        assert_eq!(first.reconcile_on_shutdown().await.unwrap(), Some(ConnectionCount::new(20)));
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(20));
    }

    #[tokio::test]
    async fn test_count_update_fans_out_without_publishing() {
        let hub = MemoryBrokerHub::new();
        let (presence, connections) = counter(&hub);
        let (tx, mut rx) = mpsc::channel(4);
        connections.add_connection("s1".to_string(), tx);

        assert_eq!(presence.on_count_update_received("7").unwrap(), 1);
        assert_eq!(rx.recv().await, Some(ServerEvent::count_updated(ConnectionCount::new(7))));
        assert_eq!(hub.publish_calls(), 0);
    }

    #[tokio::test]
    async fn test_count_update_rejects_garbage() {
        let hub = MemoryBrokerHub::new();
        let (presence, _) = counter(&hub);

        let err = presence.on_count_update_received("seven").unwrap_err();
        assert!(matches!(err, GatewayError::Domain(DomainError::InvalidCount(_))));
    }

    #[tokio::test]
    async fn test_reconcile_subtracts_local_count() {
        let hub = MemoryBrokerHub::new();
        let (presence, _) = counter(&hub);
        let other = hub.connect();

        presence.on_local_connect().await.unwrap();
        other.increment_and_get(CONNECTION_COUNT_KEY).await.unwrap();

        let reconciled = presence.reconcile_on_shutdown().await.unwrap();
        assert_eq!(reconciled, Some(ConnectionCount::new(1)));
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(1));

        // The client torn down afterwards must not be subtracted again
        assert_eq!(presence.on_local_disconnect().await.unwrap(), None);
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(1));
        assert_eq!(presence.local_count(), 0);

        // Nor is a late arrival added
        assert_eq!(presence.on_local_connect().await.unwrap(), None);
        assert_eq!(presence.on_local_disconnect().await.unwrap(), None);
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(1));
    }

    #[tokio::test]
    async fn test_reconcile_clamps_at_zero() {
        let hub = MemoryBrokerHub::new();
        let (presence, _) = counter(&hub);

        presence.on_local_connect().await.unwrap();
        presence.on_local_connect().await.unwrap();
        hub.connect().set(CONNECTION_COUNT_KEY, 1).await.unwrap();

        assert_eq!(
            presence.reconcile_on_shutdown().await.unwrap(),
            Some(ConnectionCount::ZERO)
        );
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(0));
    }

    #[tokio::test]
    async fn test_reconcile_noop_without_local_connections() {
        let hub = MemoryBrokerHub::new();
        let (presence, _) = counter(&hub);
        hub.connect().set(CONNECTION_COUNT_KEY, 3).await.unwrap();

        assert_eq!(presence.reconcile_on_shutdown().await.unwrap(), None);
        assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(3));
    }
}
