//! In-process broker.
//!
//! A [`MemoryBrokerHub`] plays the role of the shared Redis server; each
//! gateway instance gets its own [`MemoryBroker`] handle from
//! [`MemoryBrokerHub::connect`]. Values are stored as text and counters are
//! parsed on every increment, matching Redis semantics. The hub can be
//! switched offline to exercise broker failure paths.

use super::Broker;
use crate::error::{BrokerError, BrokerResult};
use crate::pubsub::{PubSubChannel, ReceivedMessage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const BROADCAST_BUFFER: usize = 1024;

/// One instance's subscriber connection
#[derive(Debug)]
struct Subscription {
    id: u64,
    channels: Mutex<HashSet<String>>,
    sender: Mutex<Option<broadcast::Sender<ReceivedMessage>>>,
}

#[derive(Debug, Default)]
struct HubState {
    values: HashMap<String, String>,
    subscriptions: Vec<Arc<Subscription>>,
}

#[derive(Debug)]
struct HubInner {
    state: Mutex<HubState>,
    available: AtomicBool,
    next_id: AtomicU64,
    publish_calls: AtomicU64,
}

/// Shared in-memory broker state
#[derive(Debug, Clone)]
pub struct MemoryBrokerHub {
    inner: Arc<HubInner>,
}

impl Default for MemoryBrokerHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBrokerHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(HubState::default()),
                available: AtomicBool::new(true),
                next_id: AtomicU64::new(1),
                publish_calls: AtomicU64::new(0),
            }),
        }
    }

    /// Open a broker handle for one gateway instance
    #[must_use]
    pub fn connect(&self) -> MemoryBroker {
        let (sender, _) = broadcast::channel(BROADCAST_BUFFER);
        let subscription = Arc::new(Subscription {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            channels: Mutex::new(HashSet::new()),
            sender: Mutex::new(Some(sender)),
        });

        self.inner
            .state
            .lock()
            .subscriptions
            .push(subscription.clone());

        MemoryBroker {
            hub: self.clone(),
            subscription,
            closed: AtomicBool::new(false),
        }
    }

    /// Simulate the broker going down (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Read a stored value without going through a broker handle
    #[must_use]
    pub fn value(&self, key: &str) -> Option<String> {
        self.inner.state.lock().values.get(key).cloned()
    }

    /// Read a stored counter, if present and numeric
    #[must_use]
    pub fn counter(&self, key: &str) -> Option<i64> {
        self.value(key).and_then(|v| v.parse().ok())
    }

    /// Overwrite a counter as another process would
    pub fn set_counter(&self, key: &str, value: i64) {
        self.inner
            .state
            .lock()
            .values
            .insert(key.to_string(), value.to_string());
    }

    /// Number of successful publish calls made through any handle
    #[must_use]
    pub fn publish_calls(&self) -> u64 {
        self.inner.publish_calls.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> BrokerResult<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::unavailable("broker offline"))
        }
    }

    fn add_to_counter(&self, key: &str, delta: i64) -> BrokerResult<i64> {
        let mut state = self.inner.state.lock();
        let current = match state.values.get(key) {
            Some(raw) => raw.parse::<i64>().map_err(|_| BrokerError::InvalidCounter {
                key: key.to_string(),
                value: raw.clone(),
            })?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| BrokerError::CounterOverflow { key: key.to_string() })?;
        state.values.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    fn deliver(&self, channel: &PubSubChannel, text: &str) -> u32 {
        let state = self.inner.state.lock();
        let mut receivers = 0;

        for subscription in &state.subscriptions {
            if !subscription.channels.lock().contains(channel.as_str()) {
                continue;
            }
            if let Some(sender) = subscription.sender.lock().as_ref() {
                // An instance without live receivers still counts as subscribed
                let _ = sender.send(ReceivedMessage::new(channel.clone(), text));
                receivers += 1;
            }
        }

        receivers
    }

    fn detach(&self, id: u64) {
        self.inner
            .state
            .lock()
            .subscriptions
            .retain(|subscription| subscription.id != id);
    }
}

/// One gateway instance's handle on a [`MemoryBrokerHub`]
#[derive(Debug)]
pub struct MemoryBroker {
    hub: MemoryBrokerHub,
    subscription: Arc<Subscription>,
    closed: AtomicBool,
}

impl MemoryBroker {
    /// The hub this handle is connected to
    pub fn hub(&self) -> &MemoryBrokerHub {
        &self.hub
    }

    fn ensure_open(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::unavailable("broker handle closed"));
        }
        self.hub.ensure_available()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, channel: &PubSubChannel, text: &str) -> BrokerResult<u32> {
        self.ensure_open()?;
        self.hub.inner.publish_calls.fetch_add(1, Ordering::SeqCst);

        let receivers = self.hub.deliver(channel, text);
        tracing::debug!(channel = %channel, receivers = receivers, "Published message");
        Ok(receivers)
    }

    async fn subscribe(
        &self,
        channels: &[PubSubChannel],
    ) -> BrokerResult<broadcast::Receiver<ReceivedMessage>> {
        self.ensure_open()?;

        let receiver = self
            .subscription
            .sender
            .lock()
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(BrokerError::ChannelClosed)?;

        let mut subscribed = self.subscription.channels.lock();
        for channel in channels {
            if subscribed.insert(channel.name()) {
                tracing::info!(channel = %channel, "Subscribed to channel");
            }
        }

        Ok(receiver)
    }

    async fn get(&self, key: &str) -> BrokerResult<Option<String>> {
        self.ensure_open()?;
        Ok(self.hub.value(key))
    }

    async fn set(&self, key: &str, value: i64) -> BrokerResult<()> {
        self.ensure_open()?;
        self.hub
            .inner
            .state
            .lock()
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn increment_and_get(&self, key: &str) -> BrokerResult<i64> {
        self.ensure_open()?;
        self.hub.add_to_counter(key, 1)
    }

    async fn decrement_and_get(&self, key: &str) -> BrokerResult<i64> {
        self.ensure_open()?;
        self.hub.add_to_counter(key, -1)
    }

    async fn health_check(&self) -> BrokerResult<()> {
        self.ensure_open()
    }

    async fn shutdown(&self) -> BrokerResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.hub.detach(self.subscription.id);
        // Dropping the sender closes every receiver of this instance
        self.subscription.sender.lock().take();
        Ok(())
    }
}
