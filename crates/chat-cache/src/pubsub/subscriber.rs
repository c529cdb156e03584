//! Redis Pub/Sub subscriber.
//!
//! Owns a dedicated pub/sub connection and fans every received message out
//! to in-process receivers. The connection is re-established after errors
//! and previously subscribed channels are restored.

use crate::error::{BrokerError, BrokerResult};
use crate::pool::redact_url;
use crate::pubsub::PubSubChannel;
use futures_util::StreamExt;
use redis::Client;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

type SubscribeReply = oneshot::Sender<BrokerResult<()>>;

/// Message received from a broker channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Channel the message was received on
    pub channel: PubSubChannel,
    /// Raw payload
    pub payload: String,
}

impl ReceivedMessage {
    pub fn new(channel: PubSubChannel, payload: impl Into<String>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    fn from_redis(channel_name: &str, payload: String) -> Self {
        Self::new(PubSubChannel::parse(channel_name), payload)
    }
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Redis connection URL
    pub redis_url: String,
    /// Channel buffer size for broadcast
    pub broadcast_buffer: usize,
    /// Reconnection delay in milliseconds
    pub reconnect_delay_ms: u64,
    /// How long a subscribe call waits for the server to confirm
    pub subscribe_timeout_ms: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            broadcast_buffer: 1024,
            reconnect_delay_ms: 1000,
            subscribe_timeout_ms: 5000,
        }
    }
}

/// Commands for subscription management
#[derive(Debug)]
enum SubscriberCommand {
    Subscribe(Vec<String>, SubscribeReply),
    Shutdown,
}

/// Redis Pub/Sub subscriber
pub struct Subscriber {
    /// Broadcast sender for messages
    broadcast_tx: broadcast::Sender<ReceivedMessage>,
    /// Control channel for subscription management
    control_tx: mpsc::Sender<SubscriberCommand>,
    subscribe_timeout: Duration,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("receivers", &self.broadcast_tx.receiver_count())
            .finish()
    }
}

impl Subscriber {
    /// Create a new subscriber and start the background listener
    pub fn new(config: SubscriberConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_buffer);
        let (control_tx, control_rx) = mpsc::channel(32);
        let subscribed = Arc::new(RwLock::new(HashSet::new()));
        let subscribe_timeout = Duration::from_millis(config.subscribe_timeout_ms);

        tokio::spawn(Self::listener_loop(
            config,
            subscribed,
            broadcast_tx.clone(),
            control_rx,
        ));

        Self {
            broadcast_tx,
            control_tx,
            subscribe_timeout,
        }
    }

    /// Background listener loop
    async fn listener_loop(
        config: SubscriberConfig,
        subscribed: Arc<RwLock<HashSet<String>>>,
        broadcast_tx: broadcast::Sender<ReceivedMessage>,
        mut control_rx: mpsc::Receiver<SubscriberCommand>,
    ) {
        loop {
            match Self::run_listener(&config, &subscribed, &broadcast_tx, &mut control_rx).await {
                Ok(true) => {
                    tracing::info!("Subscriber shutting down");
                    break;
                }
                Ok(false) => {
                    tracing::warn!("Pub/Sub stream ended, reconnecting");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Subscriber error, reconnecting");
                }
            }

            let reconnect = Duration::from_millis(config.reconnect_delay_ms);
            if Self::wait_disconnected(reconnect, &mut control_rx).await {
                tracing::info!("Subscriber shutting down");
                break;
            }
        }
    }

    /// Sit out the reconnect delay, refusing subscriptions meanwhile
    ///
    /// Returns true if shutdown was requested.
    async fn wait_disconnected(
        delay: Duration,
        control_rx: &mut mpsc::Receiver<SubscriberCommand>,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return false,
                cmd = control_rx.recv() => match cmd {
                    Some(SubscriberCommand::Subscribe(channels, reply)) => {
                        tracing::warn!(channels = ?channels, "Subscribe refused while disconnected");
                        let _ = reply.send(Err(BrokerError::unavailable("subscriber is not connected")));
                    }
                    Some(SubscriberCommand::Shutdown) | None => return true,
                },
            }
        }
    }

    /// Run the listener until error or shutdown; `Ok(true)` means shut down
    async fn run_listener(
        config: &SubscriberConfig,
        subscribed: &Arc<RwLock<HashSet<String>>>,
        broadcast_tx: &broadcast::Sender<ReceivedMessage>,
        control_rx: &mut mpsc::Receiver<SubscriberCommand>,
    ) -> BrokerResult<bool> {
        let client = Client::open(config.redis_url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;

        // Restore subscriptions from before a reconnect
        {
            let channels = subscribed.read().await;
            for channel in channels.iter() {
                pubsub.subscribe(channel).await?;
            }
        }

        tracing::info!(url = %redact_url(&config.redis_url), "Subscriber connected to Redis");

        let mut stream = pubsub.on_message();

        loop {
            tokio::select! {
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        return Ok(false);
                    };

                    let channel_name = msg.get_channel_name().to_string();
                    let payload: String = match msg.get_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::warn!(channel = %channel_name, error = %e, "Dropping non-text payload");
                            continue;
                        }
                    };

                    tracing::trace!(channel = %channel_name, "Received Pub/Sub message");

                    // No receivers is not an error
                    let _ = broadcast_tx.send(ReceivedMessage::from_redis(&channel_name, payload));
                }

                cmd = control_rx.recv() => {
                    match cmd {
                        Some(SubscriberCommand::Subscribe(channels, reply)) => {
                            // Need to drop stream to access pubsub
                            drop(stream);
                            let mut result = Ok(());
                            for channel in &channels {
                                if let Err(e) = pubsub.subscribe(channel).await {
                                    tracing::error!(channel = %channel, error = %e, "Error subscribing to channel");
                                    result = Err(e.into());
                                    break;
                                }
                                subscribed.write().await.insert(channel.clone());
                                tracing::info!(channel = %channel, "Subscribed to channel");
                            }
                            // The caller may have timed out
                            let _ = reply.send(result);
                            stream = pubsub.on_message();
                        }
                        Some(SubscriberCommand::Shutdown) | None => {
                            return Ok(true);
                        }
                    }
                }
            }
        }
    }

    /// Subscribe to channels
    ///
    /// Resolves once the server has confirmed every channel, or with the
    /// first failure. Fails fast while the listener is disconnected.
    pub async fn subscribe(&self, channels: &[PubSubChannel]) -> BrokerResult<()> {
        let channel_names: Vec<String> = channels.iter().map(PubSubChannel::name).collect();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.control_tx
            .send(SubscriberCommand::Subscribe(channel_names, reply_tx))
            .await
            .map_err(|_| BrokerError::ChannelClosed)?;

        match tokio::time::timeout(self.subscribe_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BrokerError::ChannelClosed),
            Err(_) => Err(BrokerError::unavailable("subscribe was not confirmed in time")),
        }
    }

    /// Get a receiver for broadcast messages
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<ReceivedMessage> {
        self.broadcast_tx.subscribe()
    }

    /// Shutdown the subscriber and release its connection
    pub async fn shutdown(&self) -> BrokerResult<()> {
        self.control_tx
            .send(SubscriberCommand::Shutdown)
            .await
            .map_err(|_| BrokerError::ChannelClosed)
    }
}

/// Builder for subscriber
pub struct SubscriberBuilder {
    config: SubscriberConfig,
}

impl SubscriberBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: SubscriberConfig::default(),
        }
    }

    /// Set Redis URL
    #[must_use]
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.config.redis_url = url.into();
        self
    }

    /// Set broadcast buffer size
    #[must_use]
    pub fn broadcast_buffer(mut self, size: usize) -> Self {
        self.config.broadcast_buffer = size;
        self
    }

    /// Set reconnection delay
    #[must_use]
    pub fn reconnect_delay_ms(mut self, delay: u64) -> Self {
        self.config.reconnect_delay_ms = delay;
        self
    }

    /// Set how long a subscribe call waits for confirmation
    #[must_use]
    pub fn subscribe_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.subscribe_timeout_ms = timeout;
        self
    }

    /// Build and start the subscriber
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn build(self) -> Subscriber {
        Subscriber::new(self.config)
    }
}

impl Default for SubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}
