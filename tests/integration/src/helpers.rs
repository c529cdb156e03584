//! Test helpers for integration tests
//!
//! Provides utilities for spawning gateway instances and driving WebSocket
//! clients against them.

use std::net::SocketAddr;
use std::time::Duration;

use crate::fixtures::{Frame, OutgoingFrame, COUNT_UPDATED};
use anyhow::{anyhow, Context, Result};
use chat_cache::{MemoryBrokerHub, SharedBroker};
use chat_common::AppConfig;
use chat_gateway::shutdown::DrainReport;
use chat_gateway::{create_gateway_state, serve, GatewayState};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long to wait for an expected frame
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Grace period used by test gateways
pub const TEST_GRACE_MS: u64 = 500;

/// A gateway instance serving on an ephemeral port
pub struct TestGateway {
    pub addr: SocketAddr,
    pub state: GatewayState,
    pub client: Client,
    handle: JoinHandle<chat_common::AppResult<DrainReport>>,
}

impl TestGateway {
    /// Start an instance attached to the shared hub
    pub async fn start(hub: &MemoryBrokerHub) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = test_config(addr.port())?;
        let broker: SharedBroker = Arc::new(hub.connect());
        let state = create_gateway_state(config, broker).await?;

        let server_state = state.clone();
        let handle = tokio::spawn(async move { serve(listener, server_state).await });

        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;

        Ok(Self {
            addr,
            state,
            client,
            handle,
        })
    }

    /// Get base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn socket_url(&self) -> String {
        format!("ws://{}/socket", self.addr)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    /// Open a WebSocket client without waiting for anything
    pub async fn connect(&self) -> Result<TestClient> {
        let (stream, _) = connect_async(self.socket_url()).await?;
        Ok(TestClient { stream })
    }

    /// Open a WebSocket client and wait until it has seen `expected_count`
    pub async fn connect_and_count(&self, expected_count: i64) -> Result<TestClient> {
        let mut client = self.connect().await?;
        client.wait_for_count(expected_count).await?;
        Ok(client)
    }

    pub fn local_count(&self) -> u64 {
        self.state.presence().local_count()
    }

    /// Wait until exactly `expected` sessions are attached for fan-out
    pub async fn wait_for_sessions(&self, expected: usize) -> Result<()> {
        let deadline = tokio::time::Instant::now() + FRAME_TIMEOUT;
        while self.state.connection_manager().connection_count() != expected {
            if tokio::time::Instant::now() >= deadline {
                return Err(anyhow!(
                    "{} sessions attached, expected {expected}",
                    self.state.connection_manager().connection_count()
                ));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }

    /// Trigger a graceful shutdown and wait for the drain to finish
    pub async fn shutdown(self) -> Result<DrainReport> {
        self.state.shutdown().begin_draining();
        let report = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .context("gateway did not stop")???;
        Ok(report)
    }
}

/// Configuration for a gateway listening on `port`
pub fn test_config(port: u16) -> Result<AppConfig> {
    let grace = TEST_GRACE_MS.to_string();
    let port = port.to_string();

    AppConfig::from_lookup(|name| match name {
        "PORT" => Some(port.clone()),
        "HOST" => Some("127.0.0.1".to_string()),
        "REDIS_URL" => Some("redis://unused".to_string()),
        "SHUTDOWN_GRACE_MS" => Some(grace.clone()),
        _ => None,
    })
    .map_err(|e| anyhow!("Config error: {e}"))
}

/// A WebSocket client attached to one gateway
pub struct TestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn send_frame(&mut self, frame: &OutgoingFrame) -> Result<()> {
        let text = serde_json::to_string(frame)?;
        self.send_raw(&text).await
    }

    pub async fn send_message(&mut self, text: &str) -> Result<()> {
        self.send_frame(&OutgoingFrame::message(text)).await
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Next frame from the gateway, or `None` once the socket closed
    pub async fn next_frame_within(&mut self, wait: Duration) -> Result<Option<Frame>> {
        loop {
            let msg = match tokio::time::timeout(wait, self.stream.next()).await {
                Ok(msg) => msg,
                Err(_) => return Err(anyhow!("no frame within {wait:?}")),
            };

            match msg {
                Some(Ok(Message::Text(text))) => return Ok(Some(serde_json::from_str(&text)?)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Skip frames until one named `event` arrives and decode its payload
    pub async fn expect<T: DeserializeOwned>(&mut self, event: &str) -> Result<T> {
        loop {
            let frame = self
                .next_frame_within(FRAME_TIMEOUT)
                .await?
                .ok_or_else(|| anyhow!("socket closed while waiting for {event}"))?;
            if frame.event == event {
                return Ok(serde_json::from_value(frame.data)?);
            }
        }
    }

    /// Skip frames until a count update carrying `expected` arrives
    pub async fn wait_for_count(&mut self, expected: i64) -> Result<()> {
        let expected = expected.to_string();
        loop {
            let update: crate::fixtures::CountUpdate = self.expect(COUNT_UPDATED).await?;
            if update.count == expected {
                return Ok(());
            }
        }
    }

    /// Assert nothing named `event` arrives within `wait`
    pub async fn expect_none(&mut self, event: &str, wait: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            match self.next_frame_within(remaining).await {
                Ok(Some(frame)) if frame.event == event => {
                    return Err(anyhow!("unexpected {event}: {}", frame.data));
                }
                Ok(Some(_)) => {}
                Ok(None) => return Err(anyhow!("socket closed")),
                Err(_) => return Ok(()),
            }
        }
    }

    /// Wait until the gateway closes the socket
    pub async fn expect_closed(&mut self) -> Result<()> {
        loop {
            match tokio::time::timeout(FRAME_TIMEOUT, self.stream.next()).await {
                Err(_) => return Err(anyhow!("socket still open after {FRAME_TIMEOUT:?}")),
                Ok(Some(Ok(Message::Close(_)) | Err(_)) | None) => return Ok(()),
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
