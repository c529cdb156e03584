//! WebSocket handler
//!
//! One inbound loop per client connection plus a send task draining the
//! connection's outbound queue.

use crate::connection::Connection;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::server::GatewayState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Channel buffer size for outgoing events
const MESSAGE_BUFFER_SIZE: usize = 100;

/// How long a closing connection may take to flush queued events
const SEND_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket upgrade handler
///
/// Refuses new connections once shutdown has begun.
pub async fn socket_handler(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    if !state.shutdown().state().is_running() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Shutting down").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Handle an upgraded WebSocket connection
async fn handle_socket(state: GatewayState, socket: WebSocket) {
    let session_id = Connection::generate_id();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(MESSAGE_BUFFER_SIZE);

    // Registered before counting so this client sees its own count update
    let connection = state
        .connection_manager()
        .add_connection(session_id.clone(), tx);

    tracing::info!(session_id = %session_id, "WebSocket connection established");

    // An uncounted session stays open but must not be decremented later
    let counted = match state.presence().on_local_connect().await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to count connection");
            false
        }
    };

    let (mut ws_sink, mut ws_stream) = socket.split();

    let session_id_send = session_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match event.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize event");
                    continue;
                }
            };
            if ws_sink.send(Message::Text(json)).await.is_err() {
                tracing::debug!(session_id = %session_id_send, "Failed to write to WebSocket");
                break;
            }
        }

        // Close the WebSocket when channel is closed
        let _ = ws_sink.close().await;
    });
    let mut send_finished = false;

    let mut shutdown = state.shutdown().subscribe();

    loop {
        if shutdown.borrow_and_update().closes_sockets() {
            tracing::debug!(session_id = %session_id, "Closing connection for shutdown");
            break;
        }

        tokio::select! {
            msg = ws_stream.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_text_message(&state, &connection, &text).await,
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(session_id = %session_id, "Client closed connection");
                    break;
                }
                Some(Ok(_)) => {
                    // Binary frames are ignored; ping/pong is handled by axum
                }
                Some(Err(e)) => {
                    tracing::warn!(session_id = %session_id, error = %e, "WebSocket error");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut send_task => {
                send_finished = true;
                break;
            }
        }
    }

    cleanup_connection(&state, &session_id, counted).await;
    drop(connection);

    if !send_finished && tokio::time::timeout(SEND_DRAIN_TIMEOUT, &mut send_task).await.is_err() {
        tracing::debug!(session_id = %session_id, "Send task did not finish, aborting");
        send_task.abort();
    }
}

/// Handle a text frame from the client
async fn handle_text_message(state: &GatewayState, connection: &Arc<Connection>, text: &str) {
    let event = match ClientEvent::from_json(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(
                session_id = %connection.session_id(),
                error = %e,
                "Ignoring malformed frame"
            );
            return;
        }
    };

    match event {
        ClientEvent::NewMessage { message } => {
            if let Err(e) = state.relay().on_local_message(message.as_deref()).await {
                tracing::warn!(
                    session_id = %connection.session_id(),
                    error = %e,
                    "Failed to relay message"
                );

                let failed =
                    ServerEvent::delivery_failed(message.as_deref().unwrap_or_default(), e.code());
                if connection.try_send(failed).is_err() {
                    tracing::debug!(
                        session_id = %connection.session_id(),
                        "Could not report delivery failure"
                    );
                }
            }
        }
        ClientEvent::Unknown(name) => {
            tracing::debug!(
                session_id = %connection.session_id(),
                event = %name,
                "Ignoring unknown event"
            );
        }
    }
}

/// Account for the disconnect, then drop the connection from fan-out
async fn cleanup_connection(state: &GatewayState, session_id: &str, counted: bool) {
    if !counted {
        tracing::debug!(session_id = %session_id, "Connection was never counted");
    } else if let Err(e) = state.presence().on_local_disconnect().await {
        tracing::warn!(session_id = %session_id, error = %e, "Failed to count disconnect");
    }

    state.connection_manager().remove_connection(session_id);

    tracing::info!(session_id = %session_id, "Connection closed");
}
