//! Health check endpoint

use crate::server::GatewayState;
use axum::{extract::State, Json};
use serde::Serialize;

/// `{"status": "ok", "port": <port>}`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub port: u16,
}

/// Report liveness and which instance answered
///
/// Does not touch the broker.
pub async fn health_check(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        port: state.config().server.port,
    })
}
