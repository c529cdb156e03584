//! Gateway server setup
//!
//! Routes, startup wiring and the serve-until-drained loop.

mod handler;
mod health;
mod state;

pub use handler::socket_handler;
pub use health::{health_check, HealthResponse};
pub use state::GatewayState;

use crate::shutdown::{drain, DrainReport};
use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use chat_cache::{Broker, RedisBroker, RedisBrokerConfig, SharedBroker};
use chat_common::{AppConfig, AppError, AppResult, ConfigError, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// How long the HTTP server may take to stop after the drain finished
const SERVER_STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/socket", get(socket_handler))
        .route("/healthcheck", get(health_check))
}

/// Build the complete application
///
/// Cross-origin requests are accepted only from the configured origin.
pub fn create_app(state: GatewayState) -> AppResult<Router> {
    let origin = HeaderValue::from_str(&state.config().cors.allowed_origin)
        .map_err(|e| ConfigError::InvalidValue("CORS_ORIGIN", e.to_string()))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET]);

    Ok(create_router()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Connect to the Redis broker named in the configuration
pub async fn connect_broker(config: &AppConfig) -> AppResult<SharedBroker> {
    tracing::info!("Connecting to broker...");
    let broker = RedisBroker::connect(RedisBrokerConfig::from(&config.redis))
        .await
        .map_err(AppError::broker)?;
    broker.health_check().await.map_err(AppError::broker)?;
    tracing::info!("Broker reachable");
    Ok(Arc::new(broker))
}

/// Build `GatewayState`, seed the global count and start the subscribers
///
/// Any broker failure here is fatal: the instance must not accept clients
/// it cannot count or relay for.
pub async fn create_gateway_state(config: AppConfig, broker: SharedBroker) -> AppResult<GatewayState> {
    let state = GatewayState::new(config, broker);

    state
        .presence()
        .initialize()
        .await
        .map_err(AppError::broker)?;

    state
        .dispatcher()
        .start()
        .await
        .map_err(AppError::broker)?;

    Ok(state)
}

/// Bind the listening socket
pub async fn bind(config: &ServerConfig) -> AppResult<TcpListener> {
    let addr = config.address();
    TcpListener::bind(&addr).await.map_err(|e| AppError::Bind {
        addr,
        reason: e.to_string(),
    })
}

/// Serve until shutdown, then drain
///
/// Returns once the instance has reached `Closed`.
pub async fn serve(listener: TcpListener, state: GatewayState) -> AppResult<DrainReport> {
    let app = create_app(state.clone())?;

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(
            instance_id = %state.config().app.instance_id,
            "Gateway listening on ws://{}/socket",
            addr
        );
    }

    let signal_state = state.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal_state.shutdown().draining().await })
            .await
    });

    let early_exit = tokio::select! {
        result = &mut server => Some(result),
        () = state.shutdown().draining() => None,
    };

    if early_exit.is_some() {
        tracing::warn!("Server stopped unexpectedly, draining");
        state.shutdown().begin_draining();
    }

    let report = drain(
        state.shutdown(),
        state.presence(),
        state.connection_manager(),
        state.broker(),
    )
    .await;

    tracing::info!(
        reconciled = ?report.reconciled.map(chat_core::ConnectionCount::into_inner),
        timed_out = report.timed_out,
        "Drain finished"
    );

    let result = match early_exit {
        Some(result) => result,
        None => match tokio::time::timeout(SERVER_STOP_TIMEOUT, &mut server).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!("Server still holding connections, aborting");
                server.abort();
                Ok(Ok(()))
            }
        },
    };

    match result {
        Ok(Ok(())) => Ok(report),
        Ok(Err(e)) => Err(AppError::Server(e.to_string())),
        Err(e) => Err(AppError::internal(e)),
    }
}

/// Run the complete gateway with configuration
pub async fn run(config: AppConfig) -> AppResult<()> {
    let broker = connect_broker(&config).await?;
    let server_config = config.server.clone();
    let state = create_gateway_state(config, broker).await?;
    let listener = bind(&server_config).await?;

    let signal_state = state.clone();
    tokio::spawn(async move { signal_state.shutdown().listen_for_signals().await });

    serve(listener, state).await?;
    Ok(())
}
