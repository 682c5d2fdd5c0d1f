//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::BotError;
use crate::server::handlers::{
    deployments_handler, event_handler, health_handler, outbox_handler, ping_handler,
    stats_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the service router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/ping", get(ping_handler))
        .route("/version", get(version_handler))
        // Chat transport
        .route("/v1/events", post(event_handler))
        .route("/v1/owners/{owner}/outbox", get(outbox_handler))
        // Read-only views
        .route("/stats", get(stats_handler))
        .route("/deployments", get(deployments_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), BotError>>, BotError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| BotError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| BotError::ServerError(e.to_string()))
    });

    Ok(handle)
}
