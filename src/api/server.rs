//! Axum server assembly and startup.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::metrics::UsageMetrics;
use crate::relay::RelayService;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The cache-aside relay core.
    pub relay: Arc<RelayService>,
    /// Process-wide usage counters, surfaced at `/health`.
    pub metrics: Arc<UsageMetrics>,
}

impl AppState {
    pub fn new(relay: Arc<RelayService>, metrics: Arc<UsageMetrics>) -> Self {
        Self { relay, metrics }
    }
}

/// Build the axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/question", post(super::routes::question::post_question))
        .route("/health", get(super::routes::health::get_health))
        // Questions are short; reject oversized payloads before any JSON work.
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind the listener and serve until the process is stopped.
pub async fn start_server(
    config: &ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("parakeet listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
