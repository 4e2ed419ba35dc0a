//! Health endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::server::AppState;

/// GET /health — liveness plus cache and usage counters.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cache_entries": state.relay.cache_len(),
        "pending_fetches": state.relay.pending_fetches(),
        "usage": state.metrics.snapshot(),
    }))
}
