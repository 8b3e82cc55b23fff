//! Health check endpoint

use crate::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// GET /health - liveness probe with uptime and environment identity
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = Utc::now() - state.startup_time;
    Json(json!({
        "status": "ok",
        "service": "slift-ai",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.store.environment(),
        "uptimeSecs": uptime.num_seconds(),
    }))
}
