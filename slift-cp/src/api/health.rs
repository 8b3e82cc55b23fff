//! Health check endpoint

use crate::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// GET /health - liveness probe with the configured environment pair
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = Utc::now() - state.startup_time;
    let config = state.orchestrator.config();
    Json(json!({
        "status": "ok",
        "service": "slift-cp",
        "version": env!("CARGO_PKG_VERSION"),
        "source": config.source,
        "target": config.target,
        "uptimeSecs": uptime.num_seconds(),
    }))
}
