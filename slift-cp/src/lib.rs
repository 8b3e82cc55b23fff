//! slift-cp - Content Promotion service
//!
//! Validates staged tracks against the quality gate and promotes qualifying
//! content from the source environment to the target environment, on a
//! schedule and on demand. Deployed only where a promotion source exists;
//! the binary refuses to start without a `[promotion]` configuration.

pub mod api;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use services::Orchestrator;
use slift_common::events::EventBus;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Batch orchestrator (owns the promoter and the environment pair)
    pub orchestrator: Arc<Orchestrator>,
    /// Event bus carrying promotion notifications
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, event_bus: EventBus) -> Self {
        Self {
            orchestrator,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/promotion", post(api::promotion))
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
