//! slift-ai - Audio Ingest service
//!
//! Owns one environment's upload area: validates newly uploaded audio
//! objects, copies them into the managed media area, writes the initial
//! track record, and enriches metadata from embedded tags.

pub mod api;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use slift_common::config::PipelineConfig;
use slift_common::events::EventBus;
use slift_common::store::{BlobStore, MetadataStore};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Immutable pipeline configuration, resolved once at startup
    pub config: Arc<PipelineConfig>,
    /// This environment's metadata store
    pub store: MetadataStore,
    /// This environment's managed media area
    pub media: BlobStore,
    /// This environment's upload drop area
    pub uploads: BlobStore,
    /// Event bus for pipeline notifications
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Arc<PipelineConfig>,
        store: MetadataStore,
        media: BlobStore,
        uploads: BlobStore,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            store,
            media,
            uploads,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/ingest/scan", post(api::ingest_scan))
        .route("/ingest/object", post(api::ingest_object))
        .route("/enrich", post(api::enrich_track))
        .route("/tracks", get(api::list_tracks))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
