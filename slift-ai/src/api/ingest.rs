//! Ingestion and enrichment endpoints
//!
//! `POST /ingest/object` is the single-object trigger (the payload a storage
//! event delivers); `POST /ingest/scan` sweeps the whole upload area on
//! demand; `POST /enrich` runs the second-pass metadata extraction.

use crate::services::{EnrichmentHandler, IngestHandler, IngestOutcome, UploadScanner};
use crate::{ApiResult, AppState};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct IngestObjectRequest {
    /// Object key within the upload area, possibly transport-escaped
    pub key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichRequest {
    pub track_id: Uuid,
    /// Optional explicit blob key; defaults to the track's audio object
    pub blob_key: Option<String>,
}

fn ingest_handler(state: &AppState) -> IngestHandler {
    IngestHandler::new(
        state.config.ingest.clone(),
        state.store.clone(),
        state.media.clone(),
        state.uploads.clone(),
        state.event_bus.clone(),
    )
}

/// POST /ingest/object - ingest one uploaded object
pub async fn ingest_object(
    State(state): State<AppState>,
    Json(request): Json<IngestObjectRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = ingest_handler(&state).handle_object(&request.key).await?;

    Ok(Json(match outcome {
        IngestOutcome::Ingested(record) => json!({
            "status": "ingested",
            "track": record,
        }),
        IngestOutcome::Skipped { key, reason } => json!({
            "status": "skipped",
            "key": key,
            "reason": reason,
        }),
    }))
}

/// POST /ingest/scan - sweep the upload area now
pub async fn ingest_scan(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let scanner = UploadScanner::new();
    let summary = ingest_handler(&state).sweep(&scanner).await?;
    Ok(Json(json!({
        "status": "completed",
        "summary": summary,
    })))
}

/// POST /enrich - extract embedded metadata for one track
pub async fn enrich_track(
    State(state): State<AppState>,
    Json(request): Json<EnrichRequest>,
) -> ApiResult<Json<Value>> {
    let handler = EnrichmentHandler::new(
        state.store.clone(),
        state.media.clone(),
        state.event_bus.clone(),
    );
    let record = handler.enrich(request.track_id, request.blob_key).await?;
    Ok(Json(json!({
        "status": "enriched",
        "track": record,
    })))
}
