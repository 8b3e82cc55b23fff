//! Track browse endpoint for external consumers (front-end, tooling)

use crate::{ApiError, ApiResult, AppState};
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use slift_common::model::TrackStatus;

const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    pub status: Option<String>,
    pub genre: Option<String>,
    pub limit: Option<i64>,
}

/// GET /tracks?status=&genre=&limit= - browse this environment's records
pub async fn list_tracks(
    State(state): State<AppState>,
    Query(query): Query<TrackQuery>,
) -> ApiResult<Json<Value>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 500);

    let tracks = match (&query.status, &query.genre) {
        (Some(status), _) => {
            let status = TrackStatus::parse(status)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown status '{}'", status)))?;
            state.store.list_by_status(status, limit).await?
        }
        (None, Some(genre)) => state.store.list_by_genre(genre, limit).await?,
        (None, None) => state.store.list_recent(limit).await?,
    };

    Ok(Json(json!({
        "count": tracks.len(),
        "tracks": tracks,
    })))
}
