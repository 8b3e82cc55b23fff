//! Promotion action endpoint
//!
//! `POST /promotion` dispatches on the `action` field:
//! - `promote_track` — manual single-track promotion (age gate per policy)
//! - `batch_promotion` — run a batch now, synchronously
//! - `validate_track` — verdict only, no side effects
//!
//! Synchronous callers get the full verdict detail so an operator can see
//! exactly which gate failed; scheduled runs surface the same information
//! through notifications and logs.

use crate::{ApiResult, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PromotionRequest {
    #[serde(rename_all = "camelCase")]
    PromoteTrack { track_id: Uuid },
    #[serde(rename_all = "camelCase")]
    BatchPromotion { max_promotions: Option<usize> },
    #[serde(rename_all = "camelCase")]
    ValidateTrack { track_id: Uuid },
}

/// POST /promotion - dispatch a promotion action
pub async fn promotion(
    State(state): State<AppState>,
    Json(request): Json<PromotionRequest>,
) -> ApiResult<Response> {
    match request {
        PromotionRequest::PromoteTrack { track_id } => {
            let report = state.orchestrator.promote_one(track_id).await?;

            // Success first: an already-promoted no-op outranks whatever the
            // courtesy verdict says about the (now terminal) source record
            let response = if report.outcome.succeeded() {
                (
                    StatusCode::OK,
                    Json(json!({
                        "message": if report.outcome.record_created {
                            "Content promoted successfully"
                        } else {
                            "Content was already promoted"
                        },
                        "trackId": track_id,
                        "validation": report.verdict,
                        "promotion": report.outcome,
                    })),
                )
            } else if !report.verdict.valid {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "message": "Content validation failed",
                        "trackId": track_id,
                        "validation": report.verdict,
                        "promotion": report.outcome,
                    })),
                )
            } else {
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({
                        "message": "Promotion failed",
                        "trackId": track_id,
                        "validation": report.verdict,
                        "promotion": report.outcome,
                    })),
                )
            };
            Ok(response.into_response())
        }

        PromotionRequest::BatchPromotion { max_promotions } => {
            let max = max_promotions.unwrap_or(state.orchestrator.config().max_promotions);
            let summary = state.orchestrator.run_batch(max).await;
            Ok((
                StatusCode::OK,
                Json(json!({
                    "message": "Batch promotion completed",
                    "summary": summary,
                })),
            )
                .into_response())
        }

        PromotionRequest::ValidateTrack { track_id } => {
            let verdict = state.orchestrator.validate_one(track_id).await?;
            Ok((
                StatusCode::OK,
                Json(json!({
                    "message": if verdict.valid {
                        "Content validation passed - ready for promotion"
                    } else {
                        "Content validation failed"
                    },
                    "trackId": track_id,
                    "readyForPromotion": verdict.valid,
                    "validation": verdict,
                })),
            )
                .into_response())
        }
    }
}
