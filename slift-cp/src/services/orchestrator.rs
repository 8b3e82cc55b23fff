//! Promotion orchestrator
//!
//! Selects bounded batches of eligible tracks and drives the promoter over
//! them. Candidates are started oldest-first so no track starves; per-track
//! failures are isolated and never roll back promotions that already
//! succeeded in the same batch.

use crate::services::{EnvironmentHandles, PromotionMode, Promoter, PromotionReport, Validator};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use slift_common::config::PromotionConfig;
use slift_common::events::{EventBus, PipelineEvent};
use slift_common::model::{BatchSummary, PromotionOutcome, Verdict};
use slift_common::Result;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How far past the batch size the candidate scan looks, so the summary can
/// report the backlog
const SCAN_LIMIT: i64 = 100;

/// One promotion candidate surfaced by the scan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub track_id: Uuid,
    pub title: String,
    pub created_date: DateTime<Utc>,
    pub age_hours: i64,
    pub file_size: u64,
    pub duration: u32,
}

/// Batch orchestrator over one promoter
pub struct Orchestrator {
    promoter: Arc<Promoter>,
    source: EnvironmentHandles,
    validator: Validator,
    config: PromotionConfig,
    event_bus: EventBus,
}

impl Orchestrator {
    pub fn new(
        promoter: Arc<Promoter>,
        source: EnvironmentHandles,
        validator: Validator,
        config: PromotionConfig,
        event_bus: EventBus,
    ) -> Self {
        Self {
            promoter,
            source,
            validator,
            config,
            event_bus,
        }
    }

    pub fn config(&self) -> &PromotionConfig {
        &self.config
    }

    /// Scan the source store for promotion-ready tracks, oldest first.
    /// Applies the full automatic quality gate so ineligible records (fresh,
    /// unenriched, blobless) are excluded rather than burned as failures.
    pub async fn scan_candidates(&self) -> Result<Vec<Candidate>> {
        let records = self.source.store.list_promotable(SCAN_LIMIT).await?;
        let mut candidates = Vec::new();

        for record in records {
            let verdict = self
                .validator
                .validate(&record, PromotionMode::Automatic)
                .await;
            if !verdict.valid {
                tracing::debug!(
                    track_id = %record.id,
                    "Candidate not yet eligible: {:?}",
                    verdict
                        .checks
                        .iter()
                        .filter(|c| !c.passed)
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                );
                continue;
            }
            let age = Utc::now() - record.created_date;
            candidates.push(Candidate {
                track_id: record.id,
                title: record.title.clone(),
                created_date: record.created_date,
                age_hours: age.num_hours(),
                file_size: record.file_size,
                duration: record.duration,
            });
        }

        tracing::info!("Found {} promotion candidates", candidates.len());
        Ok(candidates)
    }

    /// Run one batch: take up to `max_promotions` candidates, promote with
    /// bounded parallelism and a per-track timeout, aggregate the outcomes.
    pub async fn run_batch(&self, max_promotions: usize) -> BatchSummary {
        let started_at = Utc::now();
        tracing::info!(max_promotions = max_promotions, "Starting batch promotion");

        let candidates = match self.scan_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!("Candidate scan failed: {}", e);
                let summary = BatchSummary {
                    started_at,
                    ended_at: Utc::now(),
                    max_promotions,
                    scanned: 0,
                    promoted: 0,
                    failed: 0,
                    skipped: 0,
                    outcomes: Vec::new(),
                    error: Some(e.to_string()),
                };
                self.finish_batch(&summary);
                return summary;
            }
        };

        let scanned = candidates.len();
        let selected: Vec<Candidate> = candidates.into_iter().take(max_promotions).collect();
        let skipped = scanned - selected.len();
        let track_timeout = Duration::from_secs(self.config.track_timeout_secs);

        // `buffered` starts futures in candidate order and yields results in
        // that same order, preserving oldest-first processing under bounded
        // parallelism
        let outcomes: Vec<PromotionOutcome> = stream::iter(selected)
            .map(|candidate| {
                let promoter = Arc::clone(&self.promoter);
                async move {
                    let attempt = tokio::time::timeout(
                        track_timeout,
                        promoter.promote(candidate.track_id, PromotionMode::Automatic),
                    )
                    .await;
                    flatten_attempt(&promoter, &candidate, attempt)
                }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let promoted = outcomes.iter().filter(|o| o.succeeded()).count();
        let failed = outcomes.len() - promoted;

        let summary = BatchSummary {
            started_at,
            ended_at: Utc::now(),
            max_promotions,
            scanned,
            promoted,
            failed,
            skipped,
            outcomes,
            error: None,
        };
        self.finish_batch(&summary);
        summary
    }

    /// Manual promotion of one track; the age gate bypass is policy-driven
    pub async fn promote_one(&self, track_id: Uuid) -> Result<PromotionReport> {
        self.promoter.promote(track_id, PromotionMode::Manual).await
    }

    /// Verdict only, no side effects
    pub async fn validate_one(&self, track_id: Uuid) -> Result<Verdict> {
        self.promoter.validate_track(track_id).await
    }

    fn finish_batch(&self, summary: &BatchSummary) {
        tracing::info!(
            scanned = summary.scanned,
            promoted = summary.promoted,
            failed = summary.failed,
            skipped = summary.skipped,
            "Batch promotion finished"
        );
        self.event_bus.emit_lossy(PipelineEvent::BatchCompleted {
            summary: summary.clone(),
            timestamp: Utc::now(),
        });
    }
}

/// Collapse the timeout/error layers around one promotion attempt into a
/// plain outcome so a single bad track cannot abort the batch
fn flatten_attempt(
    promoter: &Promoter,
    candidate: &Candidate,
    attempt: std::result::Result<Result<PromotionReport>, tokio::time::error::Elapsed>,
) -> PromotionOutcome {
    let error = match attempt {
        Ok(Ok(report)) => return report.outcome,
        Ok(Err(e)) => e.to_string(),
        Err(_) => "promotion timed out".to_string(),
    };
    tracing::error!(track_id = %candidate.track_id, "Promotion attempt failed: {}", error);
    PromotionOutcome {
        track_id: candidate.track_id,
        source_environment: promoter.source_environment().to_string(),
        target_environment: promoter.target_environment().to_string(),
        files_copied: Vec::new(),
        record_created: false,
        promotion_date: Utc::now(),
        error: Some(error),
    }
}
