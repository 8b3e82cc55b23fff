//! Content promoter
//!
//! Executes one source → target promotion: validate, idempotence check
//! against the target store, all-or-nothing blob copy, target record write,
//! source status transition, and a notification regardless of outcome.
//!
//! The target metadata record is written only after every blob copy
//! succeeded; a partial copy leaves harmless garbage that the idempotent
//! re-copy on the next attempt overwrites.

use crate::services::{EnvironmentHandles, PromotionMode, ValidationPolicy, Validator};
use chrono::Utc;
use serde::Serialize;
use slift_common::events::{EventBus, PipelineEvent};
use slift_common::model::{CopiedFile, PromotionOutcome, TrackRecord, Verdict};
use slift_common::{Error, Result};
use uuid::Uuid;

/// Verdict plus outcome for one promotion attempt, as returned to callers.
/// The outcome alone is what gets logged and published.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionReport {
    pub verdict: Verdict,
    pub outcome: PromotionOutcome,
}

/// Promoter for one fixed source → target environment pair
pub struct Promoter {
    source: EnvironmentHandles,
    target: EnvironmentHandles,
    validator: Validator,
    event_bus: EventBus,
}

impl Promoter {
    pub fn new(
        source: EnvironmentHandles,
        target: EnvironmentHandles,
        policy: ValidationPolicy,
        event_bus: EventBus,
    ) -> Self {
        let validator = Validator::new(source.blobs.clone(), policy);
        Self {
            source,
            target,
            validator,
            event_bus,
        }
    }

    pub fn source_environment(&self) -> &str {
        &self.source.name
    }

    pub fn target_environment(&self) -> &str {
        &self.target.name
    }

    /// Validate without side effects
    pub async fn validate_track(&self, track_id: Uuid) -> Result<Verdict> {
        let record = self.load_source(track_id).await?;
        Ok(self
            .validator
            .validate(&record, PromotionMode::Automatic)
            .await)
    }

    /// Promote one track. Safe to call speculatively: an invalid record
    /// produces a failure outcome with no side effects, and an
    /// already-promoted track is a success no-op with `record_created =
    /// false`.
    pub async fn promote(&self, track_id: Uuid, mode: PromotionMode) -> Result<PromotionReport> {
        let record = self.load_source(track_id).await?;

        // Idempotence first: the target store is the source of truth for
        // "already promoted". A re-invocation (including one whose source
        // record is already marked promoted) converges instead of failing
        // or duplicating.
        if self.target.store.record_exists(track_id).await? {
            tracing::info!(
                track_id = %track_id,
                target = %self.target.name,
                "Target record already exists; promotion is a no-op"
            );
            let verdict = self.validator.validate(&record, mode).await;
            let outcome = PromotionOutcome {
                track_id,
                source_environment: self.source.name.clone(),
                target_environment: self.target.name.clone(),
                files_copied: Vec::new(),
                record_created: false,
                promotion_date: Utc::now(),
                error: None,
            };
            return Ok(self.publish(verdict, outcome));
        }

        let verdict = self.validator.validate(&record, mode).await;
        if !verdict.valid {
            let failed: Vec<&str> = verdict
                .checks
                .iter()
                .filter(|c| !c.passed)
                .map(|c| c.name.as_str())
                .collect();
            let outcome =
                self.failure_outcome(track_id, format!("validation failed: {}", failed.join(", ")));
            return Ok(self.publish(verdict, outcome));
        }

        // Copy every blob under the track prefix; any failure aborts before
        // the target record write
        let (copied, copy_error) = self.copy_track_blobs(&record).await;
        if let Some(error) = copy_error {
            let mut outcome = self.failure_outcome(track_id, error);
            outcome.files_copied = copied;
            return Ok(self.publish(verdict, outcome));
        }

        let promotion_date = Utc::now();
        let target_record = self.build_target_record(&record, &promotion_date);
        if let Err(e) = self.target.store.put(&target_record).await {
            let mut outcome =
                self.failure_outcome(track_id, format!("target record write failed: {}", e));
            outcome.files_copied = copied;
            return Ok(self.publish(verdict, outcome));
        }

        if let Err(e) = self
            .source
            .store
            .mark_promoted(record.id, &record.created_date, &promotion_date)
            .await
        {
            // Target state is complete; the next attempt converges via the
            // idempotence check, so report the failure for retry
            let mut outcome = self.failure_outcome(
                track_id,
                format!("source status update failed after target write: {}", e),
            );
            outcome.files_copied = copied;
            return Ok(self.publish(verdict, outcome));
        }

        let outcome = PromotionOutcome {
            track_id,
            source_environment: self.source.name.clone(),
            target_environment: self.target.name.clone(),
            files_copied: copied,
            record_created: true,
            promotion_date,
            error: None,
        };
        Ok(self.publish(verdict, outcome))
    }

    async fn load_source(&self, track_id: Uuid) -> Result<TrackRecord> {
        self.source
            .store
            .get(track_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "track {} in environment '{}'",
                    track_id, self.source.name
                ))
            })
    }

    /// Copy the track's blobs, reporting what landed and the first error
    async fn copy_track_blobs(&self, record: &TrackRecord) -> (Vec<CopiedFile>, Option<String>) {
        let keys = match self.source.blobs.list_prefix(&record.blob_prefix()) {
            Ok(keys) => keys,
            Err(e) => return (Vec::new(), Some(e.to_string())),
        };
        if keys.is_empty() {
            return (
                Vec::new(),
                Some(format!("no source objects under {}", record.blob_prefix())),
            );
        }

        let mut copied = Vec::new();
        for key in keys {
            match self.source.blobs.copy_to(&self.target.blobs, &key).await {
                Ok(size) => {
                    tracing::debug!(key = %key, size = size, "Copied blob to target");
                    copied.push(CopiedFile {
                        source_key: key.clone(),
                        dest_key: key,
                        size,
                    });
                }
                Err(e) => {
                    tracing::error!(key = %key, "Blob copy failed: {}", e);
                    return (copied, Some(e.to_string()));
                }
            }
        }
        (copied, None)
    }

    /// Descriptive copy of the source record, relocated to the target
    /// environment. The id is preserved deliberately so repeated promotion
    /// attempts are detectable.
    fn build_target_record(
        &self,
        record: &TrackRecord,
        promotion_date: &chrono::DateTime<Utc>,
    ) -> TrackRecord {
        let mut target = record.clone();
        target.promoted_from = Some(self.source.name.clone());
        target.promotion_date = Some(*promotion_date);
        target.file_url = self.target.blobs.public_url(&record.audio_key());
        target.thumbnail_url = record
            .thumbnail_url
            .as_deref()
            .and_then(|url| self.source.blobs.key_for_url(url))
            .map(|key| self.target.blobs.public_url(&key));
        target
    }

    fn failure_outcome(&self, track_id: Uuid, error: String) -> PromotionOutcome {
        PromotionOutcome {
            track_id,
            source_environment: self.source.name.clone(),
            target_environment: self.target.name.clone(),
            files_copied: Vec::new(),
            record_created: false,
            promotion_date: Utc::now(),
            error: Some(error),
        }
    }

    /// Log the outcome durably, publish it on the notification bus, and hand
    /// it back. Runs on every path out of `promote`.
    fn publish(&self, verdict: Verdict, outcome: PromotionOutcome) -> PromotionReport {
        match &outcome.error {
            None => tracing::info!(
                track_id = %outcome.track_id,
                source = %outcome.source_environment,
                target = %outcome.target_environment,
                files_copied = outcome.files_copied.len(),
                record_created = outcome.record_created,
                "Promotion outcome: success"
            ),
            Some(error) => tracing::error!(
                track_id = %outcome.track_id,
                source = %outcome.source_environment,
                target = %outcome.target_environment,
                "Promotion outcome: failed: {}",
                error
            ),
        }

        let event = if outcome.succeeded() {
            PipelineEvent::PromotionCompleted {
                outcome: outcome.clone(),
                timestamp: Utc::now(),
            }
        } else {
            PipelineEvent::PromotionFailed {
                outcome: outcome.clone(),
                timestamp: Utc::now(),
            }
        };
        self.event_bus.emit_lossy(event);

        PromotionReport { verdict, outcome }
    }
}
