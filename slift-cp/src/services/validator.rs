//! Quality-gate validator
//!
//! Pure decision component: given a record, produce a fresh verdict against
//! the promotion rule set. Verdicts are never cached and the validator never
//! mutates state, so it is safe to call speculatively from anywhere.

use chrono::{Duration, Utc};
use slift_common::config::PromotionConfig;
use slift_common::model::{TrackRecord, ValidationCheck, Verdict, GENRE_UNKNOWN};
use slift_common::store::BlobStore;

/// How a promotion was requested; manual requests may bypass the age gate
/// when policy allows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionMode {
    /// Scheduled batch promotion; every check is enforced
    Automatic,
    /// Explicit operator request
    Manual,
}

/// Promotion gate policy
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    /// Minimum record age before automatic promotion (the soak window)
    pub min_soak: Duration,
    /// Whether manual promotions skip the age gate
    pub manual_bypasses_age_gate: bool,
}

impl ValidationPolicy {
    pub fn from_config(config: &PromotionConfig) -> Self {
        Self {
            min_soak: Duration::hours(config.min_soak_hours),
            manual_bypasses_age_gate: config.manual_bypasses_age_gate,
        }
    }
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_soak: Duration::hours(24),
            manual_bypasses_age_gate: true,
        }
    }
}

/// Quality-gate validator bound to the source environment's media area
pub struct Validator {
    source_blobs: BlobStore,
    policy: ValidationPolicy,
}

impl Validator {
    pub fn new(source_blobs: BlobStore, policy: ValidationPolicy) -> Self {
        Self {
            source_blobs,
            policy,
        }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Evaluate the quality gate for one record
    pub async fn validate(&self, record: &TrackRecord, mode: PromotionMode) -> Verdict {
        let mut checks = Vec::with_capacity(4);

        // 1. Processing status: not already promoted or rejected
        checks.push(ValidationCheck {
            name: "processing_status".to_string(),
            passed: record.status.is_promotable(),
            detail: if record.status.is_promotable() {
                format!("status is '{}'", record.status)
            } else {
                format!("status is '{}', not promotable", record.status)
            },
        });

        // 2. Required fields: identity and an accurate duration
        let mut missing = Vec::new();
        if record.title.trim().is_empty() {
            missing.push("title");
        }
        if record.file_url.trim().is_empty() {
            missing.push("fileUrl");
        }
        if record.duration == 0 {
            missing.push("duration");
        }
        checks.push(ValidationCheck {
            name: "required_fields".to_string(),
            passed: missing.is_empty(),
            detail: if missing.is_empty() {
                "title, fileUrl, and duration are present".to_string()
            } else {
                format!("missing or empty: {}", missing.join(", "))
            },
        });

        // 3. Age gate: enforced for automatic promotion, bypassable for
        // explicit manual requests (policy decision, visible in the verdict)
        let age = Utc::now() - record.created_date;
        let bypassed = mode == PromotionMode::Manual && self.policy.manual_bypasses_age_gate;
        checks.push(ValidationCheck {
            name: "age_gate".to_string(),
            passed: bypassed || age >= self.policy.min_soak,
            detail: if bypassed {
                "bypassed for manual promotion".to_string()
            } else if age >= self.policy.min_soak {
                format!("record age {}h meets the soak window", age.num_hours())
            } else {
                format!(
                    "record age {}h is below the {}h soak window",
                    age.num_hours(),
                    self.policy.min_soak.num_hours()
                )
            },
        });

        // 4. Blob existence: a record without a backing file is never
        // promotable
        let blob_count = self
            .source_blobs
            .list_prefix(&record.blob_prefix())
            .map(|keys| keys.len())
            .unwrap_or(0);
        checks.push(ValidationCheck {
            name: "blob_existence".to_string(),
            passed: blob_count > 0,
            detail: if blob_count > 0 {
                format!("{} object(s) under {}", blob_count, record.blob_prefix())
            } else {
                format!("no objects under {}", record.blob_prefix())
            },
        });

        // Advisory warnings: worth surfacing, never blocking
        let mut warnings = Vec::new();
        if record.description.trim().is_empty() {
            warnings.push("no description provided".to_string());
        }
        if record.genre.is_empty() || record.genre == GENRE_UNKNOWN {
            warnings.push("genre not specified".to_string());
        }
        if record.tags.is_empty() {
            warnings.push("no tags specified".to_string());
        }

        Verdict {
            valid: checks.iter().all(|c| c.passed),
            checks,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slift_common::model::{TrackRecord, TrackStatus};
    use tempfile::TempDir;

    fn record_with_blob(blobs: &BlobStore) -> TrackRecord {
        let mut record = TrackRecord::new(
            "Valid Track".to_string(),
            Some("Artist".to_string()),
            "valid.mp3".to_string(),
            "https://media.dev.test/audio/x/valid.mp3".to_string(),
            2_000_000,
            "mp3".to_string(),
            "hash".to_string(),
        );
        record.duration = 180;
        record.created_date = Utc::now() - Duration::hours(48);
        std::fs::create_dir_all(blobs.root().join(format!("audio/{}", record.id))).unwrap();
        std::fs::write(
            blobs.root().join(record.audio_key()),
            b"bytes",
        )
        .unwrap();
        record
    }

    fn validator(dir: &TempDir) -> Validator {
        let blobs = BlobStore::new(dir.path().join("media"), "https://media.dev.test", "dev")
            .unwrap();
        Validator::new(blobs, ValidationPolicy::default())
    }

    fn blobs(dir: &TempDir) -> BlobStore {
        BlobStore::new(dir.path().join("media"), "https://media.dev.test", "dev").unwrap()
    }

    #[tokio::test]
    async fn fully_valid_record_passes() {
        let dir = TempDir::new().unwrap();
        let v = validator(&dir);
        let record = record_with_blob(&blobs(&dir));

        let verdict = v.validate(&record, PromotionMode::Automatic).await;
        assert!(verdict.valid, "verdict: {:?}", verdict);
        assert!(verdict.checks.iter().all(|c| c.passed));
    }

    #[tokio::test]
    async fn zero_duration_fails_required_fields() {
        let dir = TempDir::new().unwrap();
        let v = validator(&dir);
        let mut record = record_with_blob(&blobs(&dir));
        record.duration = 0;

        let verdict = v.validate(&record, PromotionMode::Automatic).await;
        assert!(!verdict.valid);
        let check = verdict.check("required_fields").unwrap();
        assert!(!check.passed);
        assert!(check.detail.contains("duration"));
    }

    #[tokio::test]
    async fn promoted_record_fails_status_check() {
        let dir = TempDir::new().unwrap();
        let v = validator(&dir);
        let mut record = record_with_blob(&blobs(&dir));
        record.status = TrackStatus::Promoted;

        let verdict = v.validate(&record, PromotionMode::Automatic).await;
        assert!(!verdict.valid);
        assert!(!verdict.check("processing_status").unwrap().passed);
    }

    #[tokio::test]
    async fn fresh_record_fails_age_gate_in_automatic_mode_only() {
        let dir = TempDir::new().unwrap();
        let v = validator(&dir);
        let mut record = record_with_blob(&blobs(&dir));
        record.created_date = Utc::now();

        let automatic = v.validate(&record, PromotionMode::Automatic).await;
        assert!(!automatic.valid);
        assert!(!automatic.check("age_gate").unwrap().passed);

        let manual = v.validate(&record, PromotionMode::Manual).await;
        assert!(manual.valid, "manual bypass should pass: {:?}", manual);
        let gate = manual.check("age_gate").unwrap();
        assert!(gate.passed);
        assert!(gate.detail.contains("bypassed"));
    }

    #[tokio::test]
    async fn manual_mode_respects_disabled_bypass() {
        let dir = TempDir::new().unwrap();
        let policy = ValidationPolicy {
            manual_bypasses_age_gate: false,
            ..ValidationPolicy::default()
        };
        let v = Validator::new(blobs(&dir), policy);
        let mut record = record_with_blob(&blobs(&dir));
        record.created_date = Utc::now();

        let verdict = v.validate(&record, PromotionMode::Manual).await;
        assert!(!verdict.valid);
        assert!(!verdict.check("age_gate").unwrap().passed);
    }

    #[tokio::test]
    async fn missing_blob_fails_regardless_of_metadata() {
        let dir = TempDir::new().unwrap();
        let v = validator(&dir);
        let record = record_with_blob(&blobs(&dir));

        // Remove the backing file
        std::fs::remove_file(blobs(&dir).root().join(record.audio_key())).unwrap();

        let verdict = v.validate(&record, PromotionMode::Automatic).await;
        assert!(!verdict.valid);
        assert!(!verdict.check("blob_existence").unwrap().passed);
    }

    #[tokio::test]
    async fn advisory_warnings_do_not_block() {
        let dir = TempDir::new().unwrap();
        let v = validator(&dir);
        let record = record_with_blob(&blobs(&dir));

        let verdict = v.validate(&record, PromotionMode::Automatic).await;
        assert!(verdict.valid);
        // Fresh ingest: unknown genre, no description, no tags
        assert_eq!(verdict.warnings.len(), 3);
    }
}
