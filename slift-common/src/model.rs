//! Domain model for the Soundlift pipeline
//!
//! Track records are the central entity: created by the ingest service,
//! completed by enrichment, and copied into the target environment by
//! promotion. Verdicts and promotion outcomes are ephemeral wire types,
//! rebuilt on every call so stale approvals cannot leak across invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel genre assigned at ingest until enrichment fills in a real one
pub const GENRE_UNKNOWN: &str = "unknown";

/// Track lifecycle status within one environment's metadata store
///
/// Transitions: `processed → enhanced` (enrichment), `processed|enhanced →
/// promoted` (promotion), any → `rejected` (operator decision). `promoted`
/// and `rejected` are terminal; they are never reversed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    /// Ingested into the media area, awaiting enrichment
    Processed,
    /// Enrichment completed (accurate duration, embedded tags)
    Enhanced,
    /// Copied into the target environment (terminal in the source)
    Promoted,
    /// Permanently failed validation (terminal)
    Rejected,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Processed => "processed",
            TrackStatus::Enhanced => "enhanced",
            TrackStatus::Promoted => "promoted",
            TrackStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processed" => Some(TrackStatus::Processed),
            "enhanced" => Some(TrackStatus::Enhanced),
            "promoted" => Some(TrackStatus::Promoted),
            "rejected" => Some(TrackStatus::Rejected),
            _ => None,
        }
    }

    /// Whether a record in this status may still be promoted
    pub fn is_promotable(&self) -> bool {
        matches!(self, TrackStatus::Processed | TrackStatus::Enhanced)
    }
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-track metadata record, keyed by `(id, created_date)`
///
/// The `id` is preserved across environments on promotion so repeated
/// promotion attempts are detectable in the target store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRecord {
    pub id: Uuid,
    pub created_date: DateTime<Utc>,
    pub title: String,
    pub artist: Option<String>,
    pub genre: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Original uploaded filename, after transport-escape decoding
    pub filename: String,
    /// Canonical locator of the primary audio blob in the owning environment
    pub file_url: String,
    pub file_size: u64,
    /// Seconds; 0 until enrichment runs, and 0 never passes the quality gate
    pub duration: u32,
    /// Lowercase audio format extension (mp3, wav, ...)
    pub format: String,
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    /// SHA-256 of the audio bytes, recorded at ingest for integrity checks
    pub file_hash: Option<String>,
    pub status: TrackStatus,
    pub thumbnail_url: Option<String>,
    /// Source environment name, set only on records written by promotion
    pub promoted_from: Option<String>,
    pub promotion_date: Option<DateTime<Utc>>,
    pub enriched_at: Option<DateTime<Utc>>,
}

impl TrackRecord {
    /// Create the initial record written at ingest time
    pub fn new(
        title: String,
        artist: Option<String>,
        filename: String,
        file_url: String,
        file_size: u64,
        format: String,
        file_hash: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_date: Utc::now(),
            title,
            artist,
            genre: GENRE_UNKNOWN.to_string(),
            description: String::new(),
            tags: Vec::new(),
            filename,
            file_url,
            file_size,
            duration: 0,
            format,
            bitrate: None,
            sample_rate: None,
            channels: None,
            file_hash: Some(file_hash),
            status: TrackStatus::Processed,
            thumbnail_url: None,
            promoted_from: None,
            promotion_date: None,
            enriched_at: None,
        }
    }

    /// Blob key of the primary audio object within the media area
    pub fn audio_key(&self) -> String {
        format!("audio/{}/{}", self.id, self.filename)
    }

    /// Blob prefix under which all of this track's objects live
    pub fn blob_prefix(&self) -> String {
        format!("audio/{}/", self.id)
    }
}

/// Enrichment result applied to an existing record
///
/// `None` fields leave the stored value untouched (missing embedded tags are
/// not an error).
#[derive(Debug, Clone, Default)]
pub struct EnrichmentUpdate {
    pub duration: u32,
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// One quality-gate check result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// Quality-gate verdict for one track
///
/// Produced fresh on every validation call and never persisted or cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub valid: bool,
    pub checks: Vec<ValidationCheck>,
    /// Non-fatal advisories (missing description, unknown genre, no tags)
    pub warnings: Vec<String>,
}

impl Verdict {
    /// Look up a check by name, for callers inspecting which gate failed
    pub fn check(&self, name: &str) -> Option<&ValidationCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// One blob copied during a promotion attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopiedFile {
    pub source_key: String,
    pub dest_key: String,
    pub size: u64,
}

/// Durable record of one promotion attempt
///
/// Logged before the promoter returns and published on the event bus, so the
/// outcome survives the invoking process regardless of what the caller does
/// with the return value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionOutcome {
    pub track_id: Uuid,
    pub source_environment: String,
    pub target_environment: String,
    pub files_copied: Vec<CopiedFile>,
    /// False when the target already held the record (idempotent no-op)
    pub record_created: bool,
    pub promotion_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PromotionOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated result of one orchestrator batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub max_promotions: usize,
    /// Eligible candidates found by the scan (may exceed the batch size)
    pub scanned: usize,
    pub promoted: usize,
    pub failed: usize,
    /// Candidates beyond the batch size, left for the next cycle
    pub skipped: usize,
    pub outcomes: Vec<PromotionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
