//! Promotion pipeline integration tests
//!
//! Exercises the validator → promoter → orchestrator path against two real
//! environments (in-memory stores, temp-directory media areas): idempotence,
//! the age gate, missing-blob rejection, batch ordering, and partial-batch
//! resilience.

use chrono::{Duration as ChronoDuration, Utc};
use slift_common::config::PromotionConfig;
use slift_common::events::EventBus;
use slift_common::model::{TrackRecord, TrackStatus};
use slift_common::store::{BlobStore, MetadataStore};
use slift_cp::services::{
    schedule, EnvironmentHandles, Orchestrator, PromotionMode, Promoter, ValidationPolicy,
    Validator,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Fixture {
    _dir: TempDir,
    source: EnvironmentHandles,
    target: EnvironmentHandles,
    event_bus: EventBus,
    promoter: Arc<Promoter>,
    orchestrator: Arc<Orchestrator>,
}

fn test_config(min_soak_hours: i64) -> PromotionConfig {
    PromotionConfig {
        source: "dev".to_string(),
        target: "prod".to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        min_soak_hours,
        manual_bypasses_age_gate: true,
        max_promotions: 10,
        schedule_hours: 6,
        concurrency: 2,
        track_timeout_secs: 30,
    }
}

async fn fixture(config: PromotionConfig) -> Fixture {
    let dir = TempDir::new().expect("create temp dir");

    let source = EnvironmentHandles::new(
        "dev",
        MetadataStore::open_in_memory("dev").await.unwrap(),
        BlobStore::new(dir.path().join("dev-media"), "https://media.dev.test", "dev").unwrap(),
    );
    let target = EnvironmentHandles::new(
        "prod",
        MetadataStore::open_in_memory("prod").await.unwrap(),
        BlobStore::new(dir.path().join("prod-media"), "https://media.test", "prod").unwrap(),
    );

    let event_bus = EventBus::new(64);
    let policy = ValidationPolicy::from_config(&config);
    let promoter = Arc::new(Promoter::new(
        source.clone(),
        target.clone(),
        policy.clone(),
        event_bus.clone(),
    ));
    let validator = Validator::new(source.blobs.clone(), policy);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&promoter),
        source.clone(),
        validator,
        config,
        event_bus.clone(),
    ));

    Fixture {
        _dir: dir,
        source,
        target,
        event_bus,
        promoter,
        orchestrator,
    }
}

/// Seed an enriched, promotion-ready track (blob included) into the source
async fn seed_track(fix: &Fixture, title: &str, age_hours: i64, duration: u32) -> TrackRecord {
    let mut record = TrackRecord::new(
        title.to_string(),
        Some("Fixture Artist".to_string()),
        format!("{}.mp3", title.to_lowercase().replace(' ', "_")),
        String::new(),
        2_000_000,
        "mp3".to_string(),
        "cafe0123".to_string(),
    );
    record.created_date = Utc::now() - ChronoDuration::hours(age_hours);
    record.duration = duration;
    if duration > 0 {
        record.status = TrackStatus::Enhanced;
    }
    record.file_url = fix.source.blobs.public_url(&record.audio_key());

    fix.source
        .blobs
        .put(&record.audio_key(), b"mp3-bytes-here")
        .await
        .unwrap();
    fix.source.store.insert(&record).await.unwrap();
    record
}

#[tokio::test]
async fn promotion_is_idempotent() {
    let fix = fixture(test_config(24)).await;
    let record = seed_track(&fix, "Night Drive", 48, 210).await;

    let first = fix
        .promoter
        .promote(record.id, PromotionMode::Automatic)
        .await
        .unwrap();
    assert!(first.outcome.succeeded());
    assert!(first.outcome.record_created);
    assert_eq!(first.outcome.files_copied.len(), 1);

    // Same id in the target, relocated locator, mirrored blob layout
    let promoted = fix.target.store.get(record.id).await.unwrap().unwrap();
    assert_eq!(promoted.id, record.id);
    assert_eq!(promoted.title, "Night Drive");
    assert_eq!(promoted.promoted_from.as_deref(), Some("dev"));
    assert!(promoted.promotion_date.is_some());
    assert_eq!(
        promoted.file_url,
        format!("https://media.test/audio/{}/night_drive.mp3", record.id)
    );
    assert!(fix.target.blobs.exists(&record.audio_key()).await);

    // Source record is terminal
    let source_record = fix.source.store.get(record.id).await.unwrap().unwrap();
    assert_eq!(source_record.status, TrackStatus::Promoted);

    // Second invocation: success no-op, target content untouched
    let second = fix
        .promoter
        .promote(record.id, PromotionMode::Automatic)
        .await
        .unwrap();
    assert!(second.outcome.succeeded());
    assert!(!second.outcome.record_created);
    assert!(second.outcome.files_copied.is_empty());

    let after = fix.target.store.get(record.id).await.unwrap().unwrap();
    assert_eq!(after.title, promoted.title);
    assert_eq!(after.file_url, promoted.file_url);
    assert_eq!(after.promotion_date, promoted.promotion_date);
    assert_eq!(fix.target.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn age_gate_blocks_automatic_but_not_manual_promotion() {
    let fix = fixture(test_config(24)).await;
    let record = seed_track(&fix, "Fresh Cut", 0, 180).await;

    let automatic = fix
        .promoter
        .promote(record.id, PromotionMode::Automatic)
        .await
        .unwrap();
    assert!(!automatic.verdict.valid);
    assert!(!automatic.verdict.check("age_gate").unwrap().passed);
    assert!(!automatic.outcome.succeeded());
    // No side effects on a validation failure
    assert_eq!(fix.target.store.count().await.unwrap(), 0);
    assert!(fix.target.blobs.list_prefix("audio/").unwrap().is_empty());
    assert_eq!(
        fix.source.store.get(record.id).await.unwrap().unwrap().status,
        TrackStatus::Enhanced
    );

    // An explicit manual request bypasses only the age gate
    let manual = fix
        .promoter
        .promote(record.id, PromotionMode::Manual)
        .await
        .unwrap();
    assert!(manual.verdict.valid);
    assert!(manual.outcome.succeeded());
    assert!(manual.outcome.record_created);
    assert_eq!(fix.target.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn missing_blob_always_fails_validation() {
    let fix = fixture(test_config(0)).await;
    let record = seed_track(&fix, "Ghost File", 48, 200).await;
    fix.source.blobs.delete(&record.audio_key()).await.unwrap();

    let report = fix
        .promoter
        .promote(record.id, PromotionMode::Manual)
        .await
        .unwrap();
    assert!(!report.verdict.valid);
    assert!(!report.verdict.check("blob_existence").unwrap().passed);
    assert!(report.outcome.error.is_some());
    assert_eq!(fix.target.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_track_is_a_not_found_error() {
    let fix = fixture(test_config(0)).await;
    let result = fix
        .promoter
        .promote(Uuid::new_v4(), PromotionMode::Manual)
        .await;
    assert!(matches!(result, Err(slift_common::Error::NotFound(_))));
}

#[tokio::test]
async fn batch_takes_oldest_candidates_up_to_the_limit() {
    let fix = fixture(test_config(0)).await;
    let t1 = seed_track(&fix, "Oldest", 30, 100).await;
    let t2 = seed_track(&fix, "Middle", 20, 100).await;
    let t3 = seed_track(&fix, "Newest", 10, 100).await;

    let summary = fix.orchestrator.run_batch(2).await;

    assert_eq!(summary.scanned, 3);
    assert_eq!(summary.promoted, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 1);
    let batch_ids: Vec<Uuid> = summary.outcomes.iter().map(|o| o.track_id).collect();
    assert_eq!(batch_ids, vec![t1.id, t2.id]);

    // t3 is untouched and waits for the next cycle
    assert!(fix.target.store.record_exists(t1.id).await.unwrap());
    assert!(fix.target.store.record_exists(t2.id).await.unwrap());
    assert!(!fix.target.store.record_exists(t3.id).await.unwrap());
    assert_eq!(
        fix.source.store.get(t3.id).await.unwrap().unwrap().status,
        TrackStatus::Enhanced
    );
}

#[tokio::test]
async fn batch_isolates_per_track_failures() {
    let fix = fixture(test_config(0)).await;
    let t1 = seed_track(&fix, "First Good", 30, 100).await;
    let t2 = seed_track(&fix, "Sabotaged", 20, 100).await;
    let t3 = seed_track(&fix, "Second Good", 10, 100).await;

    // Plant a plain file where t2's target directory must go, so its blob
    // copy fails while validation still passes
    std::fs::create_dir_all(fix.target.blobs.root().join("audio")).unwrap();
    std::fs::write(
        fix.target.blobs.root().join("audio").join(t2.id.to_string()),
        b"roadblock",
    )
    .unwrap();

    let summary = fix.orchestrator.run_batch(10).await;

    assert_eq!(summary.scanned, 3);
    assert_eq!(summary.promoted, 2);
    assert_eq!(summary.failed, 1);

    assert!(summary.outcomes[0].succeeded());
    assert!(!summary.outcomes[1].succeeded());
    assert!(summary.outcomes[1].error.is_some());
    assert!(summary.outcomes[2].succeeded());

    // t2's failure neither blocked t3 nor rolled back t1
    assert!(fix.target.store.record_exists(t1.id).await.unwrap());
    assert!(fix.target.store.record_exists(t3.id).await.unwrap());
    assert!(!fix.target.store.record_exists(t2.id).await.unwrap());
    assert_eq!(
        fix.source.store.get(t2.id).await.unwrap().unwrap().status,
        TrackStatus::Enhanced
    );
}

#[tokio::test]
async fn unenriched_records_are_excluded_from_every_batch() {
    let fix = fixture(test_config(0)).await;
    // Enrichment never ran: duration stays 0
    let record = seed_track(&fix, "Silent", 100, 0).await;
    assert_eq!(record.status, TrackStatus::Processed);

    let candidates = fix.orchestrator.scan_candidates().await.unwrap();
    assert!(candidates.is_empty());

    let summary = fix.orchestrator.run_batch(10).await;
    assert_eq!(summary.scanned, 0);
    assert!(summary.outcomes.is_empty());
    assert_eq!(fix.target.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn every_outcome_is_published_on_the_bus() {
    let fix = fixture(test_config(24)).await;
    let mut rx = fix.event_bus.subscribe();

    let ready = seed_track(&fix, "Announced", 48, 120).await;
    let fresh = seed_track(&fix, "Too Fresh", 0, 120).await;

    fix.promoter
        .promote(ready.id, PromotionMode::Automatic)
        .await
        .unwrap();
    fix.promoter
        .promote(fresh.id, PromotionMode::Automatic)
        .await
        .unwrap();

    // Notification is independent of what the caller does with the report
    assert_eq!(rx.recv().await.unwrap().event_type(), "PromotionCompleted");
    assert_eq!(rx.recv().await.unwrap().event_type(), "PromotionFailed");
}

#[tokio::test]
async fn validate_action_has_no_side_effects() {
    let fix = fixture(test_config(24)).await;
    let record = seed_track(&fix, "Inspect Only", 48, 150).await;

    let verdict = fix.orchestrator.validate_one(record.id).await.unwrap();
    assert!(verdict.valid);

    assert_eq!(fix.target.store.count().await.unwrap(), 0);
    assert_eq!(
        fix.source.store.get(record.id).await.unwrap().unwrap().status,
        TrackStatus::Enhanced
    );
}

#[tokio::test]
async fn schedule_fires_batches_until_cancelled() {
    let fix = fixture(test_config(0)).await;
    seed_track(&fix, "Scheduled Pick", 5, 90).await;
    let mut rx = fix.event_bus.subscribe();

    let cancel = CancellationToken::new();
    let handle = schedule::spawn_batch_schedule(
        Arc::clone(&fix.orchestrator),
        Duration::from_millis(50),
        10,
        cancel.clone(),
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if event.event_type() == "BatchCompleted" {
                break;
            }
        }
    })
    .await
    .expect("scheduled batch should fire");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("schedule should stop after cancellation")
        .unwrap();

    // The scheduled run actually promoted the candidate
    assert_eq!(fix.target.store.count().await.unwrap(), 1);
}
