//! Ingestion handler
//!
//! Takes one newly uploaded object through the ingest gates: extension,
//! size window, and a head scan for malicious markers. Accepted objects are
//! hashed, copied into the managed media area under `audio/{id}/{filename}`,
//! and recorded with `status = processed`. The upload is removed only after
//! the record write succeeds, which bounds the orphaned-blob window.

use crate::services::upload_scanner::{ingest_extension, UploadScanner};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use slift_common::config::IngestConfig;
use slift_common::events::{EventBus, PipelineEvent};
use slift_common::model::TrackRecord;
use slift_common::store::{BlobStore, MetadataStore};
use slift_common::{Error, Result};

/// Byte patterns that mark an upload as hostile rather than audio
const SUSPICIOUS_PATTERNS: &[&[u8]] = &[
    b"<script",
    b"javascript:",
    b"<?php",
    b"#!/bin/",
    b"cmd.exe",
    b"powershell",
];

/// Result of one object ingestion
#[derive(Debug)]
pub enum IngestOutcome {
    /// Record written, object now lives in the media area
    Ingested(TrackRecord),
    /// Not an audio upload; left alone without error
    Skipped { key: String, reason: String },
}

/// Summary of one upload-area sweep
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub discovered: usize,
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Ingestion handler for one environment
pub struct IngestHandler {
    config: IngestConfig,
    store: MetadataStore,
    media: BlobStore,
    uploads: BlobStore,
    event_bus: EventBus,
}

impl IngestHandler {
    pub fn new(
        config: IngestConfig,
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
        }
    }

    /// Ingest one uploaded object identified by its upload-area key
    pub async fn handle_object(&self, raw_key: &str) -> Result<IngestOutcome> {
        let key = decode_key(raw_key);
        let filename = key
            .rsplit('/')
            .next()
            .unwrap_or(key.as_str())
            .to_string();

        // Not every upload event is audio; skip quietly
        let Some(format) = extension_of(&filename) else {
            tracing::info!("Skipping non-audio upload: {}", key);
            return Ok(IngestOutcome::Skipped {
                key,
                reason: "unsupported extension".to_string(),
            });
        };

        let size = self.uploads.size(&key).await?;
        if size < self.config.min_bytes || size > self.config.max_bytes {
            self.reject(&key, format!("size {} outside acceptable window", size));
            return Err(Error::InvalidInput(format!(
                "file size {} is outside the acceptable range [{}, {}]",
                size, self.config.min_bytes, self.config.max_bytes
            )));
        }

        let head = self
            .uploads
            .read_head(&key, self.config.scan_window_bytes)
            .await?;
        if let Some(pattern) = find_suspicious_pattern(&head) {
            self.reject(&key, format!("suspicious pattern '{}'", pattern));
            return Err(Error::InvalidInput(format!(
                "security scan failed for {}",
                filename
            )));
        }

        let bytes = self.uploads.read(&key).await?;
        let file_hash = format!("{:x}", Sha256::digest(&bytes));

        let (title, artist) = derive_title_and_artist(&filename);
        let mut record = TrackRecord::new(
            title,
            artist,
            filename.clone(),
            String::new(),
            size,
            format,
            file_hash,
        );

        let media_key = record.audio_key();
        record.file_url = self.media.public_url(&media_key);

        self.media.put(&media_key, &bytes).await?;
        self.store.insert(&record).await?;

        // Upload cleanup is best-effort; a leftover is re-skipped next sweep
        // once the record exists
        if let Err(e) = self.uploads.delete(&key).await {
            tracing::warn!("Failed to remove processed upload {}: {}", key, e);
        }

        self.event_bus.emit_lossy(PipelineEvent::TrackIngested {
            track_id: record.id,
            filename: record.filename.clone(),
            environment: self.media.environment().to_string(),
            timestamp: Utc::now(),
        });

        tracing::info!(
            track_id = %record.id,
            filename = %record.filename,
            size = size,
            "Ingested upload into media area"
        );

        Ok(IngestOutcome::Ingested(record))
    }

    /// Sweep the upload area, ingesting candidates with bounded concurrency.
    /// Per-object failures are isolated: one bad upload never blocks others.
    pub async fn sweep(&self, scanner: &UploadScanner) -> Result<SweepSummary> {
        let keys = scanner
            .scan(self.uploads.root())
            .map_err(|e| Error::Blob(e.to_string()))?;
        let discovered = keys.len();
        let concurrency = self.config.concurrency_for(self.media.environment());

        let outcomes: Vec<Result<IngestOutcome>> = stream::iter(keys)
            .map(|key| async move { self.handle_object(&key).await })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut summary = SweepSummary {
            discovered,
            ingested: 0,
            skipped: 0,
            failed: 0,
        };
        for outcome in outcomes {
            match outcome {
                Ok(IngestOutcome::Ingested(_)) => summary.ingested += 1,
                Ok(IngestOutcome::Skipped { .. }) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!("Ingest failure during sweep: {}", e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            discovered = summary.discovered,
            ingested = summary.ingested,
            skipped = summary.skipped,
            failed = summary.failed,
            "Upload sweep complete"
        );

        Ok(summary)
    }

    fn reject(&self, key: &str, reason: String) {
        tracing::error!("Rejected upload {}: {}", key, reason);
        self.event_bus.emit_lossy(PipelineEvent::IngestRejected {
            key: key.to_string(),
            reason,
            environment: self.media.environment().to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Decode transport-level escaping in upload keys (`+` and percent escapes)
pub fn decode_key(raw: &str) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes.get(i + 1..i + 3);
                match hex.and_then(|h| u8::from_str_radix(std::str::from_utf8(h).ok()?, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_lowercase();
    ingest_extension(&ext)?;
    Some(ext)
}

fn find_suspicious_pattern(head: &[u8]) -> Option<&'static str> {
    let lowered: Vec<u8> = head.iter().map(|b| b.to_ascii_lowercase()).collect();
    for pattern in SUSPICIOUS_PATTERNS {
        if lowered
            .windows(pattern.len())
            .any(|window| window == *pattern)
        {
            return std::str::from_utf8(pattern).ok();
        }
    }
    None
}

/// Best-effort title (and artist, from `Artist - Title` patterns) derived
/// from an uploaded filename
pub fn derive_title_and_artist(filename: &str) -> (String, Option<String>) {
    let stem = match filename.rfind('.') {
        Some(idx) => &filename[..idx],
        None => filename,
    };

    let cleaned = stem
        .replace(['_', '.'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    // "Artist - Title" before title-casing, so the split survives hyphens
    // inside names
    if let Some((artist_part, title_part)) = cleaned.split_once(" - ") {
        let artist = title_case(artist_part.trim());
        let title = title_case(title_part.trim());
        if !artist.is_empty() && !title.is_empty() {
            return (title, Some(artist));
        }
    }

    (title_case(&cleaned.replace('-', " ")), None)
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
