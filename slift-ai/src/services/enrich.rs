//! Metadata enrichment handler
//!
//! Second-pass extraction over an ingested audio object: exact duration and
//! stream properties from the container, embedded tags, and artwork. Missing
//! tags or artwork are fine; unreadable audio is an error and the record
//! stays `processed`, which keeps it out of promotion's strict checks.

use chrono::Utc;
use lofty::file::TaggedFileExt;
use lofty::picture::MimeType;
use lofty::prelude::*;
use lofty::probe::Probe;
use slift_common::events::{EventBus, PipelineEvent};
use slift_common::model::{EnrichmentUpdate, TrackRecord};
use slift_common::store::{BlobStore, MetadataStore};
use slift_common::{Error, Result};
use uuid::Uuid;

/// Enrichment handler for one environment
pub struct EnrichmentHandler {
    store: MetadataStore,
    media: BlobStore,
    event_bus: EventBus,
}

impl EnrichmentHandler {
    pub fn new(store: MetadataStore, media: BlobStore, event_bus: EventBus) -> Self {
        Self {
            store,
            media,
            event_bus,
        }
    }

    /// Enrich one track from its audio object and return the updated record
    pub async fn enrich(&self, track_id: Uuid, blob_key: Option<String>) -> Result<TrackRecord> {
        let record = self
            .store
            .get(track_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track {}", track_id)))?;

        let key = blob_key.unwrap_or_else(|| record.audio_key());
        let path = self.media.path(&key)?;
        if !self.media.exists(&key).await {
            return Err(Error::NotFound(format!("blob {}", key)));
        }

        let tagged_file = Probe::open(&path)
            .map_err(|e| Error::InvalidInput(format!("unreadable audio {}: {}", key, e)))?
            .read()
            .map_err(|e| Error::InvalidInput(format!("unreadable audio {}: {}", key, e)))?;

        let properties = tagged_file.properties();
        let duration = properties.duration().as_secs() as u32;
        let bitrate = properties.audio_bitrate();
        let sample_rate = properties.sample_rate();
        let channels = properties.channels().map(u32::from);

        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());
        let (title, artist, genre, description) = match tag {
            Some(tag) => (
                tag.title().map(|s| s.to_string()),
                tag.artist().map(|s| s.to_string()),
                tag.genre().map(|s| s.to_string()),
                tag.comment().map(|s| s.to_string()),
            ),
            None => (None, None, None, None),
        };

        let thumbnail_url = match tag.and_then(|t| t.pictures().first()) {
            Some(picture) => Some(self.store_artwork(&record, picture).await?),
            None => None,
        };

        let update = EnrichmentUpdate {
            duration,
            bitrate,
            sample_rate,
            channels,
            title,
            artist,
            genre,
            description,
            thumbnail_url,
        };

        self.store
            .update_enrichment(record.id, &record.created_date, &update)
            .await?;

        self.event_bus.emit_lossy(PipelineEvent::TrackEnriched {
            track_id: record.id,
            duration,
            timestamp: Utc::now(),
        });

        tracing::info!(
            track_id = %record.id,
            duration = duration,
            bitrate = ?bitrate,
            "Enriched track metadata"
        );

        self.store
            .get(record.id)
            .await?
            .ok_or_else(|| Error::Internal(format!("track {} vanished mid-enrichment", record.id)))
    }

    /// Store embedded artwork inside the track's blob prefix so promotion
    /// carries it along with the audio
    async fn store_artwork(
        &self,
        record: &TrackRecord,
        picture: &lofty::picture::Picture,
    ) -> Result<String> {
        let ext = match picture.mime_type() {
            Some(MimeType::Png) => "png",
            Some(MimeType::Gif) => "gif",
            Some(MimeType::Bmp) => "bmp",
            Some(MimeType::Tiff) => "tiff",
            _ => "jpg",
        };
        let artwork_key = format!("audio/{}/cover.{}", record.id, ext);
        self.media.put(&artwork_key, picture.data()).await?;
        tracing::debug!(track_id = %record.id, key = %artwork_key, "Stored embedded artwork");
        Ok(self.media.public_url(&artwork_key))
    }
}
