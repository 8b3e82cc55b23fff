//! Typed store clients for per-environment metadata and media
//!
//! Each environment owns one SQLite database and one media directory; the
//! clients here are the only components that touch them directly.

pub mod blob;

pub use blob::BlobStore;

use crate::model::{EnrichmentUpdate, TrackRecord, TrackStatus};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

/// Metadata store client for one environment
///
/// Composite key `(id, created_date)` with secondary indexes on
/// `(status, created_date)` (orchestrator candidate scan) and
/// `(genre, created_date)` (front-end browse queries).
#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
    environment: String,
}

impl MetadataStore {
    /// Open (or create) the environment's database and initialize tables
    pub async fn open(db_path: &Path, environment: &str) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        tracing::debug!("Connecting to database: {}", db_url);

        let pool = SqlitePool::connect(&db_url).await?;
        init_tables(&pool).await?;

        Ok(Self {
            pool,
            environment: environment.to_string(),
        })
    }

    /// In-memory store for tests. A single connection keeps every query on
    /// the same memory database.
    pub async fn open_in_memory(environment: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        init_tables(&pool).await?;

        Ok(Self {
            pool,
            environment: environment.to_string(),
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Write the initial record produced at ingest
    pub async fn insert(&self, record: &TrackRecord) -> Result<()> {
        self.write_record(record, false).await
    }

    /// Write (or overwrite) a full record. Used for the target-environment
    /// write during promotion, where overwriting the same id is convergent.
    pub async fn put(&self, record: &TrackRecord) -> Result<()> {
        self.write_record(record, true).await
    }

    async fn write_record(&self, record: &TrackRecord, replace: bool) -> Result<()> {
        let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };
        let sql = format!(
            r#"
            {verb} INTO tracks (
                id, created_date, title, artist, genre, description, tags,
                filename, file_url, file_size, duration, format,
                bitrate, sample_rate, channels, file_hash, status,
                thumbnail_url, promoted_from, promotion_date, enriched_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        );

        sqlx::query(&sql)
            .bind(record.id.to_string())
            .bind(fmt_ts(&record.created_date))
            .bind(&record.title)
            .bind(&record.artist)
            .bind(&record.genre)
            .bind(&record.description)
            .bind(serde_json::to_string(&record.tags).unwrap_or_else(|_| "[]".to_string()))
            .bind(&record.filename)
            .bind(&record.file_url)
            .bind(record.file_size as i64)
            .bind(record.duration as i64)
            .bind(&record.format)
            .bind(record.bitrate.map(|v| v as i64))
            .bind(record.sample_rate.map(|v| v as i64))
            .bind(record.channels.map(|v| v as i64))
            .bind(&record.file_hash)
            .bind(record.status.as_str())
            .bind(&record.thumbnail_url)
            .bind(&record.promoted_from)
            .bind(record.promotion_date.as_ref().map(fmt_ts))
            .bind(record.enriched_at.as_ref().map(fmt_ts))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Load a record by id
    pub async fn get(&self, id: Uuid) -> Result<Option<TrackRecord>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM tracks
            WHERE id = ?
            LIMIT 1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_record(&r)).transpose()
    }

    /// Cheap existence probe, used by the promoter's idempotence check
    pub async fn record_exists(&self, id: Uuid) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Apply enrichment results and advance the record to `enhanced`.
    /// `None` fields keep the stored value (missing tags are not an error).
    pub async fn update_enrichment(
        &self,
        id: Uuid,
        created_date: &DateTime<Utc>,
        update: &EnrichmentUpdate,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tracks SET
                duration = ?,
                bitrate = COALESCE(?, bitrate),
                sample_rate = COALESCE(?, sample_rate),
                channels = COALESCE(?, channels),
                title = COALESCE(?, title),
                artist = COALESCE(?, artist),
                genre = COALESCE(?, genre),
                description = COALESCE(?, description),
                thumbnail_url = COALESCE(?, thumbnail_url),
                enriched_at = ?,
                status = 'enhanced'
            WHERE id = ? AND created_date = ?
            "#,
        )
        .bind(update.duration as i64)
        .bind(update.bitrate.map(|v| v as i64))
        .bind(update.sample_rate.map(|v| v as i64))
        .bind(update.channels.map(|v| v as i64))
        .bind(&update.title)
        .bind(&update.artist)
        .bind(&update.genre)
        .bind(&update.description)
        .bind(&update.thumbnail_url)
        .bind(fmt_ts(&Utc::now()))
        .bind(id.to_string())
        .bind(fmt_ts(created_date))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record the `promoted` transition. Only the promoter calls this; the
    /// metadata store is the single source of truth for promotion state.
    pub async fn mark_promoted(
        &self,
        id: Uuid,
        created_date: &DateTime<Utc>,
        promotion_date: &DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tracks
            SET status = 'promoted', promotion_date = ?
            WHERE id = ? AND created_date = ?
            "#,
        )
        .bind(fmt_ts(promotion_date))
        .bind(id.to_string())
        .bind(fmt_ts(created_date))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Terminal rejection, applied by operator tooling after a permanent
    /// validation failure
    pub async fn mark_rejected(&self, id: Uuid, created_date: &DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tracks
            SET status = 'rejected'
            WHERE id = ? AND created_date = ?
            "#,
        )
        .bind(id.to_string())
        .bind(fmt_ts(created_date))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Promotion candidates: not yet promoted or rejected, oldest first so
    /// no track starves behind newer uploads
    pub async fn list_promotable(&self, limit: i64) -> Result<Vec<TrackRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tracks
            WHERE status IN ('processed', 'enhanced')
            ORDER BY created_date ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    /// Browse support for external consumers, newest first
    pub async fn list_by_status(&self, status: TrackStatus, limit: i64) -> Result<Vec<TrackRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tracks
            WHERE status = ?
            ORDER BY created_date DESC
            LIMIT ?
            "#,
        )
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    /// Browse support for external consumers, newest first
    pub async fn list_by_genre(&self, genre: &str, limit: i64) -> Result<Vec<TrackRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tracks
            WHERE genre = ?
            ORDER BY created_date DESC
            LIMIT ?
            "#,
        )
        .bind(genre)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    /// Recent records regardless of status, newest first
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<TrackRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tracks
            ORDER BY created_date DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Stable RFC-3339 rendering; fixed fractional width keeps lexicographic
/// order equal to chronological order for the `created_date` indexes
fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp '{}': {}", s, e)))
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<TrackRecord> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| Error::Internal(format!("bad track id '{}': {}", id_str, e)))?;

    let status_str: String = row.get("status");
    let status = TrackStatus::parse(&status_str)
        .ok_or_else(|| Error::Internal(format!("unknown track status '{}'", status_str)))?;

    let tags_json: String = row.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    let created_date_str: String = row.get("created_date");
    let promotion_date: Option<String> = row.get("promotion_date");
    let enriched_at: Option<String> = row.get("enriched_at");

    Ok(TrackRecord {
        id,
        created_date: parse_ts(&created_date_str)?,
        title: row.get("title"),
        artist: row.get("artist"),
        genre: row.get("genre"),
        description: row.get("description"),
        tags,
        filename: row.get("filename"),
        file_url: row.get("file_url"),
        file_size: row.get::<i64, _>("file_size") as u64,
        duration: row.get::<i64, _>("duration") as u32,
        format: row.get("format"),
        bitrate: row.get::<Option<i64>, _>("bitrate").map(|v| v as u32),
        sample_rate: row.get::<Option<i64>, _>("sample_rate").map(|v| v as u32),
        channels: row.get::<Option<i64>, _>("channels").map(|v| v as u32),
        file_hash: row.get("file_hash"),
        status,
        thumbnail_url: row.get("thumbnail_url"),
        promoted_from: row.get("promoted_from"),
        promotion_date: promotion_date.as_deref().map(parse_ts).transpose()?,
        enriched_at: enriched_at.as_deref().map(parse_ts).transpose()?,
    })
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id TEXT NOT NULL,
            created_date TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            artist TEXT,
            genre TEXT NOT NULL DEFAULT 'unknown',
            description TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            filename TEXT NOT NULL,
            file_url TEXT NOT NULL,
            file_size INTEGER NOT NULL DEFAULT 0,
            duration INTEGER NOT NULL DEFAULT 0,
            format TEXT NOT NULL DEFAULT '',
            bitrate INTEGER,
            sample_rate INTEGER,
            channels INTEGER,
            file_hash TEXT,
            status TEXT NOT NULL DEFAULT 'processed',
            thumbnail_url TEXT,
            promoted_from TEXT,
            promotion_date TEXT,
            enriched_at TEXT,
            PRIMARY KEY (id, created_date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tracks_status ON tracks(status, created_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_genre ON tracks(genre, created_date)")
        .execute(pool)
        .await?;

    tracing::debug!("Track table and indexes initialized");

    Ok(())
}
