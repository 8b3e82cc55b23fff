//! slift-ai - Audio Ingest service
//!
//! Owns one environment's upload and media areas. New uploads are validated,
//! copied into the managed media area, and recorded; enrichment fills in
//! accurate duration and embedded tags. A background watcher polls the
//! upload area so dropped files are picked up without an explicit trigger.

use anyhow::Result;
use slift_common::events::EventBus;
use slift_common::store::{BlobStore, MetadataStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use slift_ai::services::{IngestHandler, UploadScanner};
use slift_ai::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting slift-ai (Audio Ingest) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Configuration is resolved exactly once, then shared immutably
    let config = Arc::new(slift_common::config::load()?);
    let env_name = config.service.environment.clone();
    let env = config.environment(&env_name)?;
    info!("Environment: {} ({})", env_name, env.root_folder.display());

    std::fs::create_dir_all(env.upload_root())?;

    let store = MetadataStore::open(&env.database_path(), &env_name).await?;
    info!("Database: {}", env.database_path().display());

    let media = BlobStore::new(env.media_root(), &env.public_base_url, &env_name)?;
    let uploads = BlobStore::new(env.upload_root(), "", &env_name)?;

    let event_bus = EventBus::new(100);
    let state = AppState::new(config.clone(), store, media, uploads, event_bus);

    // Upload-area watcher: the filesystem rendition of an object-created
    // trigger
    if config.ingest.watch_interval_secs > 0 {
        tokio::spawn(watch_uploads(
            state.clone(),
            Duration::from_secs(config.ingest.watch_interval_secs),
        ));
        info!(
            "Upload watcher running every {}s",
            config.ingest.watch_interval_secs
        );
    }

    let app = slift_ai::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.service.listen_addr).await?;
    info!("Listening on http://{}", config.service.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Poll the upload area and ingest whatever has landed since the last sweep
async fn watch_uploads(state: AppState, period: Duration) {
    let scanner = UploadScanner::new();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let handler = IngestHandler::new(
            state.config.ingest.clone(),
            state.store.clone(),
            state.media.clone(),
            state.uploads.clone(),
            state.event_bus.clone(),
        );
        match handler.sweep(&scanner).await {
            Ok(summary) if summary.discovered > 0 => {
                info!(
                    ingested = summary.ingested,
                    failed = summary.failed,
                    "Upload watcher sweep finished"
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Upload watcher sweep failed: {}", e),
        }
    }
}
