//! slift-cp - Content Promotion service
//!
//! Built once per deployment from the configured source → target pair; a
//! deployment without a promotion source simply does not run this binary.

use anyhow::Result;
use slift_common::events::EventBus;
use slift_common::store::{BlobStore, MetadataStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use slift_cp::services::{
    schedule, EnvironmentHandles, Orchestrator, Promoter, ValidationPolicy, Validator,
};
use slift_cp::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting slift-cp (Content Promotion) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Configuration is resolved exactly once; a missing [promotion] section
    // is a startup error, not a runtime branch
    let config = slift_common::config::load()?;
    let (promotion, source_env, target_env) = config.promotion_pair()?;
    info!(
        "Promotion pair: {} -> {}",
        promotion.source, promotion.target
    );

    let source = EnvironmentHandles::new(
        promotion.source.clone(),
        MetadataStore::open(&source_env.database_path(), &promotion.source).await?,
        BlobStore::new(
            source_env.media_root(),
            &source_env.public_base_url,
            &promotion.source,
        )?,
    );
    let target = EnvironmentHandles::new(
        promotion.target.clone(),
        MetadataStore::open(&target_env.database_path(), &promotion.target).await?,
        BlobStore::new(
            target_env.media_root(),
            &target_env.public_base_url,
            &promotion.target,
        )?,
    );

    let event_bus = EventBus::new(100);
    let policy = ValidationPolicy::from_config(promotion);

    let promoter = Arc::new(Promoter::new(
        source.clone(),
        target,
        policy.clone(),
        event_bus.clone(),
    ));
    let validator = Validator::new(source.blobs.clone(), policy);
    let orchestrator = Arc::new(Orchestrator::new(
        promoter,
        source,
        validator,
        promotion.clone(),
        event_bus.clone(),
    ));

    // Recurring batch trigger (manual requests arrive over HTTP regardless)
    let cancel = CancellationToken::new();
    if promotion.schedule_hours > 0 {
        schedule::spawn_batch_schedule(
            Arc::clone(&orchestrator),
            Duration::from_secs(promotion.schedule_hours * 3600),
            promotion.max_promotions,
            cancel.clone(),
        );
        info!(
            "Batch schedule: every {}h, up to {} tracks",
            promotion.schedule_hours, promotion.max_promotions
        );
    }

    let listen_addr = promotion.listen_addr.clone();
    let state = AppState::new(orchestrator, event_bus);
    let app = slift_cp::build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("Listening on http://{}", listen_addr);

    axum::serve(listener, app).await?;
    cancel.cancel();

    Ok(())
}
