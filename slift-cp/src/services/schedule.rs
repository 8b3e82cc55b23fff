//! Scheduled batch trigger
//!
//! Fires `run_batch` on a fixed cadence. A tick that lands while the
//! previous batch is still running is delayed, not stacked; idempotent
//! promotion means an abandoned batch is simply finished by the next one.

use crate::services::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Spawn the recurring batch-promotion task
pub fn spawn_batch_schedule(
    orchestrator: Arc<Orchestrator>,
    period: Duration,
    max_promotions: usize,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so the cadence starts
        // one full period after startup
        ticker.tick().await;

        info!(
            period_secs = period.as_secs(),
            max_promotions = max_promotions,
            "Batch promotion schedule installed"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Batch promotion schedule stopped");
                    break;
                }
                _ = ticker.tick() => {
                    info!("Scheduled batch promotion triggered");
                    let summary = orchestrator.run_batch(max_promotions).await;
                    info!(
                        promoted = summary.promoted,
                        failed = summary.failed,
                        "Scheduled batch promotion finished"
                    );
                }
            }
        }
    })
}
