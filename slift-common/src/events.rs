//! Event types and broadcast bus for the Soundlift pipeline
//!
//! The event bus is the pipeline's notification output port: the ingest and
//! promotion services publish lifecycle events here, decoupled from their
//! return values, and consumers (SSE clients, alerting, audit tooling)
//! subscribe independently. Publishing is fire-and-forget.

use crate::model::{BatchSummary, PromotionOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Soundlift pipeline events
///
/// Serialized for SSE transmission with a `type` tag for consumer dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A new upload was ingested into the media area
    TrackIngested {
        track_id: Uuid,
        filename: String,
        environment: String,
        timestamp: DateTime<Utc>,
    },

    /// An upload was rejected at the ingest gates (no record written)
    IngestRejected {
        key: String,
        reason: String,
        environment: String,
        timestamp: DateTime<Utc>,
    },

    /// Enrichment completed and the record now carries accurate duration
    TrackEnriched {
        track_id: Uuid,
        duration: u32,
        timestamp: DateTime<Utc>,
    },

    /// One promotion attempt finished successfully (including the
    /// already-promoted no-op case)
    PromotionCompleted {
        outcome: PromotionOutcome,
        timestamp: DateTime<Utc>,
    },

    /// One promotion attempt failed; the outcome carries the error detail
    PromotionFailed {
        outcome: PromotionOutcome,
        timestamp: DateTime<Utc>,
    },

    /// A scheduled or manual batch run finished
    BatchCompleted {
        summary: BatchSummary,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Event name used as the SSE event type
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::TrackIngested { .. } => "TrackIngested",
            PipelineEvent::IngestRejected { .. } => "IngestRejected",
            PipelineEvent::TrackEnriched { .. } => "TrackEnriched",
            PipelineEvent::PromotionCompleted { .. } => "PromotionCompleted",
            PipelineEvent::PromotionFailed { .. } => "PromotionFailed",
            PipelineEvent::BatchCompleted { .. } => "BatchCompleted",
        }
    }
}

/// Broadcast bus carrying [`PipelineEvent`]s to all subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events; events emitted before subscription
    /// are not received
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` means no subscriber was listening
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case. Notification is
    /// fire-and-forget; durable history lives in the logs, not the bus.
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(PipelineEvent::TrackEnriched {
            track_id: Uuid::new_v4(),
            duration: 210,
            timestamp: Utc::now(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "TrackEnriched");
    }

    #[test]
    fn emit_lossy_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit_lossy(PipelineEvent::IngestRejected {
            key: "notes.txt".to_string(),
            reason: "unsupported extension".to_string(),
            environment: "dev".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = PipelineEvent::TrackIngested {
            track_id: Uuid::new_v4(),
            filename: "track.mp3".to_string(),
            environment: "dev".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TrackIngested");
    }
}
