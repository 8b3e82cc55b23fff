//! HTTP API handlers for slift-ai

mod health;
mod ingest;
mod tracks;

pub use health::health;
pub use ingest::{enrich_track, ingest_object, ingest_scan};
pub use tracks::list_tracks;
