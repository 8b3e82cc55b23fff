//! Ingest service components

pub mod enrich;
pub mod ingest;
pub mod upload_scanner;

pub use enrich::EnrichmentHandler;
pub use ingest::{IngestHandler, IngestOutcome, SweepSummary};
pub use upload_scanner::UploadScanner;
