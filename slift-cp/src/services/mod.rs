//! Promotion service components

pub mod orchestrator;
pub mod promoter;
pub mod schedule;
pub mod validator;

pub use orchestrator::{Candidate, Orchestrator};
pub use promoter::{PromotionReport, Promoter};
pub use validator::{PromotionMode, ValidationPolicy, Validator};

use slift_common::store::{BlobStore, MetadataStore};

/// Access capabilities for one environment: its metadata store and its
/// media area. The promoter receives one of these per side of the
/// promotion pair; whatever credentials or paths sit underneath stay out
/// of the promotion logic.
#[derive(Clone)]
pub struct EnvironmentHandles {
    pub name: String,
    pub store: MetadataStore,
    pub blobs: BlobStore,
}

impl EnvironmentHandles {
    pub fn new(name: impl Into<String>, store: MetadataStore, blobs: BlobStore) -> Self {
        Self {
            name: name.into(),
            store,
            blobs,
        }
    }
}
