//! Storage backends
//!
//! # Architecture
//!
//! The mapping engine itself performs no I/O. A backend receives the rows the
//! D2R translator accumulated and hands them back as one cursor per doc part:
//!
//! ```text
//! D2RTranslator ──→ CollectionDataAccumulator ──→ StorageBackend::write
//! StorageBackend::read_documents ──→ doc-part cursors ──→ R2DTranslator
//! ```
//!
//! Every backend also describes its naming rules through
//! [`constraints::IdentifierConstraints`].

pub mod constraints;
pub mod memory;

use crate::d2r::CollectionDataAccumulator;
use crate::document::ToroDocument;
use crate::error::Result;
use crate::meta::MetaSnapshot;
use crate::rid::RidMark;
use async_trait::async_trait;

/// Storage backend trait
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist every row of `data`. Tables are created on first use.
    async fn write(&self, snapshot: &MetaSnapshot, data: &CollectionDataAccumulator) -> Result<()>;

    /// Read every document of `database.collection`.
    async fn read_documents(
        &self,
        snapshot: &MetaSnapshot,
        database: &str,
        collection: &str,
    ) -> Result<Vec<ToroDocument>>;

    /// Highest persisted rid of every doc part known to `snapshot`.
    async fn rid_high_water_marks(&self, snapshot: &MetaSnapshot) -> Result<Vec<RidMark>>;
}
