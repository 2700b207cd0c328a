//! Identity mapping store: the persistent `source id -> target id` cache.
//!
//! The engine only sees [`IdentityMappingStore`]; backends decide where the
//! mappings live. Entries are never removed and a target id, once recorded,
//! is never reassigned.

mod file;
mod memory;

pub use file::FileMappingStore;
pub use memory::MemoryMappingStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::error::SyncResult;
use crate::ids::SourceId;
use crate::model::IdentityMapping;

/// Key-value store for identity mappings.
#[async_trait]
pub trait IdentityMappingStore: Send + Sync {
    /// Looks up the mapping for a source object.
    async fn get(&self, source_id: &SourceId) -> SyncResult<Option<IdentityMapping>>;

    /// Records a mapping and returns the mapping now in effect.
    ///
    /// If the source id is already mapped, the existing entry wins.
    async fn put(&self, mapping: IdentityMapping) -> SyncResult<IdentityMapping>;

    /// Persists buffered writes to the backing storage.
    async fn flush(&self) -> SyncResult<()>;
}

/// When the reconciler persists new mappings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Once, after all groups were processed.
    #[default]
    EndOfRun,
    /// After every newly recorded mapping.
    PerMapping,
}

/// Applies first-write-wins semantics to an in-memory map.
///
/// Returns the effective mapping and whether the map changed.
pub(crate) fn insert_first_wins(
    entries: &mut HashMap<SourceId, IdentityMapping>,
    mapping: IdentityMapping,
) -> (IdentityMapping, bool) {
    match entries.get(&mapping.source_id) {
        Some(existing) => {
            if existing.target_id != mapping.target_id {
                warn!(
                    source_id = %mapping.source_id,
                    existing = %existing.target_id,
                    rejected = %mapping.target_id,
                    "Ignoring attempt to reassign mapped target id"
                );
            }
            (existing.clone(), false)
        }
        None => {
            entries.insert(mapping.source_id.clone(), mapping.clone());
            (mapping, true)
        }
    }
}
