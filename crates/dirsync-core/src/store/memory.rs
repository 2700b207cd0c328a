//! In-memory mapping store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{insert_first_wins, IdentityMappingStore};
use crate::error::SyncResult;
use crate::ids::SourceId;
use crate::model::IdentityMapping;

/// Mapping store that lives for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    entries: RwLock<HashMap<SourceId, IdentityMapping>>,
}

impl MemoryMappingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with mappings.
    #[must_use]
    pub fn with_mappings(mappings: impl IntoIterator<Item = IdentityMapping>) -> Self {
        let entries = mappings
            .into_iter()
            .map(|m| (m.source_id.clone(), m))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// All mappings, sorted by source id.
    pub async fn snapshot(&self) -> Vec<IdentityMapping> {
        let mut all: Vec<_> = self.entries.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        all
    }
}

#[async_trait]
impl IdentityMappingStore for MemoryMappingStore {
    async fn get(&self, source_id: &SourceId) -> SyncResult<Option<IdentityMapping>> {
        Ok(self.entries.read().await.get(source_id).cloned())
    }

    async fn put(&self, mapping: IdentityMapping) -> SyncResult<IdentityMapping> {
        let mut entries = self.entries.write().await;
        Ok(insert_first_wins(&mut entries, mapping).0)
    }

    async fn flush(&self) -> SyncResult<()> {
        Ok(())
    }
}
