//! JSON file mapping store.
//!
//! The whole document is loaded at open and rewritten on flush through a
//! temporary file in the same directory followed by a rename.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::{insert_first_wins, IdentityMappingStore};
use crate::error::{SyncError, SyncResult};
use crate::ids::{SourceId, TargetId};
use crate::model::{IdentityMapping, PrincipalKind};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct MappingFile {
    version: u32,
    #[serde(default)]
    mappings: BTreeMap<SourceId, MappingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MappingEntry {
    target_id: TargetId,
    kind: PrincipalKind,
    created_at: DateTime<Utc>,
}

/// Mapping store persisted as a single JSON document.
#[derive(Debug)]
pub struct FileMappingStore {
    path: PathBuf,
    entries: RwLock<HashMap<SourceId, IdentityMapping>>,
    created_at: RwLock<HashMap<SourceId, DateTime<Utc>>>,
    dirty: AtomicBool,
    flush_lock: Mutex<()>,
}

impl FileMappingStore {
    /// Opens the store, treating a missing file as empty.
    pub async fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref().to_path_buf();

        let document = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str::<MappingFile>(&contents).map_err(|e| {
                SyncError::Store(format!("corrupt mapping file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Mapping file not found, starting empty");
                MappingFile {
                    version: FORMAT_VERSION,
                    mappings: BTreeMap::new(),
                }
            }
            Err(e) => {
                return Err(SyncError::Store(format!(
                    "failed to read mapping file {}: {e}",
                    path.display()
                )))
            }
        };

        if document.version != FORMAT_VERSION {
            return Err(SyncError::Store(format!(
                "unsupported mapping file version {} in {}",
                document.version,
                path.display()
            )));
        }

        let mut entries = HashMap::with_capacity(document.mappings.len());
        let mut created_at = HashMap::with_capacity(document.mappings.len());
        for (source_id, entry) in document.mappings {
            created_at.insert(source_id.clone(), entry.created_at);
            entries.insert(
                source_id.clone(),
                IdentityMapping::new(source_id, entry.target_id, entry.kind),
            );
        }

        info!(path = %path.display(), mappings = entries.len(), "Loaded identity mappings");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            created_at: RwLock::new(created_at),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn render(&self) -> SyncResult<String> {
        let entries = self.entries.read().await;
        let created_at = self.created_at.read().await;
        let now = Utc::now();

        let document = MappingFile {
            version: FORMAT_VERSION,
            mappings: entries
                .values()
                .map(|m| {
                    (
                        m.source_id.clone(),
                        MappingEntry {
                            target_id: m.target_id.clone(),
                            kind: m.kind,
                            created_at: created_at.get(&m.source_id).copied().unwrap_or(now),
                        },
                    )
                })
                .collect(),
        };

        Ok(serde_json::to_string_pretty(&document)?)
    }
}

#[async_trait]
impl IdentityMappingStore for FileMappingStore {
    async fn get(&self, source_id: &SourceId) -> SyncResult<Option<IdentityMapping>> {
        Ok(self.entries.read().await.get(source_id).cloned())
    }

    async fn put(&self, mapping: IdentityMapping) -> SyncResult<IdentityMapping> {
        let source_id = mapping.source_id.clone();
        let (effective, changed) = {
            let mut entries = self.entries.write().await;
            insert_first_wins(&mut entries, mapping)
        };
        if changed {
            self.created_at.write().await.insert(source_id, Utc::now());
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(effective)
    }

    async fn flush(&self) -> SyncResult<()> {
        let _guard = self.flush_lock.lock().await;
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let contents = match self.render().await {
            Ok(c) => c,
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                return Err(e);
            }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                self.dirty.store(true, Ordering::SeqCst);
                SyncError::Store(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let write = async {
            tokio::fs::write(&tmp_path, contents.as_bytes()).await?;
            tokio::fs::rename(&tmp_path, &self.path).await
        };
        if let Err(e) = write.await {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(SyncError::Store(format!(
                "failed to write mapping file {}: {e}",
                self.path.display()
            )));
        }

        debug!(path = %self.path.display(), "Flushed identity mappings");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileMappingStore::open(dir.path().join("mappings.json"))
            .await
            .unwrap();
        assert_eq!(store.len().await, 0);
        // Nothing to write yet.
        store.flush().await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_flush_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("mappings.json");

        let store = FileMappingStore::open(&path).await.unwrap();
        store
            .put(IdentityMapping::new(
                "u-1".into(),
                "1001".into(),
                PrincipalKind::User,
            ))
            .await
            .unwrap();
        store
            .put(IdentityMapping::new(
                "g-1".into(),
                "2001".into(),
                PrincipalKind::Group,
            ))
            .await
            .unwrap();
        store.flush().await.unwrap();

        let reopened = FileMappingStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        let user = reopened.get(&"u-1".into()).await.unwrap().unwrap();
        assert_eq!(user.target_id, TargetId::new("1001"));
        assert_eq!(user.kind, PrincipalKind::User);
    }

    #[tokio::test]
    async fn test_reassignment_is_ignored_across_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mappings.json");

        let store = FileMappingStore::open(&path).await.unwrap();
        store
            .put(IdentityMapping::new("u-1".into(), "1001".into(), PrincipalKind::User))
            .await
            .unwrap();
        store.flush().await.unwrap();

        let reopened = FileMappingStore::open(&path).await.unwrap();
        let effective = reopened
            .put(IdentityMapping::new("u-1".into(), "9999".into(), PrincipalKind::User))
            .await
            .unwrap();
        assert_eq!(effective.target_id, TargetId::new("1001"));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mappings.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = FileMappingStore::open(&path).await.unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
    }
}
