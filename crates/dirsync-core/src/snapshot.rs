//! Per-run read-through cache over the source directory.
//!
//! Every group and principal is fetched at most once per run, no matter how
//! many whitelisted groups reach it or how many workers ask concurrently.
//! Failed fetches are not cached.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::error::SyncResult;
use crate::ids::SourceId;
use crate::model::{SourceGroup, SourcePrincipal};
use crate::retry::RetryPolicy;
use crate::traits::SourceDirectory;

type Slot<T> = Arc<OnceCell<Arc<T>>>;

/// Memoized, retrying view of a [`SourceDirectory`] for a single run.
pub struct SourceSnapshot {
    source: Arc<dyn SourceDirectory>,
    retry: RetryPolicy,
    groups: Mutex<HashMap<SourceId, Slot<SourceGroup>>>,
    principals: Mutex<HashMap<SourceId, Slot<SourcePrincipal>>>,
}

impl SourceSnapshot {
    pub fn new(source: Arc<dyn SourceDirectory>, retry: RetryPolicy) -> Self {
        Self {
            source,
            retry,
            groups: Mutex::new(HashMap::new()),
            principals: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the group snapshot, fetching it on first use.
    pub async fn group(&self, id: &SourceId) -> SyncResult<Arc<SourceGroup>> {
        let slot = slot_for(&self.groups, id).await;
        let group = slot
            .get_or_try_init(|| async {
                debug!(group_id = %id, "Fetching source group");
                let group = self
                    .retry
                    .execute("get_group", || self.source.get_group(id))
                    .await?;
                Ok::<_, crate::error::SyncError>(Arc::new(group))
            })
            .await?;
        Ok(group.clone())
    }

    /// Returns the principal snapshot, fetching it on first use.
    pub async fn principal(&self, id: &SourceId) -> SyncResult<Arc<SourcePrincipal>> {
        let slot = slot_for(&self.principals, id).await;
        let principal = slot
            .get_or_try_init(|| async {
                debug!(principal_id = %id, "Fetching source principal");
                let principal = self
                    .retry
                    .execute("get_principal", || self.source.get_principal(id))
                    .await?;
                Ok::<_, crate::error::SyncError>(Arc::new(principal))
            })
            .await?;
        Ok(principal.clone())
    }

    /// Looks a group up by display name.
    pub async fn find_group_by_name(&self, name: &str) -> SyncResult<Option<SourcePrincipal>> {
        self.retry
            .execute("find_group_by_name", || self.source.find_group_by_name(name))
            .await
    }
}

async fn slot_for<T>(slots: &Mutex<HashMap<SourceId, Slot<T>>>, id: &SourceId) -> Slot<T> {
    slots.lock().await.entry(id.clone()).or_default().clone()
}
