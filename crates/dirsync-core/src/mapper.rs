//! Source-to-target identity resolution.
//!
//! Each source id is resolved at most once per run. Concurrent callers for
//! the same id share a single in-flight resolution: the first one performs
//! the lookups (and the create, if needed), the others wait and observe its
//! result. Only the performing caller receives the `CreatePrincipal` record,
//! so a principal shows up in exactly one group's report.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, instrument, warn};

use crate::error::{SyncError, SyncResult};
use crate::ids::{SourceId, TargetId};
use crate::model::{IdentityMapping, SourcePrincipal, TargetPrincipal};
use crate::plan::ActionRecord;
use crate::profile::{self, attr};
use crate::store::{FlushPolicy, IdentityMappingStore};
use crate::writer::{Creation, TargetWriter};

/// Where a resolved target id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOrigin {
    /// Mapping store hit; no target call was made.
    Cached,
    /// An existing target principal matched the natural key.
    Matched,
    /// The principal was created (or, under dry-run, would be).
    Created,
}

/// Outcome of resolving one source principal.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub target_id: TargetId,
    pub origin: ResolutionOrigin,
    /// Target record as seen during a natural-key match.
    pub current: Option<TargetPrincipal>,
}

/// A [`Resolution`] as seen by one caller.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub resolution: Resolution,
    /// Whether this caller performed the resolution rather than reusing
    /// another caller's result.
    pub performed: bool,
    /// The create record, for the performing caller only.
    pub created: Option<ActionRecord>,
}

type Slot = Arc<OnceCell<(Resolution, Option<ActionRecord>)>>;

pub struct IdentityMapper {
    store: Arc<dyn IdentityMappingStore>,
    writer: Arc<TargetWriter>,
    flush_policy: FlushPolicy,
    slots: Mutex<HashMap<SourceId, Slot>>,
}

impl IdentityMapper {
    pub fn new(
        store: Arc<dyn IdentityMappingStore>,
        writer: Arc<TargetWriter>,
        flush_policy: FlushPolicy,
    ) -> Self {
        Self {
            store,
            writer,
            flush_policy,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves `principal` to its target id: mapping store, then natural-key
    /// lookup in the target, then creation.
    ///
    /// Failures are not memoized; a later caller retries the resolution.
    pub async fn resolve(&self, principal: &SourcePrincipal) -> SyncResult<Resolved> {
        let slot = self
            .slots
            .lock()
            .await
            .entry(principal.id.clone())
            .or_default()
            .clone();

        let mut performed = false;
        let (resolution, record) = slot
            .get_or_try_init(|| {
                performed = true;
                self.resolve_uncached(principal)
            })
            .await?;

        Ok(Resolved {
            resolution: resolution.clone(),
            performed,
            created: if performed { record.clone() } else { None },
        })
    }

    #[instrument(skip_all, fields(source_id = %principal.id, kind = %principal.kind))]
    async fn resolve_uncached(
        &self,
        principal: &SourcePrincipal,
    ) -> SyncResult<(Resolution, Option<ActionRecord>)> {
        if let Some(mapping) = self.store.get(&principal.id).await? {
            if mapping.kind != principal.kind {
                warn!(
                    mapped_kind = %mapping.kind,
                    "Cached mapping has a different principal kind"
                );
            }
            debug!(target_id = %mapping.target_id, "Mapping cache hit");
            return Ok((
                Resolution {
                    target_id: mapping.target_id,
                    origin: ResolutionOrigin::Cached,
                    current: None,
                },
                None,
            ));
        }

        let natural_key = profile::require_natural_key(principal)?;

        if let Some(existing) = self
            .writer
            .find_principal(principal.kind, &natural_key)
            .await?
        {
            debug!(target_id = %existing.target_id, "Matched existing target principal");
            return self.adopt(principal, &natural_key, existing).await;
        }

        let created = match self
            .writer
            .create_principal(
                principal.kind,
                &principal.id,
                profile::desired_attributes(principal),
            )
            .await?
        {
            Creation::Created(record) => record,
            Creation::Adopted(existing) => {
                debug!(target_id = %existing.target_id, "Natural key taken during create");
                return self.adopt(principal, &natural_key, existing).await;
            }
        };
        let target_id = self
            .record(principal, created.action.target_id().clone())
            .await?;

        Ok((
            Resolution {
                target_id,
                origin: ResolutionOrigin::Created,
                current: None,
            },
            Some(created),
        ))
    }

    /// Maps `principal` onto a target principal that already holds its
    /// natural key, unless another source object owns it.
    async fn adopt(
        &self,
        principal: &SourcePrincipal,
        natural_key: &str,
        existing: TargetPrincipal,
    ) -> SyncResult<(Resolution, Option<ActionRecord>)> {
        if let Some(owner) = existing.attribute(attr::EXTERNAL_ID) {
            if owner != principal.id.as_str() {
                return Err(SyncError::PrincipalConflict {
                    kind: principal.kind,
                    natural_key: natural_key.to_string(),
                    reason: format!(
                        "target principal {} belongs to source object {owner}",
                        existing.target_id
                    ),
                });
            }
        }

        let target_id = self.record(principal, existing.target_id.clone()).await?;
        Ok((
            Resolution {
                target_id,
                origin: ResolutionOrigin::Matched,
                current: Some(existing),
            },
            None,
        ))
    }

    /// Persists a fresh mapping and returns the id now in effect.
    ///
    /// Nothing is recorded under dry-run.
    async fn record(&self, principal: &SourcePrincipal, target_id: TargetId) -> SyncResult<TargetId> {
        if self.writer.is_dry_run() {
            return Ok(target_id);
        }

        let effective = self
            .store
            .put(IdentityMapping::new(
                principal.id.clone(),
                target_id,
                principal.kind,
            ))
            .await?;

        if self.flush_policy == FlushPolicy::PerMapping {
            self.store.flush().await?;
        }
        Ok(effective.target_id)
    }
}
