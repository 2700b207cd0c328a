//! Reconciliation of whitelisted source groups into the target account.
//!
//! Each whitelisted group is processed as an independent unit, in order:
//! expand, resolve leaf members, resolve the group, diff group attributes,
//! diff membership. Groups run in parallel up to `max_parallel_groups`.
//! Leaf members shared by several groups are resolved (and synced) once per
//! run; the group that performed the work reports the resulting actions.
//!
//! Errors scoped to a principal or group become warnings. Fatal errors
//! cancel the run: no new group starts, no further write is issued, and the
//! run returns the first fatal error once in-flight groups wind down.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::error::{SyncError, SyncResult};
use crate::expander::GroupExpander;
use crate::ids::{SourceId, TargetId};
use crate::mapper::{IdentityMapper, ResolutionOrigin};
use crate::model::{PrincipalKind, SourcePrincipal};
use crate::plan::{ActionRecord, ActionStatus, GroupReport, ReconciliationAction, RunReport, SyncWarning};
use crate::profile;
use crate::retry::RetryPolicy;
use crate::snapshot::SourceSnapshot;
use crate::store::{FlushPolicy, IdentityMappingStore};
use crate::traits::{SourceDirectory, TargetAccount};
use crate::writer::TargetWriter;

/// Tunables for a [`Reconciler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Upper bound on groups processed concurrently.
    pub max_parallel_groups: usize,
    /// Also bring attributes of existing member principals up to date.
    pub sync_member_attributes: bool,
    pub flush_policy: FlushPolicy,
    pub retry: RetryPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_parallel_groups: 4,
            sync_member_attributes: true,
            flush_policy: FlushPolicy::EndOfRun,
            retry: RetryPolicy::default(),
        }
    }
}

/// Orchestrates full synchronization runs.
pub struct Reconciler {
    source: Arc<dyn SourceDirectory>,
    target: Arc<dyn TargetAccount>,
    store: Arc<dyn IdentityMappingStore>,
    config: ReconcilerConfig,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn SourceDirectory>,
        target: Arc<dyn TargetAccount>,
        store: Arc<dyn IdentityMappingStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            source,
            target,
            store,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts every run of this reconciler when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Synchronizes the given whitelisted groups.
    ///
    /// Under `dry_run` the report lists every action a live run would take,
    /// and no mutating call reaches the target or the mapping store.
    #[instrument(skip_all, fields(groups = group_ids.len(), dry_run = dry_run))]
    pub async fn run(&self, group_ids: &[SourceId], dry_run: bool) -> SyncResult<RunReport> {
        let mut report = RunReport::new(dry_run);
        let cancel = self.cancel.child_token();

        let mut seen = HashSet::new();
        let groups: Vec<SourceId> = group_ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();
        if groups.len() < group_ids.len() {
            debug!(
                duplicates = group_ids.len() - groups.len(),
                "Ignoring duplicate whitelisted groups"
            );
        }

        info!(run_id = %report.run_id, groups = groups.len(), dry_run, "Starting sync run");

        let ctx = Arc::new(RunContext::new(self, dry_run, cancel.clone()));
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_groups.max(1)));
        let mut workers = JoinSet::new();

        for (index, group_id) in groups.iter().cloned().enumerate() {
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            let span = tracing::info_span!("group", group_id = %group_id);
            workers.spawn(
                async move { (index, run_worker(ctx, semaphore, group_id).await) }.instrument(span),
            );
        }

        let mut outcomes: Vec<Option<GroupOutcome>> = groups.iter().map(|_| None).collect();
        let mut fatal: Option<SyncError> = None;

        while let Some(joined) = workers.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(error = %e, "Group worker panicked");
                    cancel.cancel();
                    fatal.get_or_insert(SyncError::Internal(e.to_string()));
                    continue;
                }
            };

            match result {
                Ok(outcome) => outcomes[index] = Some(outcome),
                Err(SyncError::Cancelled) => {
                    debug!(group_id = %groups[index], "Group abandoned after cancellation");
                }
                Err(e) if e.is_fatal() => {
                    error!(group_id = %groups[index], error = %e, "Fatal error, aborting run");
                    cancel.cancel();
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    warn!(group_id = %groups[index], error = %e, "Skipping group");
                    outcomes[index] = Some(GroupOutcome {
                        report: GroupReport::new(groups[index].clone()),
                        warnings: vec![SyncWarning::GroupSkipped {
                            group_id: groups[index].clone(),
                            reason: e.to_string(),
                        }],
                    });
                }
            }
        }

        for outcome in outcomes.into_iter().flatten() {
            report.warnings.extend(outcome.warnings);
            report.groups.push(outcome.report);
        }

        if fatal.is_none() && cancel.is_cancelled() {
            fatal = Some(SyncError::Cancelled);
        }

        if let Some(e) = fatal {
            if !dry_run {
                if let Err(flush_error) = self.store.flush().await {
                    error!(error = %flush_error, "Failed to flush identity mappings after abort");
                }
            }
            let summary = report.summary();
            warn!(
                applied = summary.by_status.get("applied").copied().unwrap_or(0),
                warnings = summary.warnings,
                "Run aborted"
            );
            return Err(e);
        }

        if !dry_run {
            self.store.flush().await?;
        }

        report.finished_at = Some(chrono::Utc::now());
        let summary = report.summary();
        info!(
            run_id = %report.run_id,
            groups = summary.groups,
            actions = summary.total_actions,
            failed = summary.failed(),
            warnings = summary.warnings,
            "Sync run finished"
        );
        Ok(report)
    }
}

async fn run_worker(
    ctx: Arc<RunContext>,
    semaphore: Arc<Semaphore>,
    group_id: SourceId,
) -> SyncResult<GroupOutcome> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| SyncError::Cancelled)?;
    if ctx.cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    ctx.sync_group(group_id).await
}

struct GroupOutcome {
    report: GroupReport,
    warnings: Vec<SyncWarning>,
}

/// Resolution and sync of one leaf principal, shared by every group of the
/// run that contains it.
#[derive(Debug, Clone, Default)]
struct LeafOutcome {
    /// `None` when the principal could not be mapped.
    target_id: Option<TargetId>,
    records: Vec<ActionRecord>,
    warnings: Vec<SyncWarning>,
}

/// State shared by the workers of a single run.
struct RunContext {
    snapshot: Arc<SourceSnapshot>,
    expander: GroupExpander,
    mapper: IdentityMapper,
    writer: Arc<TargetWriter>,
    sync_member_attributes: bool,
    cancel: CancellationToken,
    leaves: Mutex<HashMap<SourceId, Arc<OnceCell<LeafOutcome>>>>,
}

impl RunContext {
    fn new(reconciler: &Reconciler, dry_run: bool, cancel: CancellationToken) -> Self {
        let config = &reconciler.config;
        let snapshot = Arc::new(SourceSnapshot::new(
            reconciler.source.clone(),
            config.retry.clone(),
        ));
        let writer = Arc::new(TargetWriter::new(
            reconciler.target.clone(),
            config.retry.clone(),
            dry_run,
            cancel.clone(),
        ));

        Self {
            expander: GroupExpander::new(snapshot.clone()),
            mapper: IdentityMapper::new(
                reconciler.store.clone(),
                writer.clone(),
                config.flush_policy,
            ),
            snapshot,
            writer,
            sync_member_attributes: config.sync_member_attributes,
            cancel,
            leaves: Mutex::new(HashMap::new()),
        }
    }

    async fn sync_group(&self, group_id: SourceId) -> SyncResult<GroupOutcome> {
        let mut report = GroupReport::new(group_id.clone());
        let mut warnings = Vec::new();

        let expansion = self.expander.expand(&group_id).await?;
        warnings.extend(expansion.warnings);
        report.leaf_count = expansion.membership.leaf_member_ids.len();

        let group = self.snapshot.group(&group_id).await?;
        report.display_name = Some(group.principal.display_name.clone());

        let mut desired = BTreeSet::new();
        for leaf_id in &expansion.membership.leaf_member_ids {
            let (outcome, performed) = self.leaf(leaf_id).await?;
            if let Some(target_id) = outcome.target_id {
                desired.insert(target_id);
            }
            if performed {
                report.actions.extend(outcome.records);
                warnings.extend(outcome.warnings);
            }
        }

        let resolved = match self.mapper.resolve(&group.principal).await {
            Ok(resolved) => resolved,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warnings.push(resolution_warning(&group.principal, &e));
                warnings.push(SyncWarning::GroupSkipped {
                    group_id: group_id.clone(),
                    reason: e.to_string(),
                });
                return Ok(GroupOutcome { report, warnings });
            }
        };
        let target_group_id = resolved.resolution.target_id.clone();
        report.target_id = Some(target_group_id.clone());
        report.actions.extend(resolved.created);

        let current_members = if resolved.resolution.origin == ResolutionOrigin::Created {
            BTreeSet::new()
        } else {
            let current = match resolved.resolution.current {
                Some(current) => Some(current),
                None => {
                    self.writer
                        .get_principal(PrincipalKind::Group, &target_group_id)
                        .await?
                }
            };
            let Some(current) = current else {
                warn!(target_id = %target_group_id, "Mapped target group no longer exists");
                warnings.push(SyncWarning::StaleMapping {
                    source_id: group_id.clone(),
                    target_id: target_group_id,
                });
                warnings.push(SyncWarning::GroupSkipped {
                    group_id,
                    reason: "mapped target group no longer exists".to_string(),
                });
                return Ok(GroupOutcome { report, warnings });
            };

            let desired_attrs = profile::desired_attributes(&group.principal);
            if let Some(changed) =
                profile::attribute_changes(PrincipalKind::Group, &desired_attrs, &current)
            {
                let record = self
                    .writer
                    .apply(ReconciliationAction::UpdatePrincipalAttrs {
                        kind: PrincipalKind::Group,
                        source_id: group_id.clone(),
                        target_id: target_group_id.clone(),
                        changed,
                    })
                    .await?;
                note_failure(&record, &mut warnings);
                report.actions.push(record);
            }

            self.writer.get_group_members(&target_group_id).await?
        };

        if desired != current_members {
            debug!(
                desired = desired.len(),
                current = current_members.len(),
                "Membership differs"
            );
            let record = self
                .writer
                .apply(ReconciliationAction::SetGroupMembership {
                    source_group_id: group_id.clone(),
                    target_group_id,
                    members: desired,
                })
                .await?;
            note_failure(&record, &mut warnings);
            report.actions.push(record);
        }

        Ok(GroupOutcome { report, warnings })
    }

    /// Resolves and syncs a leaf principal once per run.
    ///
    /// Returns the shared outcome and whether this caller produced it.
    async fn leaf(&self, leaf_id: &SourceId) -> SyncResult<(LeafOutcome, bool)> {
        let slot = self
            .leaves
            .lock()
            .await
            .entry(leaf_id.clone())
            .or_default()
            .clone();

        let mut performed = false;
        let outcome = slot
            .get_or_try_init(|| {
                performed = true;
                self.sync_leaf(leaf_id)
            })
            .await?;
        Ok((outcome.clone(), performed))
    }

    #[instrument(skip_all, fields(source_id = %leaf_id))]
    async fn sync_leaf(&self, leaf_id: &SourceId) -> SyncResult<LeafOutcome> {
        let mut outcome = LeafOutcome::default();

        let principal = match self.snapshot.principal(leaf_id).await {
            Ok(principal) => principal,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Member could not be fetched");
                outcome.warnings.push(SyncWarning::UnresolvedPrincipal {
                    source_id: leaf_id.clone(),
                    reason: e.to_string(),
                });
                return Ok(outcome);
            }
        };

        let resolved = match self.mapper.resolve(&principal).await {
            Ok(resolved) => resolved,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Member could not be resolved");
                outcome.warnings.push(resolution_warning(&principal, &e));
                return Ok(outcome);
            }
        };
        outcome.records.extend(resolved.created);
        let resolution = resolved.resolution;

        let check_current = self.sync_member_attributes
            && resolved.performed
            && resolution.origin != ResolutionOrigin::Created;
        if check_current {
            let current = match resolution.current {
                Some(current) => Some(current),
                None => match self
                    .writer
                    .get_principal(principal.kind, &resolution.target_id)
                    .await
                {
                    Ok(current) => current,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(error = %e, "Current target record could not be read");
                        outcome.warnings.push(SyncWarning::TargetReadFailed {
                            source_id: leaf_id.clone(),
                            target_id: resolution.target_id.clone(),
                            reason: e.to_string(),
                        });
                        outcome.target_id = Some(resolution.target_id);
                        return Ok(outcome);
                    }
                },
            };
            let Some(current) = current else {
                warn!(target_id = %resolution.target_id, "Mapped target principal no longer exists");
                outcome.warnings.push(SyncWarning::StaleMapping {
                    source_id: leaf_id.clone(),
                    target_id: resolution.target_id,
                });
                return Ok(outcome);
            };

            let desired = profile::desired_attributes(&principal);
            if let Some(changed) = profile::attribute_changes(principal.kind, &desired, &current) {
                let record = self
                    .writer
                    .apply(ReconciliationAction::UpdatePrincipalAttrs {
                        kind: principal.kind,
                        source_id: leaf_id.clone(),
                        target_id: resolution.target_id.clone(),
                        changed,
                    })
                    .await?;
                note_failure(&record, &mut outcome.warnings);
                outcome.records.push(record);
            }
        }

        outcome.target_id = Some(resolution.target_id);
        Ok(outcome)
    }
}

/// Warning for a principal that could not be mapped.
fn resolution_warning(principal: &SourcePrincipal, error: &SyncError) -> SyncWarning {
    match error {
        SyncError::PrincipalConflict {
            kind,
            natural_key,
            reason,
        } => SyncWarning::PrincipalConflict {
            source_id: principal.id.clone(),
            kind: *kind,
            natural_key: natural_key.clone(),
            reason: reason.clone(),
        },
        other => SyncWarning::UnresolvedPrincipal {
            source_id: principal.id.clone(),
            reason: other.to_string(),
        },
    }
}

fn note_failure(record: &ActionRecord, warnings: &mut Vec<SyncWarning>) {
    if let ActionStatus::Failed { reason } = &record.status {
        warnings.push(SyncWarning::ActionFailed {
            action: record.action.to_string(),
            reason: reason.clone(),
        });
    }
}
