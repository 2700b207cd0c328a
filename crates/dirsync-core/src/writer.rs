//! Execution boundary towards the target account.
//!
//! All target calls of a run go through [`TargetWriter`], which adds retry
//! and cancellation. In dry-run mode every mutating call is replaced by a
//! record of the action that would have been applied; reads still reach the
//! target so the plan is computed exactly as in a live run.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{SyncError, SyncResult};
use crate::ids::{SourceId, TargetId};
use crate::model::{PrincipalAttributes, PrincipalKind, TargetPrincipal};
use crate::plan::{ActionRecord, ActionStatus, ReconciliationAction};
use crate::retry::RetryPolicy;
use crate::traits::{CreateOutcome, TargetAccount};

/// Result of [`TargetWriter::create_principal`].
#[derive(Debug, Clone)]
pub enum Creation {
    /// The principal was created, or would be under dry-run.
    Created(ActionRecord),
    /// The target already held the natural key; nothing was created.
    Adopted(TargetPrincipal),
}

pub struct TargetWriter {
    target: Arc<dyn TargetAccount>,
    retry: RetryPolicy,
    dry_run: bool,
    cancel: CancellationToken,
}

impl TargetWriter {
    pub fn new(
        target: Arc<dyn TargetAccount>,
        retry: RetryPolicy,
        dry_run: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            target,
            retry,
            dry_run,
            cancel,
        }
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn find_principal(
        &self,
        kind: PrincipalKind,
        natural_key: &str,
    ) -> SyncResult<Option<TargetPrincipal>> {
        self.retry
            .execute("find_principal", || self.target.find_principal(kind, natural_key))
            .await
    }

    /// Reads a principal. Pending dry-run ids never exist in the target.
    pub async fn get_principal(
        &self,
        kind: PrincipalKind,
        target_id: &TargetId,
    ) -> SyncResult<Option<TargetPrincipal>> {
        if target_id.is_pending() {
            return Ok(None);
        }
        self.retry
            .execute("get_principal", || self.target.get_principal(kind, target_id))
            .await
    }

    pub async fn get_group_members(&self, group_id: &TargetId) -> SyncResult<BTreeSet<TargetId>> {
        if group_id.is_pending() {
            return Ok(BTreeSet::new());
        }
        self.retry
            .execute("get_group_members", || self.target.get_group_members(group_id))
            .await
    }

    /// Creates a principal, or under dry-run assigns it a pending id.
    ///
    /// The returned record carries the id in its action. Any failure is
    /// returned as an error since nothing can reference the principal.
    /// A principal that already holds the natural key is handed back
    /// unchanged as [`Creation::Adopted`].
    #[instrument(skip_all, fields(kind = %kind, source_id = %source_id))]
    pub async fn create_principal(
        &self,
        kind: PrincipalKind,
        source_id: &SourceId,
        attributes: PrincipalAttributes,
    ) -> SyncResult<Creation> {
        self.ensure_not_cancelled()?;

        if self.dry_run {
            let target_id = TargetId::pending(source_id);
            debug!(target_id = %target_id, "Dry-run: would create principal");
            return Ok(Creation::Created(ActionRecord {
                action: ReconciliationAction::CreatePrincipal {
                    kind,
                    source_id: source_id.clone(),
                    target_id,
                    attributes,
                },
                status: ActionStatus::DryRun,
            }));
        }

        let outcome = self
            .retry
            .execute("create_principal", || {
                self.target.create_principal(kind, &attributes)
            })
            .await?;
        let target_id = match outcome {
            CreateOutcome::Created(target_id) => target_id,
            CreateOutcome::AlreadyExists(existing) => {
                info!(target_id = %existing.target_id, "Principal already exists");
                return Ok(Creation::Adopted(existing));
            }
        };
        info!(target_id = %target_id, "Created principal");

        Ok(Creation::Created(ActionRecord {
            action: ReconciliationAction::CreatePrincipal {
                kind,
                source_id: source_id.clone(),
                target_id,
                attributes,
            },
            status: ActionStatus::Applied,
        }))
    }

    /// Applies an update or membership action.
    ///
    /// Non-fatal failures come back as a `Failed` record; fatal ones (and
    /// cancellation) as an error.
    #[instrument(skip_all, fields(action = action.action_type(), target_id = %action.target_id()))]
    pub async fn apply(&self, action: ReconciliationAction) -> SyncResult<ActionRecord> {
        self.ensure_not_cancelled()?;

        if self.dry_run {
            debug!(%action, "Dry-run: would apply");
            return Ok(ActionRecord {
                action,
                status: ActionStatus::DryRun,
            });
        }

        let result = match &action {
            ReconciliationAction::UpdatePrincipalAttrs {
                kind,
                target_id,
                changed,
                ..
            } => {
                self.retry
                    .execute("update_principal_attrs", || {
                        self.target.update_principal_attrs(*kind, target_id, changed)
                    })
                    .await
            }
            ReconciliationAction::SetGroupMembership {
                target_group_id,
                members,
                ..
            } => {
                self.retry
                    .execute("set_group_members", || {
                        self.target.set_group_members(target_group_id, members)
                    })
                    .await
            }
            ReconciliationAction::CreatePrincipal { .. } => Err(SyncError::InvalidData(
                "create actions are applied through create_principal".to_string(),
            )),
        };

        match result {
            Ok(()) => {
                info!(%action, "Applied");
                Ok(ActionRecord {
                    action,
                    status: ActionStatus::Applied,
                })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(%action, error = %e, "Action failed");
                Ok(ActionRecord {
                    action,
                    status: ActionStatus::Failed {
                        reason: e.to_string(),
                    },
                })
            }
        }
    }

    fn ensure_not_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTarget {
        calls: Mutex<Vec<String>>,
        fail_membership: bool,
    }

    impl RecordingTarget {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl TargetAccount for RecordingTarget {
        async fn find_principal(
            &self,
            _kind: PrincipalKind,
            _natural_key: &str,
        ) -> SyncResult<Option<TargetPrincipal>> {
            self.record("find");
            Ok(None)
        }

        async fn get_principal(
            &self,
            _kind: PrincipalKind,
            _target_id: &TargetId,
        ) -> SyncResult<Option<TargetPrincipal>> {
            self.record("get");
            Ok(None)
        }

        async fn create_principal(
            &self,
            _kind: PrincipalKind,
            _attributes: &PrincipalAttributes,
        ) -> SyncResult<CreateOutcome> {
            self.record("create");
            Ok(CreateOutcome::Created(TargetId::new("1001")))
        }

        async fn update_principal_attrs(
            &self,
            _kind: PrincipalKind,
            _target_id: &TargetId,
            _changed: &PrincipalAttributes,
        ) -> SyncResult<()> {
            self.record("update");
            Ok(())
        }

        async fn get_group_members(&self, _group_id: &TargetId) -> SyncResult<BTreeSet<TargetId>> {
            self.record("members");
            Ok(BTreeSet::new())
        }

        async fn set_group_members(
            &self,
            _group_id: &TargetId,
            _members: &BTreeSet<TargetId>,
        ) -> SyncResult<()> {
            self.record("set_members");
            if self.fail_membership {
                return Err(SyncError::NotFound("group".into()));
            }
            Ok(())
        }
    }

    fn writer(target: Arc<RecordingTarget>, dry_run: bool) -> TargetWriter {
        TargetWriter::new(
            target,
            RetryPolicy::immediate(0),
            dry_run,
            CancellationToken::new(),
        )
    }

    fn expect_created(creation: Creation) -> ActionRecord {
        match creation {
            Creation::Created(record) => record,
            Creation::Adopted(existing) => panic!("unexpected adoption of {}", existing.target_id),
        }
    }

    fn membership() -> ReconciliationAction {
        ReconciliationAction::SetGroupMembership {
            source_group_id: "g1".into(),
            target_group_id: "2001".into(),
            members: ["1001".into()].into_iter().collect(),
        }
    }

    #[tokio::test]
    async fn test_dry_run_issues_no_mutations() {
        let target = Arc::new(RecordingTarget::default());
        let writer = writer(target.clone(), true);

        let created = expect_created(
            writer
                .create_principal(PrincipalKind::User, &"u1".into(), PrincipalAttributes::default())
                .await
                .unwrap(),
        );
        assert_eq!(created.status, ActionStatus::DryRun);
        assert_eq!(created.action.target_id(), &TargetId::new("pending:u1"));

        let applied = writer.apply(membership()).await.unwrap();
        assert_eq!(applied.status, ActionStatus::DryRun);
        assert!(target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pending_ids_are_not_read() {
        let target = Arc::new(RecordingTarget::default());
        let writer = writer(target.clone(), true);

        let pending = TargetId::pending(&"g1".into());
        assert!(writer.get_group_members(&pending).await.unwrap().is_empty());
        assert!(writer
            .get_principal(PrincipalKind::Group, &pending)
            .await
            .unwrap()
            .is_none());
        assert!(target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_live_create_returns_target_id() {
        let target = Arc::new(RecordingTarget::default());
        let writer = writer(target.clone(), false);

        let created = expect_created(
            writer
                .create_principal(PrincipalKind::User, &"u1".into(), PrincipalAttributes::default())
                .await
                .unwrap(),
        );
        assert_eq!(created.status, ActionStatus::Applied);
        assert_eq!(created.action.target_id(), &TargetId::new("1001"));
        assert_eq!(target.calls(), vec!["create"]);
    }

    #[tokio::test]
    async fn test_non_fatal_failure_is_recorded() {
        let target = Arc::new(RecordingTarget {
            fail_membership: true,
            ..Default::default()
        });
        let writer = writer(target, false);

        let record = writer.apply(membership()).await.unwrap();
        assert!(matches!(record.status, ActionStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_writer_refuses_writes() {
        let target = Arc::new(RecordingTarget::default());
        let cancel = CancellationToken::new();
        let writer = TargetWriter::new(target.clone(), RetryPolicy::immediate(0), false, cancel.clone());
        cancel.cancel();

        assert!(matches!(
            writer.apply(membership()).await,
            Err(SyncError::Cancelled)
        ));
        assert!(target.calls().is_empty());
    }
}
