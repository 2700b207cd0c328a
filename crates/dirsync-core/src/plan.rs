//! Action plan and run reporting.
//!
//! The action enum has no delete variant: the engine can add principals,
//! update their attributes and replace group membership edges, nothing else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::ids::{SourceId, TargetId};
use crate::model::{PrincipalAttributes, PrincipalKind};

/// One step of a reconciliation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconciliationAction {
    /// Create a principal that has no counterpart in the target yet.
    CreatePrincipal {
        kind: PrincipalKind,
        source_id: SourceId,
        /// Id assigned by the target, or a pending id under dry-run.
        target_id: TargetId,
        attributes: PrincipalAttributes,
    },
    /// Overwrite attributes that drifted from the source.
    UpdatePrincipalAttrs {
        kind: PrincipalKind,
        source_id: SourceId,
        target_id: TargetId,
        changed: PrincipalAttributes,
    },
    /// Replace the membership of a target group with exactly `members`.
    SetGroupMembership {
        source_group_id: SourceId,
        target_group_id: TargetId,
        members: BTreeSet<TargetId>,
    },
}

impl ReconciliationAction {
    /// Stable label used for counting and logging.
    #[must_use]
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::CreatePrincipal { .. } => "create_principal",
            Self::UpdatePrincipalAttrs { .. } => "update_principal_attrs",
            Self::SetGroupMembership { .. } => "set_group_membership",
        }
    }

    /// Target object the action is about.
    #[must_use]
    pub fn target_id(&self) -> &TargetId {
        match self {
            Self::CreatePrincipal { target_id, .. } | Self::UpdatePrincipalAttrs { target_id, .. } => {
                target_id
            }
            Self::SetGroupMembership {
                target_group_id, ..
            } => target_group_id,
        }
    }
}

impl fmt::Display for ReconciliationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatePrincipal {
                kind, source_id, ..
            } => write!(f, "create {kind} for {source_id}"),
            Self::UpdatePrincipalAttrs {
                kind, target_id, ..
            } => write!(f, "update {kind} {target_id}"),
            Self::SetGroupMembership {
                target_group_id,
                members,
                ..
            } => write!(
                f,
                "set membership of group {target_group_id} ({} members)",
                members.len()
            ),
        }
    }
}

/// What happened to a planned action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Applied,
    /// Recorded only; dry-run mode.
    DryRun,
    Failed { reason: String },
}

impl ActionStatus {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::DryRun => "dry_run",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A planned action together with its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: ReconciliationAction,
    #[serde(flatten)]
    pub status: ActionStatus,
}

/// Non-fatal problems collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncWarning {
    /// Nested membership loops back to a group on the current path.
    CycleDetected { root: SourceId, path: Vec<SourceId> },
    /// A member could not be mapped to a target principal and was skipped.
    UnresolvedPrincipal { source_id: SourceId, reason: String },
    /// The target has an ambiguous or foreign principal for the natural key.
    PrincipalConflict {
        source_id: SourceId,
        kind: PrincipalKind,
        natural_key: String,
        reason: String,
    },
    /// A cached mapping points at a principal that no longer exists.
    StaleMapping { source_id: SourceId, target_id: TargetId },
    /// The current target record could not be read, so its attributes were
    /// left alone. Membership still uses the mapped id.
    TargetReadFailed {
        source_id: SourceId,
        target_id: TargetId,
        reason: String,
    },
    /// A whitelisted group was not synchronized.
    GroupSkipped { group_id: SourceId, reason: String },
    /// A planned write failed without aborting the run.
    ActionFailed { action: String, reason: String },
    /// A member of an object type the target cannot hold.
    UnsupportedMember {
        group_id: SourceId,
        member_id: SourceId,
        object_type: String,
    },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CycleDetected { root, path } => {
                let path: Vec<&str> = path.iter().map(SourceId::as_str).collect();
                write!(f, "cycle below group {root}: {}", path.join(" -> "))
            }
            Self::UnresolvedPrincipal { source_id, reason } => {
                write!(f, "principal {source_id} skipped: {reason}")
            }
            Self::PrincipalConflict {
                source_id,
                kind,
                natural_key,
                reason,
            } => write!(
                f,
                "{kind} {source_id} conflicts on '{natural_key}': {reason}"
            ),
            Self::StaleMapping {
                source_id,
                target_id,
            } => write!(
                f,
                "mapping {source_id} -> {target_id} points at a missing target principal"
            ),
            Self::TargetReadFailed {
                source_id,
                target_id,
                reason,
            } => write!(
                f,
                "attributes of {source_id} ({target_id}) not checked: {reason}"
            ),
            Self::GroupSkipped { group_id, reason } => {
                write!(f, "group {group_id} skipped: {reason}")
            }
            Self::ActionFailed { action, reason } => write!(f, "{action} failed: {reason}"),
            Self::UnsupportedMember {
                group_id,
                member_id,
                object_type,
            } => write!(
                f,
                "member {member_id} of group {group_id} has unsupported type {object_type}"
            ),
        }
    }
}

/// Outcome of reconciling one whitelisted group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReport {
    pub group_id: SourceId,
    pub display_name: Option<String>,
    pub target_id: Option<TargetId>,
    /// Size of the flattened source membership.
    pub leaf_count: usize,
    pub actions: Vec<ActionRecord>,
}

impl GroupReport {
    pub fn new(group_id: SourceId) -> Self {
        Self {
            group_id,
            display_name: None,
            target_id: None,
            leaf_count: 0,
            actions: Vec::new(),
        }
    }
}

/// Everything a run did (or, under dry-run, would do).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub groups: Vec<GroupReport>,
    pub warnings: Vec<SyncWarning>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            groups: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// All planned actions in group order.
    pub fn actions(&self) -> impl Iterator<Item = &ReconciliationAction> {
        self.groups
            .iter()
            .flat_map(|g| g.actions.iter().map(|r| &r.action))
    }

    /// All action records in group order.
    pub fn records(&self) -> impl Iterator<Item = &ActionRecord> {
        self.groups.iter().flat_map(|g| g.actions.iter())
    }

    /// True when the target already matched the source.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.actions().next().is_none()
    }

    /// Report for one whitelisted group.
    #[must_use]
    pub fn group(&self, group_id: &SourceId) -> Option<&GroupReport> {
        self.groups.iter().find(|g| &g.group_id == group_id)
    }

    /// Aggregate counters for logging.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            groups: self.groups.len() as u32,
            warnings: self.warnings.len() as u32,
            ..Default::default()
        };

        for record in self.records() {
            summary.total_actions += 1;
            *summary
                .by_type
                .entry(record.action.action_type().to_string())
                .or_insert(0) += 1;
            *summary
                .by_status
                .entry(record.status.label().to_string())
                .or_insert(0) += 1;

            if let ReconciliationAction::CreatePrincipal { kind, .. } = &record.action {
                *summary.created.entry(kind.to_string()).or_insert(0) += 1;
            }
        }

        summary
    }
}

/// Counters derived from a [`RunReport`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub groups: u32,
    pub total_actions: u32,
    pub warnings: u32,
    pub by_type: BTreeMap<String, u32>,
    pub by_status: BTreeMap<String, u32>,
    /// Created principals by kind.
    pub created: BTreeMap<String, u32>,
}

impl RunSummary {
    /// Number of failed actions.
    #[must_use]
    pub fn failed(&self) -> u32 {
        self.by_status.get("failed").copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(kind: PrincipalKind, id: &str) -> ReconciliationAction {
        ReconciliationAction::CreatePrincipal {
            kind,
            source_id: SourceId::new(id),
            target_id: TargetId::new(format!("t-{id}")),
            attributes: PrincipalAttributes::default(),
        }
    }

    #[test]
    fn test_summary_counts_by_type_and_status() {
        let mut report = RunReport::new(false);
        let mut group = GroupReport::new(SourceId::new("g1"));
        group.actions.push(ActionRecord {
            action: create(PrincipalKind::User, "u1"),
            status: ActionStatus::Applied,
        });
        group.actions.push(ActionRecord {
            action: create(PrincipalKind::User, "u2"),
            status: ActionStatus::Applied,
        });
        group.actions.push(ActionRecord {
            action: ReconciliationAction::SetGroupMembership {
                source_group_id: SourceId::new("g1"),
                target_group_id: TargetId::new("t-g1"),
                members: BTreeSet::new(),
            },
            status: ActionStatus::Failed {
                reason: "boom".into(),
            },
        });
        report.groups.push(group);

        let summary = report.summary();
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.total_actions, 3);
        assert_eq!(summary.by_type["create_principal"], 2);
        assert_eq!(summary.created["User"], 2);
        assert_eq!(summary.failed(), 1);
        assert!(!report.is_noop());
    }

    #[test]
    fn test_action_serializes_with_type_tag() {
        let json = serde_json::to_value(create(PrincipalKind::Group, "g1")).unwrap();
        assert_eq!(json["type"], "create_principal");
        assert_eq!(json["kind"], "Group");
        assert_eq!(json["target_id"], "t-g1");
    }

    #[test]
    fn test_cycle_warning_display() {
        let warning = SyncWarning::CycleDetected {
            root: SourceId::new("A"),
            path: vec![SourceId::new("A"), SourceId::new("B"), SourceId::new("A")],
        };
        assert_eq!(warning.to_string(), "cycle below group A: A -> B -> A");
    }
}
