//! Collaborator traits for the source directory and the target account.
//!
//! Adapters translate transport failures into [`SyncError`](crate::SyncError)
//! variants; the engine adds retry, memoization and partial-failure handling.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::SyncResult;
use crate::ids::{SourceId, TargetId};
use crate::model::{PrincipalAttributes, PrincipalKind, SourceGroup, SourcePrincipal, TargetPrincipal};

/// What a create call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new principal was created with this id.
    Created(TargetId),
    /// The natural key was already taken, typically by a concurrent writer.
    /// Carries the principal that holds it.
    AlreadyExists(TargetPrincipal),
}

/// Read-only access to the upstream identity directory.
#[async_trait]
pub trait SourceDirectory: Send + Sync {
    /// Fetches a group with all of its direct member references.
    ///
    /// Implementations page internally and return the full snapshot.
    async fn get_group(&self, id: &SourceId) -> SyncResult<SourceGroup>;

    /// Fetches a single user or service principal.
    async fn get_principal(&self, id: &SourceId) -> SyncResult<SourcePrincipal>;

    /// Looks a group up by display name. `None` unless exactly one matches.
    async fn find_group_by_name(&self, name: &str) -> SyncResult<Option<SourcePrincipal>>;
}

/// Access to the downstream identity store.
///
/// There is intentionally no way to delete or disable a principal.
#[async_trait]
pub trait TargetAccount: Send + Sync {
    /// Finds a principal by its natural key.
    ///
    /// Fails with `PrincipalConflict` when the key is ambiguous.
    async fn find_principal(
        &self,
        kind: PrincipalKind,
        natural_key: &str,
    ) -> SyncResult<Option<TargetPrincipal>>;

    /// Fetches a principal by target id, `None` if it does not exist.
    async fn get_principal(
        &self,
        kind: PrincipalKind,
        target_id: &TargetId,
    ) -> SyncResult<Option<TargetPrincipal>>;

    /// Creates a principal, or reports the one already holding its
    /// natural key.
    async fn create_principal(
        &self,
        kind: PrincipalKind,
        attributes: &PrincipalAttributes,
    ) -> SyncResult<CreateOutcome>;

    /// Overwrites the given attributes; other attributes are left untouched.
    async fn update_principal_attrs(
        &self,
        kind: PrincipalKind,
        target_id: &TargetId,
        changed: &PrincipalAttributes,
    ) -> SyncResult<()>;

    /// Current direct members of a target group.
    async fn get_group_members(&self, group_id: &TargetId) -> SyncResult<BTreeSet<TargetId>>;

    /// Replaces the membership of a target group with exactly `members`.
    async fn set_group_members(
        &self,
        group_id: &TargetId,
        members: &BTreeSet<TargetId>,
    ) -> SyncResult<()>;
}
