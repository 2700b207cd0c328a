//! Flattening of nested group membership.
//!
//! Traversal is an explicit depth-first walk, so nesting depth never grows
//! the call stack. Groups on the current path are tracked in `visiting`;
//! reaching one of them again truncates that edge and records a
//! [`SyncWarning::CycleDetected`].
//!
//! Completed sub-groups are memoized in a table shared by every whitelisted
//! group of the run. A sub-group whose subtree was cut short by a cycle to a
//! group *above* it is incomplete from any other entry point, so it is only
//! memoized when no truncated edge in its subtree points higher than itself.
//! Memo entries keep the warnings raised inside their subtree, so a group
//! reports the same warnings whether it was walked or served from the memo.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::SyncResult;
use crate::ids::SourceId;
use crate::model::{EffectiveMembership, PrincipalKind, SourceGroup};
use crate::plan::SyncWarning;
use crate::snapshot::SourceSnapshot;

/// A completed subtree: its leaves and the warnings raised below it.
#[derive(Debug)]
struct Subtree {
    leaves: BTreeSet<SourceId>,
    warnings: Vec<SyncWarning>,
}

/// Result of expanding one whitelisted group.
#[derive(Debug, Clone)]
pub struct Expansion {
    pub membership: EffectiveMembership,
    pub warnings: Vec<SyncWarning>,
}

struct Frame {
    group: Arc<SourceGroup>,
    next: usize,
    leaves: BTreeSet<SourceId>,
    warnings: Vec<SyncWarning>,
    /// Shallowest stack depth reached by a truncated edge in this subtree.
    low: usize,
}

impl Frame {
    fn new(group: Arc<SourceGroup>) -> Self {
        let mut warnings = Vec::new();
        note_skipped_members(&group, &mut warnings);
        Self {
            group,
            next: 0,
            leaves: BTreeSet::new(),
            warnings,
            low: usize::MAX,
        }
    }
}

/// Resolves whitelisted groups into their flattened leaf principals.
pub struct GroupExpander {
    snapshot: Arc<SourceSnapshot>,
    memo: Mutex<HashMap<SourceId, Arc<Subtree>>>,
}

impl GroupExpander {
    pub fn new(snapshot: Arc<SourceSnapshot>) -> Self {
        Self {
            snapshot,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Flattens `group_id` into the set of users and service principals
    /// reachable through any depth of nesting.
    ///
    /// Failing to fetch the root group is an error. A nested group that
    /// cannot be fetched for a non-fatal reason is skipped with a warning.
    #[instrument(skip_all, fields(group_id = %group_id))]
    pub async fn expand(&self, group_id: &SourceId) -> SyncResult<Expansion> {
        if let Some(subtree) = self.memoized(group_id).await {
            debug!(leaves = subtree.leaves.len(), "Expansion served from memo");
            let mut warnings = Vec::new();
            merge_warnings(&mut warnings, &subtree.warnings, group_id);
            return Ok(Expansion {
                membership: membership(group_id, &subtree.leaves),
                warnings,
            });
        }

        let root = self.snapshot.group(group_id).await?;

        let mut visiting: HashMap<SourceId, usize> = HashMap::new();
        visiting.insert(group_id.clone(), 0);
        let mut stack = vec![Frame::new(root)];

        loop {
            let depth = stack.len().saturating_sub(1);
            let Some(frame) = stack.last_mut() else {
                break;
            };

            if let Some(member) = frame.group.member_refs.get(frame.next).cloned() {
                frame.next += 1;

                if member.kind.is_leaf() {
                    frame.leaves.insert(member.id);
                    continue;
                }
                debug_assert_eq!(member.kind, PrincipalKind::Group);

                if let Some(&cycle_depth) = visiting.get(&member.id) {
                    frame.low = frame.low.min(cycle_depth);
                    let mut path: Vec<SourceId> =
                        stack[cycle_depth..].iter().map(|f| f.group.id().clone()).collect();
                    path.push(member.id.clone());
                    warn!(nested_group = %member.id, depth = path.len(), "Membership cycle truncated");
                    if let Some(frame) = stack.last_mut() {
                        frame.warnings.push(SyncWarning::CycleDetected {
                            root: group_id.clone(),
                            path,
                        });
                    }
                    continue;
                }

                if let Some(subtree) = self.memoized(&member.id).await {
                    frame.leaves.extend(subtree.leaves.iter().cloned());
                    merge_warnings(&mut frame.warnings, &subtree.warnings, group_id);
                    continue;
                }

                let nested = match self.snapshot.group(&member.id).await {
                    Ok(group) => group,
                    Err(e) if !e.is_fatal() => {
                        warn!(nested_group = %member.id, error = %e, "Skipping nested group");
                        frame.warnings.push(SyncWarning::UnresolvedPrincipal {
                            source_id: member.id,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                visiting.insert(member.id, depth + 1);
                stack.push(Frame::new(nested));
                continue;
            }

            // All direct members of the top frame are done.
            let Some(done) = stack.pop() else {
                break;
            };
            visiting.remove(done.group.id());

            let complete = done.low >= depth;
            if complete {
                self.memo.lock().await.insert(
                    done.group.id().clone(),
                    Arc::new(Subtree {
                        leaves: done.leaves.clone(),
                        warnings: done.warnings.clone(),
                    }),
                );
            }

            match stack.last_mut() {
                Some(parent) => {
                    parent.low = parent.low.min(done.low);
                    parent.leaves.extend(done.leaves);
                    merge_warnings(&mut parent.warnings, &done.warnings, group_id);
                }
                None => {
                    debug!(leaves = done.leaves.len(), "Expanded group");
                    return Ok(Expansion {
                        membership: EffectiveMembership {
                            group_id: group_id.clone(),
                            leaf_member_ids: done.leaves,
                        },
                        warnings: done.warnings,
                    });
                }
            }
        }

        Ok(Expansion {
            membership: membership(group_id, &BTreeSet::new()),
            warnings: Vec::new(),
        })
    }

    async fn memoized(&self, group_id: &SourceId) -> Option<Arc<Subtree>> {
        self.memo.lock().await.get(group_id).cloned()
    }
}

fn membership(group_id: &SourceId, leaves: &BTreeSet<SourceId>) -> EffectiveMembership {
    EffectiveMembership {
        group_id: group_id.clone(),
        leaf_member_ids: leaves.clone(),
    }
}

/// Appends `from` to `into`, attributing cycles to `root` and dropping
/// warnings already present (a sub-group reachable by two paths).
fn merge_warnings(into: &mut Vec<SyncWarning>, from: &[SyncWarning], root: &SourceId) {
    for warning in from {
        let warning = match warning {
            SyncWarning::CycleDetected { path, .. } => SyncWarning::CycleDetected {
                root: root.clone(),
                path: path.clone(),
            },
            other => other.clone(),
        };
        if !into.contains(&warning) {
            into.push(warning);
        }
    }
}

fn note_skipped_members(group: &SourceGroup, warnings: &mut Vec<SyncWarning>) {
    for skipped in &group.skipped_members {
        warnings.push(SyncWarning::UnsupportedMember {
            group_id: group.id().clone(),
            member_id: skipped.id.clone(),
            object_type: skipped.object_type.clone(),
        });
    }
}
