//! In-memory target account with a mutation log.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use dirsync_core::profile::natural_key_attribute;
use dirsync_core::{
    CreateOutcome, PrincipalAttributes, PrincipalKind, SyncError, SyncResult, TargetAccount, TargetId,
    TargetPrincipal,
};

/// A mutating call that reached the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create { kind: PrincipalKind, target_id: TargetId },
    Update { target_id: TargetId },
    SetMembers { group_id: TargetId, members: BTreeSet<TargetId> },
}

#[derive(Default)]
struct State {
    principals: BTreeMap<TargetId, TargetPrincipal>,
    next_id: u64,
}

#[derive(Default)]
pub struct FakeTarget {
    state: Mutex<State>,
    mutations: Mutex<Vec<Mutation>>,
    pub finds: AtomicUsize,
    pub creates: AtomicUsize,
    /// Remaining create calls that fail with HTTP 429.
    pub throttle_creates: AtomicUsize,
    /// Every membership write fails with this status class when set.
    pub membership_failure: Mutex<Option<MembershipFailure>>,
    /// Principals whose reads fail as unparseable.
    pub unreadable: Mutex<BTreeSet<TargetId>>,
    /// Natural-key lookups miss, as with a lagging search index. Creates
    /// still see every principal.
    pub blind_finds: AtomicBool,
}

#[derive(Debug, Clone, Copy)]
pub enum MembershipFailure {
    Auth,
    NotFound,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an existing principal and returns its id.
    pub fn seed(&self, kind: PrincipalKind, display_name: &str, attributes: &[(&str, &str)]) -> TargetId {
        let mut state = self.state.lock().unwrap();
        let id = Self::allocate(&mut state);
        let mut principal = TargetPrincipal::new(id.clone(), kind);
        principal.display_name = Some(display_name.to_string());
        principal.active = Some(true);
        for (k, v) in attributes {
            principal.attributes.insert((*k).to_string(), (*v).to_string());
        }
        if kind == PrincipalKind::Group {
            principal.members = Some(BTreeSet::new());
        }
        state.principals.insert(id.clone(), principal);
        id
    }

    /// Removes a principal behind the engine's back.
    pub fn remove(&self, target_id: &TargetId) {
        self.state.lock().unwrap().principals.remove(target_id);
    }

    pub fn principal(&self, target_id: &TargetId) -> Option<TargetPrincipal> {
        self.state.lock().unwrap().principals.get(target_id).cloned()
    }

    pub fn principal_count(&self) -> usize {
        self.state.lock().unwrap().principals.len()
    }

    pub fn all_ids(&self) -> BTreeSet<TargetId> {
        self.state.lock().unwrap().principals.keys().cloned().collect()
    }

    pub fn members(&self, group_id: &TargetId) -> BTreeSet<TargetId> {
        self.principal(group_id)
            .and_then(|p| p.members)
            .unwrap_or_default()
    }

    pub fn by_key(&self, kind: PrincipalKind, key: &str) -> Vec<TargetPrincipal> {
        let attr = natural_key_attribute(kind);
        self.state
            .lock()
            .unwrap()
            .principals
            .values()
            .filter(|p| p.kind == kind && Self::key_of(p, attr) == Some(key))
            .cloned()
            .collect()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn clear_mutations(&self) {
        self.mutations.lock().unwrap().clear();
    }

    fn allocate(state: &mut State) -> TargetId {
        state.next_id += 1;
        TargetId::new(format!("{}", 1000 + state.next_id))
    }

    fn key_of<'a>(principal: &'a TargetPrincipal, attr: &str) -> Option<&'a str> {
        if attr == "displayName" {
            principal.display_name.as_deref()
        } else {
            principal.attribute(attr)
        }
    }

    fn log(&self, mutation: Mutation) {
        self.mutations.lock().unwrap().push(mutation);
    }
}

#[async_trait]
impl TargetAccount for FakeTarget {
    async fn find_principal(
        &self,
        kind: PrincipalKind,
        natural_key: &str,
    ) -> SyncResult<Option<TargetPrincipal>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        if self.blind_finds.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let mut matches = self.by_key(kind, natural_key);
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(SyncError::PrincipalConflict {
                kind,
                natural_key: natural_key.to_string(),
                reason: format!("{n} principals match"),
            }),
        }
    }

    async fn get_principal(
        &self,
        kind: PrincipalKind,
        target_id: &TargetId,
    ) -> SyncResult<Option<TargetPrincipal>> {
        if self.unreadable.lock().unwrap().contains(target_id) {
            return Err(SyncError::InvalidData(format!(
                "SCIM 400: unparseable principal {target_id}"
            )));
        }
        Ok(self.principal(target_id).filter(|p| p.kind == kind))
    }

    async fn create_principal(
        &self,
        kind: PrincipalKind,
        attributes: &PrincipalAttributes,
    ) -> SyncResult<CreateOutcome> {
        let key = match kind {
            PrincipalKind::Group => attributes.display_name.as_deref(),
            _ => attributes.get(natural_key_attribute(kind)),
        };
        if let Some(existing) = key.and_then(|key| self.by_key(kind, key).pop()) {
            return Ok(CreateOutcome::AlreadyExists(existing));
        }
        if self
            .throttle_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SyncError::TransientApi {
                status: Some(429),
                message: "Too Many Requests".to_string(),
                retry_after_secs: Some(0),
            });
        }
        self.creates.fetch_add(1, Ordering::SeqCst);

        let target_id = {
            let mut state = self.state.lock().unwrap();
            let id = Self::allocate(&mut state);
            let mut principal = TargetPrincipal::new(id.clone(), kind);
            principal.display_name = attributes.display_name.clone();
            principal.attributes = attributes.attributes.clone();
            principal.active = attributes.active;
            if kind == PrincipalKind::Group {
                principal.members = Some(BTreeSet::new());
            }
            state.principals.insert(id.clone(), principal);
            id
        };
        self.log(Mutation::Create {
            kind,
            target_id: target_id.clone(),
        });
        Ok(CreateOutcome::Created(target_id))
    }

    async fn update_principal_attrs(
        &self,
        _kind: PrincipalKind,
        target_id: &TargetId,
        changed: &PrincipalAttributes,
    ) -> SyncResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            let principal = state
                .principals
                .get_mut(target_id)
                .ok_or_else(|| SyncError::NotFound(format!("principal {target_id}")))?;
            if let Some(name) = &changed.display_name {
                principal.display_name = Some(name.clone());
            }
            for (k, v) in &changed.attributes {
                principal.attributes.insert(k.clone(), v.clone());
            }
            if let Some(active) = changed.active {
                principal.active = Some(active);
            }
        }
        self.log(Mutation::Update {
            target_id: target_id.clone(),
        });
        Ok(())
    }

    async fn get_group_members(&self, group_id: &TargetId) -> SyncResult<BTreeSet<TargetId>> {
        self.principal(group_id)
            .and_then(|p| p.members)
            .ok_or_else(|| SyncError::NotFound(format!("group {group_id}")))
    }

    async fn set_group_members(
        &self,
        group_id: &TargetId,
        members: &BTreeSet<TargetId>,
    ) -> SyncResult<()> {
        let failure = *self.membership_failure.lock().unwrap();
        match failure {
            Some(MembershipFailure::Auth) => {
                return Err(SyncError::AuthFailure("token revoked".to_string()))
            }
            Some(MembershipFailure::NotFound) => {
                return Err(SyncError::NotFound(format!("group {group_id}")))
            }
            None => {}
        }

        {
            let mut state = self.state.lock().unwrap();
            let group = state
                .principals
                .get_mut(group_id)
                .ok_or_else(|| SyncError::NotFound(format!("group {group_id}")))?;
            group.members = Some(members.clone());
        }
        self.log(Mutation::SetMembers {
            group_id: group_id.clone(),
            members: members.clone(),
        });
        Ok(())
    }
}
