//! In-memory source directory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use dirsync_core::profile::source_attr;
use dirsync_core::{
    MemberRef, PrincipalKind, SourceDirectory, SourceGroup, SourceId, SourcePrincipal, SyncError,
    SyncResult,
};

/// How a fetch should fail.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    NotFound,
    Unavailable,
    Auth,
}

impl Failure {
    fn error(self, what: &str) -> SyncError {
        match self {
            Self::NotFound => SyncError::NotFound(what.to_string()),
            Self::Unavailable => SyncError::SourceUnavailable(format!("{what}: connection reset")),
            Self::Auth => SyncError::AuthFailure("token expired".to_string()),
        }
    }
}

#[derive(Default)]
pub struct FakeSource {
    principals: Mutex<HashMap<SourceId, SourcePrincipal>>,
    groups: Mutex<HashMap<SourceId, Vec<SourceId>>>,
    failures: Mutex<HashMap<SourceId, Failure>>,
    pub group_calls: AtomicUsize,
    pub principal_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(self, id: &str, mail: &str) -> Self {
        self.add(
            SourcePrincipal::new(id, PrincipalKind::User, format!("User {id}"))
                .with_attribute(source_attr::MAIL, mail),
        );
        self
    }

    pub fn service_principal(self, id: &str, app_id: &str) -> Self {
        self.add(
            SourcePrincipal::new(id, PrincipalKind::ServicePrincipal, format!("App {id}"))
                .with_attribute(source_attr::APP_ID, app_id),
        );
        self
    }

    /// Adds a group; member kinds are looked up when the group is fetched.
    pub fn group(self, id: &str, name: &str, members: &[&str]) -> Self {
        self.add(SourcePrincipal::new(id, PrincipalKind::Group, name));
        self.groups.lock().unwrap().insert(
            SourceId::new(id),
            members.iter().map(|m| SourceId::new(*m)).collect(),
        );
        self
    }

    pub fn add(&self, principal: SourcePrincipal) {
        self.principals
            .lock()
            .unwrap()
            .insert(principal.id.clone(), principal);
    }

    pub fn rename(&self, id: &str, display_name: &str) {
        if let Some(p) = self.principals.lock().unwrap().get_mut(&SourceId::new(id)) {
            p.display_name = display_name.to_string();
        }
    }

    pub fn set_members(&self, id: &str, members: &[&str]) {
        self.groups.lock().unwrap().insert(
            SourceId::new(id),
            members.iter().map(|m| SourceId::new(*m)).collect(),
        );
    }

    pub fn fail(&self, id: &str, failure: Failure) {
        self.failures
            .lock()
            .unwrap()
            .insert(SourceId::new(id), failure);
    }

    fn check(&self, id: &SourceId) -> SyncResult<()> {
        match self.failures.lock().unwrap().get(id) {
            Some(f) => Err(f.error(id.as_str())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SourceDirectory for FakeSource {
    async fn get_group(&self, id: &SourceId) -> SyncResult<SourceGroup> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        self.check(id)?;

        let principals = self.principals.lock().unwrap();
        let groups = self.groups.lock().unwrap();
        let members = groups
            .get(id)
            .ok_or_else(|| SyncError::NotFound(format!("group {id}")))?;
        let principal = principals
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("group {id}")))?;

        let refs = members
            .iter()
            .map(|m| {
                let kind = if groups.contains_key(m) {
                    PrincipalKind::Group
                } else {
                    principals.get(m).map_or(PrincipalKind::User, |p| p.kind)
                };
                MemberRef::new(m.clone(), kind)
            })
            .collect();

        Ok(SourceGroup::new(principal, refs))
    }

    async fn get_principal(&self, id: &SourceId) -> SyncResult<SourcePrincipal> {
        self.principal_calls.fetch_add(1, Ordering::SeqCst);
        self.check(id)?;
        self.principals
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("principal {id}")))
    }

    async fn find_group_by_name(&self, name: &str) -> SyncResult<Option<SourcePrincipal>> {
        let principals = self.principals.lock().unwrap();
        let mut matches = principals
            .values()
            .filter(|p| p.kind == PrincipalKind::Group && p.display_name == name);
        let first = matches.next().cloned();
        Ok(if matches.next().is_some() { None } else { first })
    }
}
