//! [`SourceDirectory`] backed by Microsoft Graph.

use async_trait::async_trait;
use dirsync_core::profile::source_attr;
use dirsync_core::{
    MemberRef, PrincipalKind, SkippedMember, SourceDirectory, SourceGroup, SourceId,
    SourcePrincipal, SyncResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{GraphClient, GraphConfig, GraphCredentials, GraphError, GraphResult};

const MEMBER_SELECT: &str =
    "id,displayName,mail,mailNickname,userPrincipalName,appId,accountEnabled";
const GROUP_SELECT: &str = "id,displayName";

const USER_TYPE: &str = "#microsoft.graph.user";
const SERVICE_PRINCIPAL_TYPE: &str = "#microsoft.graph.servicePrincipal";
const GROUP_TYPE: &str = "#microsoft.graph.group";

/// A directory object as returned by `$select=` member listings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryObject {
    id: String,
    #[serde(rename = "@odata.type")]
    odata_type: Option<String>,
    display_name: Option<String>,
    mail: Option<String>,
    mail_nickname: Option<String>,
    user_principal_name: Option<String>,
    app_id: Option<String>,
    account_enabled: Option<bool>,
}

impl DirectoryObject {
    fn kind(&self) -> Option<PrincipalKind> {
        match self.odata_type.as_deref()? {
            USER_TYPE => Some(PrincipalKind::User),
            SERVICE_PRINCIPAL_TYPE => Some(PrincipalKind::ServicePrincipal),
            GROUP_TYPE => Some(PrincipalKind::Group),
            _ => None,
        }
    }

    fn into_principal(self, kind: PrincipalKind) -> SourcePrincipal {
        let mut principal =
            SourcePrincipal::new(self.id, kind, self.display_name.unwrap_or_default());
        let attributes = [
            (source_attr::MAIL, self.mail),
            (source_attr::MAIL_NICKNAME, self.mail_nickname),
            (source_attr::USER_PRINCIPAL_NAME, self.user_principal_name),
            (source_attr::APP_ID, self.app_id),
        ];
        for (name, value) in attributes {
            if let Some(value) = value {
                principal.attributes.insert(name.to_string(), value);
            }
        }
        principal.enabled = self.account_enabled.unwrap_or(true);
        principal
    }
}

/// Counters of what was downloaded during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadStats {
    pub errors: usize,
    pub groups: usize,
    pub users: usize,
    pub service_principals: usize,
}

#[derive(Debug, Default)]
struct Counters {
    errors: AtomicUsize,
    groups: AtomicUsize,
    users: AtomicUsize,
    service_principals: AtomicUsize,
}

/// Reads groups and their members from an Entra ID tenant.
///
/// Leaf principals seen while listing group members are cached, so
/// resolving them later does not cost another request.
#[derive(Debug)]
pub struct GraphDirectory {
    client: GraphClient,
    principals: Mutex<HashMap<SourceId, SourcePrincipal>>,
    counters: Counters,
}

impl GraphDirectory {
    /// Creates a directory reader for the configured tenant.
    pub fn new(config: &GraphConfig, credentials: GraphCredentials) -> GraphResult<Self> {
        Ok(Self::with_client(GraphClient::new(config, credentials)?))
    }

    #[must_use]
    pub fn with_client(client: GraphClient) -> Self {
        Self {
            client,
            principals: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Snapshot of the download counters.
    #[must_use]
    pub fn stats(&self) -> DownloadStats {
        DownloadStats {
            errors: self.counters.errors.load(Ordering::Relaxed),
            groups: self.counters.groups.load(Ordering::Relaxed),
            users: self.counters.users.load(Ordering::Relaxed),
            service_principals: self.counters.service_principals.load(Ordering::Relaxed),
        }
    }

    /// Logs the download counters at `info`, or `error` if anything failed.
    pub fn log_summary(&self) {
        let stats = self.stats();
        if stats.errors > 0 {
            tracing::error!(
                errors = stats.errors,
                groups = stats.groups,
                users = stats.users,
                service_principals = stats.service_principals,
                "Downloaded from Graph with errors"
            );
        } else {
            info!(
                groups = stats.groups,
                users = stats.users,
                service_principals = stats.service_principals,
                "Downloaded from Graph"
            );
        }
    }

    fn cached(&self, id: &SourceId) -> Option<SourcePrincipal> {
        self.principals
            .lock()
            .ok()
            .and_then(|cache| cache.get(id).cloned())
    }

    fn remember(&self, principal: &SourcePrincipal) {
        let counter = match principal.kind {
            PrincipalKind::User => &self.counters.users,
            PrincipalKind::ServicePrincipal => &self.counters.service_principals,
            PrincipalKind::Group => return,
        };
        if let Ok(mut cache) = self.principals.lock() {
            if cache
                .insert(principal.id.clone(), principal.clone())
                .is_none()
            {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn counted<T>(&self, result: GraphResult<T>) -> GraphResult<T> {
        if result.is_err() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn fetch_group(&self, id: &SourceId) -> GraphResult<SourceGroup> {
        let path = format!("groups/{}?$select={GROUP_SELECT}", urlencoding::encode(id.as_str()));
        let object: DirectoryObject = self.client.get(&path).await?;
        let principal = object.into_principal(PrincipalKind::Group);

        let members_path = format!(
            "groups/{}/members?$select={MEMBER_SELECT}",
            urlencoding::encode(id.as_str())
        );
        let members: Vec<DirectoryObject> = self.client.get_all(&members_path).await?;

        let mut member_refs = Vec::with_capacity(members.len());
        let mut skipped_members = Vec::new();
        for member in members {
            match member.kind() {
                Some(kind) => {
                    let member_id = SourceId::new(member.id.clone());
                    if kind.is_leaf() {
                        self.remember(&member.into_principal(kind));
                    }
                    member_refs.push(MemberRef::new(member_id, kind));
                }
                None => {
                    let object_type = member
                        .odata_type
                        .unwrap_or_else(|| "unknown".to_string());
                    debug!(member_id = %member.id, %object_type, "Skipping unsupported member");
                    skipped_members.push(SkippedMember {
                        id: SourceId::new(member.id),
                        object_type,
                    });
                }
            }
        }

        self.counters.groups.fetch_add(1, Ordering::Relaxed);
        debug!(
            group = %principal.display_name,
            members = member_refs.len(),
            skipped = skipped_members.len(),
            "Downloaded group"
        );
        Ok(SourceGroup {
            principal,
            member_refs,
            skipped_members,
        })
    }

    async fn fetch_principal(&self, id: &SourceId) -> GraphResult<SourcePrincipal> {
        let path = format!(
            "directoryObjects/{}?$select={MEMBER_SELECT}",
            urlencoding::encode(id.as_str())
        );
        let object: DirectoryObject = self.client.get(&path).await?;
        let kind = object.kind().ok_or_else(|| {
            GraphError::InvalidObject(format!(
                "{} has unsupported type {}",
                object.id,
                object.odata_type.as_deref().unwrap_or("unknown")
            ))
        })?;
        let principal = object.into_principal(kind);
        self.remember(&principal);
        Ok(principal)
    }

    async fn lookup_group(&self, name: &str) -> GraphResult<Option<SourcePrincipal>> {
        let filter = format!("displayName eq '{}'", name.replace('\'', "''"));
        let path = format!(
            "groups?$filter={}&$select={GROUP_SELECT}",
            urlencoding::encode(&filter)
        );
        let mut matches: Vec<DirectoryObject> = self.client.get_all(&path).await?;
        match matches.len() {
            1 => Ok(matches.pop().map(|g| g.into_principal(PrincipalKind::Group))),
            0 => Ok(None),
            n => {
                warn!(group_name = name, matches = n, "Group name is ambiguous");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl SourceDirectory for GraphDirectory {
    #[instrument(skip(self), fields(group_id = %id))]
    async fn get_group(&self, id: &SourceId) -> SyncResult<SourceGroup> {
        let result = self.fetch_group(id).await;
        Ok(self.counted(result)?)
    }

    async fn get_principal(&self, id: &SourceId) -> SyncResult<SourcePrincipal> {
        if let Some(principal) = self.cached(id) {
            return Ok(principal);
        }
        let result = self.fetch_principal(id).await;
        Ok(self.counted(result)?)
    }

    #[instrument(skip(self))]
    async fn find_group_by_name(&self, name: &str) -> SyncResult<Option<SourcePrincipal>> {
        let result = self.lookup_group(name).await;
        Ok(self.counted(result)?)
    }
}
