//! [`TargetAccount`] over a SCIM 2.0 endpoint.

use async_trait::async_trait;
use dirsync_core::profile::{attr, natural_key_attribute};
use dirsync_core::{
    CreateOutcome, PrincipalAttributes, PrincipalKind, SyncError, SyncResult, TargetAccount, TargetId,
    TargetPrincipal,
};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{info, instrument};

use crate::client::escape_scim_filter_value;
use crate::models::{ResourceType, ScimPatchOp, ScimPatchRequest, ScimResource};
use crate::{ScimClient, ScimClientError};

/// Target account backed by a SCIM client.
#[derive(Debug, Clone)]
pub struct ScimAccount {
    client: ScimClient,
}

impl ScimAccount {
    #[must_use]
    pub fn new(client: ScimClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn client(&self) -> &ScimClient {
        &self.client
    }

    async fn lookup(
        &self,
        kind: PrincipalKind,
        natural_key: &str,
    ) -> SyncResult<Option<TargetPrincipal>> {
        let filter = format!(
            "{} eq \"{}\"",
            natural_key_attribute(kind),
            escape_scim_filter_value(natural_key)
        );
        let response = self.client.list(kind.into(), &filter, 2).await?;

        let total = usize::try_from(response.total_results)
            .unwrap_or_default()
            .max(response.resources.len());
        if total > 1 {
            return Err(SyncError::PrincipalConflict {
                kind,
                natural_key: natural_key.to_string(),
                reason: format!("{total} target principals match"),
            });
        }
        match response.resources.into_iter().next() {
            Some(resource) => Ok(Some(resource.into_target(kind)?)),
            None => Ok(None),
        }
    }
}

fn natural_key_of(kind: PrincipalKind, attributes: &PrincipalAttributes) -> Option<&str> {
    match kind {
        PrincipalKind::Group => attributes.display_name.as_deref(),
        _ => attributes.get(natural_key_attribute(kind)),
    }
}

#[async_trait]
impl TargetAccount for ScimAccount {
    #[instrument(skip(self))]
    async fn find_principal(
        &self,
        kind: PrincipalKind,
        natural_key: &str,
    ) -> SyncResult<Option<TargetPrincipal>> {
        self.lookup(kind, natural_key).await
    }

    async fn get_principal(
        &self,
        kind: PrincipalKind,
        target_id: &TargetId,
    ) -> SyncResult<Option<TargetPrincipal>> {
        match self.client.get(kind.into(), target_id.as_str()).await {
            Ok(resource) => Ok(Some(resource.into_target(kind)?)),
            Err(ScimClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, attributes))]
    async fn create_principal(
        &self,
        kind: PrincipalKind,
        attributes: &PrincipalAttributes,
    ) -> SyncResult<CreateOutcome> {
        let resource = ResourceType::from(kind);
        let body = ScimResource::from_attributes(resource, attributes);

        match self.client.create(resource, &body).await {
            Ok(created) => created
                .id
                .map(|id| CreateOutcome::Created(TargetId::new(id)))
                .ok_or_else(|| SyncError::InvalidData("created SCIM resource has no id".into())),
            Err(ScimClientError::Conflict(detail)) => {
                // Someone created it between our lookup and the POST.
                let key = natural_key_of(kind, attributes).ok_or_else(|| {
                    SyncError::InvalidData(format!("conflict on create without a natural key: {detail}"))
                })?;
                match self.lookup(kind, key).await? {
                    Some(existing) => {
                        info!(%kind, natural_key = key, target_id = %existing.target_id, "Create conflicted with an existing principal");
                        Ok(CreateOutcome::AlreadyExists(existing))
                    }
                    None => Err(SyncError::PrincipalConflict {
                        kind,
                        natural_key: key.to_string(),
                        reason: detail,
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, changed))]
    async fn update_principal_attrs(
        &self,
        kind: PrincipalKind,
        target_id: &TargetId,
        changed: &PrincipalAttributes,
    ) -> SyncResult<()> {
        let mut operations = Vec::new();
        if let Some(name) = &changed.display_name {
            operations.push(ScimPatchOp::replace(attr::DISPLAY_NAME, Value::String(name.clone())));
        }
        for (name, value) in &changed.attributes {
            operations.push(ScimPatchOp::replace(name.clone(), Value::String(value.clone())));
        }
        if let Some(active) = changed.active {
            operations.push(ScimPatchOp::replace("active", Value::Bool(active)));
        }
        if operations.is_empty() {
            return Ok(());
        }

        self.client
            .patch(kind.into(), target_id.as_str(), &ScimPatchRequest::new(operations))
            .await?;
        Ok(())
    }

    async fn get_group_members(&self, group_id: &TargetId) -> SyncResult<BTreeSet<TargetId>> {
        let members = self.client.get_group_members(group_id.as_str()).await?;
        Ok(members.into_iter().map(|m| TargetId::new(m.value)).collect())
    }

    #[instrument(skip(self, members), fields(members = members.len()))]
    async fn set_group_members(
        &self,
        group_id: &TargetId,
        members: &BTreeSet<TargetId>,
    ) -> SyncResult<()> {
        let current = self.get_group_members(group_id).await?;
        let add: Vec<String> = members
            .difference(&current)
            .map(|id| id.as_str().to_string())
            .collect();
        let remove: Vec<String> = current
            .difference(members)
            .map(|id| id.as_str().to_string())
            .collect();

        self.client
            .patch_group_members(group_id.as_str(), &add, &remove)
            .await?;
        Ok(())
    }
}
