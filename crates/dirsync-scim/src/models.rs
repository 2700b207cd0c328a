//! SCIM 2.0 wire types (RFC 7643/7644) for the resources dirsync writes.

use dirsync_core::profile::attr;
use dirsync_core::{PrincipalAttributes, PrincipalKind, TargetId, TargetPrincipal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{ScimClientError, ScimClientResult};

/// SCIM resource collection a principal kind lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Users,
    ServicePrincipals,
    Groups,
}

impl ResourceType {
    /// Path segment under the SCIM root.
    #[must_use]
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Users => "Users",
            Self::ServicePrincipals => "ServicePrincipals",
            Self::Groups => "Groups",
        }
    }

    /// Core schema URI sent on create.
    #[must_use]
    pub fn schema(self) -> &'static str {
        match self {
            Self::Users => "urn:ietf:params:scim:schemas:core:2.0:User",
            Self::ServicePrincipals => "urn:ietf:params:scim:schemas:core:2.0:ServicePrincipal",
            Self::Groups => "urn:ietf:params:scim:schemas:core:2.0:Group",
        }
    }
}

impl From<PrincipalKind> for ResourceType {
    fn from(kind: PrincipalKind) -> Self {
        match kind {
            PrincipalKind::User => Self::Users,
            PrincipalKind::ServicePrincipal => Self::ServicePrincipals,
            PrincipalKind::Group => Self::Groups,
        }
    }
}

/// Group member reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScimMember {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// A User, ServicePrincipal or Group resource.
///
/// Attributes outside the ones dirsync manages are kept in `extra` so
/// they survive a read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimResource {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<ScimMember>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ScimResource {
    /// Builds a create payload from a target attribute bag.
    #[must_use]
    pub fn from_attributes(resource: ResourceType, attributes: &PrincipalAttributes) -> Self {
        let mut scim = Self {
            schemas: vec![resource.schema().to_string()],
            display_name: attributes.display_name.clone(),
            active: attributes.active,
            ..Self::default()
        };
        for (name, value) in &attributes.attributes {
            match name.as_str() {
                attr::USER_NAME => scim.user_name = Some(value.clone()),
                attr::APPLICATION_ID => scim.application_id = Some(value.clone()),
                attr::EXTERNAL_ID => scim.external_id = Some(value.clone()),
                attr::DISPLAY_NAME => scim.display_name = Some(value.clone()),
                _ => {
                    scim.extra
                        .insert(name.clone(), serde_json::Value::String(value.clone()));
                }
            }
        }
        scim
    }

    /// Converts a resource read from the target into the engine's view.
    pub fn into_target(self, kind: PrincipalKind) -> ScimClientResult<TargetPrincipal> {
        let id = self
            .id
            .ok_or_else(|| ScimClientError::ParseError("SCIM resource without id".to_string()))?;
        let mut principal = TargetPrincipal::new(TargetId::new(id), kind);
        principal.display_name = self.display_name;
        principal.active = self.active;

        let managed = [
            (attr::USER_NAME, self.user_name),
            (attr::APPLICATION_ID, self.application_id),
            (attr::EXTERNAL_ID, self.external_id),
        ];
        for (name, value) in managed {
            if let Some(value) = value {
                principal.attributes.insert(name.to_string(), value);
            }
        }
        principal.members = self.members.map(|members| {
            members
                .into_iter()
                .map(|m| TargetId::new(m.value))
                .collect::<BTreeSet<_>>()
        });
        Ok(principal)
    }
}

/// SCIM List Response (RFC 7644 Section 3.4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimListResponse<T> {
    #[serde(default)]
    pub total_results: i64,
    #[serde(default)]
    pub start_index: Option<i64>,
    #[serde(default)]
    pub items_per_page: Option<i64>,
    #[serde(rename = "Resources", default = "Vec::new")]
    pub resources: Vec<T>,
}

/// SCIM PATCH operation (RFC 7644 Section 3.5.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScimPatchOp {
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl ScimPatchOp {
    pub fn replace(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            op: "replace".to_string(),
            path: Some(path.into()),
            value: Some(value),
        }
    }

    pub fn add(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            op: "add".to_string(),
            path: Some(path.into()),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: "remove".to_string(),
            path: Some(path.into()),
            value: None,
        }
    }
}

/// SCIM PATCH request (RFC 7644 Section 3.5.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScimPatchRequest {
    pub schemas: Vec<String>,
    #[serde(rename = "Operations")]
    pub operations: Vec<ScimPatchOp>,
}

impl ScimPatchRequest {
    /// SCIM Patch Operation schema URI.
    pub const SCHEMA: &'static str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

    #[must_use]
    pub fn new(operations: Vec<ScimPatchOp>) -> Self {
        Self {
            schemas: vec![Self::SCHEMA.to_string()],
            operations,
        }
    }
}

/// SCIM error body (RFC 7644 Section 3.12).
#[derive(Debug, Clone, Deserialize)]
pub struct ScimErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default, rename = "scimType")]
    pub scim_type: Option<String>,
}
