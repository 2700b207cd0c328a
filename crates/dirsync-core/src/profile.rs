//! Attribute profile: how source snapshots translate into target attributes.
//!
//! | Kind             | Natural key                                         | Copied                          |
//! |------------------|-----------------------------------------------------|---------------------------------|
//! | User             | `userName` from `mail`/`mailNickname`/`userPrincipalName` | `displayName`, `externalId`, `active` |
//! | ServicePrincipal | `applicationId` from `appId`                        | `displayName`, `externalId`, `active` |
//! | Group            | `displayName`                                       | `externalId`                    |
//!
//! Updates are source-wins and additive: attributes the source does not
//! provide are left alone, the natural key is never rewritten, and `active`
//! is only set at creation time.

use crate::error::{SyncError, SyncResult};
use crate::model::{PrincipalAttributes, PrincipalKind, SourcePrincipal, TargetPrincipal};

/// Target attribute names.
pub mod attr {
    pub const USER_NAME: &str = "userName";
    pub const APPLICATION_ID: &str = "applicationId";
    pub const DISPLAY_NAME: &str = "displayName";
    pub const EXTERNAL_ID: &str = "externalId";
}

/// Source directory attribute names.
pub mod source_attr {
    pub const MAIL: &str = "mail";
    pub const MAIL_NICKNAME: &str = "mailNickname";
    pub const USER_PRINCIPAL_NAME: &str = "userPrincipalName";
    pub const APP_ID: &str = "appId";
}

/// Target attribute used to match a principal when no mapping is cached.
#[must_use]
pub fn natural_key_attribute(kind: PrincipalKind) -> &'static str {
    match kind {
        PrincipalKind::User => attr::USER_NAME,
        PrincipalKind::ServicePrincipal => attr::APPLICATION_ID,
        PrincipalKind::Group => attr::DISPLAY_NAME,
    }
}

/// Natural key value of a source principal, if it has one.
#[must_use]
pub fn natural_key(principal: &SourcePrincipal) -> Option<String> {
    let value = match principal.kind {
        PrincipalKind::User => principal
            .attribute(source_attr::MAIL)
            .or_else(|| principal.attribute(source_attr::MAIL_NICKNAME))
            .or_else(|| principal.attribute(source_attr::USER_PRINCIPAL_NAME)),
        PrincipalKind::ServicePrincipal => principal.attribute(source_attr::APP_ID),
        PrincipalKind::Group => Some(principal.display_name.as_str()).filter(|n| !n.trim().is_empty()),
    };
    value.map(str::to_string)
}

/// Like [`natural_key`] but fails with `MissingNaturalKey`.
pub fn require_natural_key(principal: &SourcePrincipal) -> SyncResult<String> {
    natural_key(principal).ok_or_else(|| SyncError::MissingNaturalKey {
        kind: principal.kind,
        source_id: principal.id.clone(),
    })
}

/// Desired target attributes for a source snapshot.
#[must_use]
pub fn desired_attributes(principal: &SourcePrincipal) -> PrincipalAttributes {
    let mut desired = PrincipalAttributes {
        display_name: Some(principal.display_name.clone()).filter(|n| !n.trim().is_empty()),
        ..Default::default()
    };

    desired
        .attributes
        .insert(attr::EXTERNAL_ID.to_string(), principal.id.to_string());

    if principal.kind.is_leaf() {
        if let Some(key) = natural_key(principal) {
            desired
                .attributes
                .insert(natural_key_attribute(principal.kind).to_string(), key);
        }
        desired.active = Some(principal.enabled);
    }

    desired
}

/// Attributes that differ between the desired state and the target record.
///
/// Returns `None` when the target already matches.
#[must_use]
pub fn attribute_changes(
    kind: PrincipalKind,
    desired: &PrincipalAttributes,
    current: &TargetPrincipal,
) -> Option<PrincipalAttributes> {
    let mut changed = PrincipalAttributes::default();

    if let Some(ref name) = desired.display_name {
        if current.display_name.as_deref() != Some(name.as_str()) {
            changed.display_name = Some(name.clone());
        }
    }

    let key_attr = natural_key_attribute(kind);
    for (name, value) in &desired.attributes {
        if name == key_attr {
            continue;
        }
        if current.attribute(name) != Some(value.as_str()) {
            changed.attributes.insert(name.clone(), value.clone());
        }
    }

    (!changed.is_empty()).then_some(changed)
}
