//! Shared data model: source snapshots, target records and identity mappings.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::ids::{SourceId, TargetId};

/// Kind of directory principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    Group,
    ServicePrincipal,
}

impl PrincipalKind {
    /// Leaf principals terminate a membership chain.
    #[must_use]
    pub fn is_leaf(self) -> bool {
        !matches!(self, Self::Group)
    }

    /// Stable label used in logs and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Group => "Group",
            Self::ServicePrincipal => "ServicePrincipal",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of a principal in the source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePrincipal {
    pub id: SourceId,
    pub kind: PrincipalKind,
    pub display_name: String,
    /// Raw source attributes (e.g. `mail`, `userPrincipalName`, `appId`).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SourcePrincipal {
    /// Creates a snapshot with no extra attributes.
    pub fn new(id: impl Into<SourceId>, kind: PrincipalKind, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            display_name: display_name.into(),
            attributes: BTreeMap::new(),
            enabled: true,
        }
    }

    /// Adds a source attribute, builder style.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns a non-empty source attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// Reference from a group to one of its direct members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    pub id: SourceId,
    pub kind: PrincipalKind,
}

impl MemberRef {
    pub fn new(id: impl Into<SourceId>, kind: PrincipalKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Source group snapshot with its direct member references.
///
/// Member references may point at other groups, and the resulting graph may
/// contain cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGroup {
    pub principal: SourcePrincipal,
    #[serde(default)]
    pub member_refs: Vec<MemberRef>,
    /// Direct members of object types that cannot be synchronized
    /// (devices, contacts, ...).
    #[serde(default)]
    pub skipped_members: Vec<SkippedMember>,
}

/// A direct member the source reported but the engine cannot represent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedMember {
    pub id: SourceId,
    pub object_type: String,
}

impl SourceGroup {
    pub fn new(principal: SourcePrincipal, member_refs: Vec<MemberRef>) -> Self {
        Self {
            principal,
            member_refs,
            skipped_members: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &SourceId {
        &self.principal.id
    }
}

/// Flattened leaf membership of one whitelisted group. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveMembership {
    pub group_id: SourceId,
    pub leaf_member_ids: BTreeSet<SourceId>,
}

/// Persistent link between a source object and its target counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub source_id: SourceId,
    pub target_id: TargetId,
    pub kind: PrincipalKind,
}

impl IdentityMapping {
    pub fn new(source_id: SourceId, target_id: TargetId, kind: PrincipalKind) -> Self {
        Self {
            source_id,
            target_id,
            kind,
        }
    }
}

/// Attribute bag in target vocabulary.
///
/// `None`/absent fields mean "not provided by the source" and are never
/// written to the target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl PrincipalAttributes {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.attributes.is_empty() && self.active.is_none()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Current state of a principal in the target account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPrincipal {
    pub target_id: TargetId,
    pub kind: PrincipalKind,
    pub display_name: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub active: Option<bool>,
    /// Current member ids; only populated for groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<BTreeSet<TargetId>>,
}

impl TargetPrincipal {
    pub fn new(target_id: impl Into<TargetId>, kind: PrincipalKind) -> Self {
        Self {
            target_id: target_id.into(),
            kind,
            display_name: None,
            attributes: BTreeMap::new(),
            active: None,
            members: None,
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}
