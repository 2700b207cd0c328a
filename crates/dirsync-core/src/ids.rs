//! Newtype wrappers for source and target identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

const PENDING_PREFIX: &str = "pending:";

/// Object identifier in the source directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Wraps a raw source directory object id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Object identifier in the target account.
///
/// Under dry-run, principals that would be created get a synthetic
/// `pending:<source id>` identifier so the rest of the plan can reference them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Wraps a raw target account id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the placeholder id for a principal that is not created yet.
    #[must_use]
    pub fn pending(source_id: &SourceId) -> Self {
        Self(format!("{PENDING_PREFIX}{source_id}"))
    }

    /// Whether this is a dry-run placeholder rather than a real target id.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.0.starts_with(PENDING_PREFIX)
    }

    /// Returns the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
