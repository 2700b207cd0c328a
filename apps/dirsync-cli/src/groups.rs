//! Whitelisted group list: parsing and name resolution.

use dirsync_core::{RetryPolicy, SourceDirectory, SourceId};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CliError, CliResult};

/// One entry of the group list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRef {
    Id(SourceId),
    Name(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Plain(String),
    Object {
        id: Option<String>,
        name: Option<String>,
        #[serde(rename = "displayName")]
        display_name: Option<String>,
    },
}

fn is_object_id(value: &str) -> bool {
    value.len() == 36 && Uuid::parse_str(value).is_ok()
}

impl TryFrom<RawEntry> for GroupRef {
    type Error = CliError;

    fn try_from(entry: RawEntry) -> Result<Self, Self::Error> {
        match entry {
            RawEntry::Plain(value) => {
                let value = value.trim();
                if value.is_empty() {
                    Err(CliError::InvalidInput("empty group entry".to_string()))
                } else if is_object_id(value) {
                    Ok(Self::Id(SourceId::new(value)))
                } else {
                    Ok(Self::Name(value.to_string()))
                }
            }
            RawEntry::Object { id: Some(id), .. } if !id.trim().is_empty() => {
                Ok(Self::Id(SourceId::new(id.trim())))
            }
            RawEntry::Object {
                name, display_name, ..
            } => name
                .or(display_name)
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .map(Self::Name)
                .ok_or_else(|| {
                    CliError::InvalidInput(
                        "group object needs an \"id\", \"name\" or \"displayName\"".to_string(),
                    )
                }),
        }
    }
}

/// Parses a JSON array of group ids, names or `{id|name|displayName}` objects.
pub fn parse_group_list(json: &str) -> CliResult<Vec<GroupRef>> {
    let entries: Vec<RawEntry> = serde_json::from_str(json)
        .map_err(|e| CliError::InvalidInput(format!("group list is not a JSON array of groups: {e}")))?;
    if entries.is_empty() {
        return Err(CliError::InvalidInput("group list is empty".to_string()));
    }
    entries.into_iter().map(GroupRef::try_from).collect()
}

pub async fn load_group_list(path: &Path) -> CliResult<Vec<GroupRef>> {
    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
        CliError::InvalidInput(format!("cannot read group list {}: {e}", path.display()))
    })?;
    parse_group_list(&json)
}

/// Turns group references into source ids, looking names up in the source.
///
/// Names that match no group (or more than one) are skipped with a warning.
pub async fn resolve_groups(
    refs: &[GroupRef],
    source: &dyn SourceDirectory,
    retry: &RetryPolicy,
) -> CliResult<Vec<SourceId>> {
    let mut ids = Vec::with_capacity(refs.len());
    for group in refs {
        match group {
            GroupRef::Id(id) => ids.push(id.clone()),
            GroupRef::Name(name) => {
                let found = retry
                    .execute("find_group_by_name", || source.find_group_by_name(name))
                    .await;
                match found {
                    Ok(Some(principal)) => {
                        info!(group_name = %name, group_id = %principal.id, "Resolved group name");
                        ids.push(principal.id);
                    }
                    Ok(None) => warn!(group_name = %name, "Group not found, skipping"),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => warn!(group_name = %name, error = %e, "Group lookup failed, skipping"),
                }
            }
        }
    }

    if ids.is_empty() {
        return Err(CliError::InvalidInput(
            "none of the listed groups exist in the source directory".to_string(),
        ));
    }
    Ok(ids)
}
