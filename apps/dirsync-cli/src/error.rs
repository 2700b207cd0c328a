//! CLI error types and exit codes
//!
//! - 0: Success
//! - 1: General error
//! - 2: Authentication failed
//! - 3: Source or target unavailable
//! - 4: Invalid input (group list, configuration)

use dirsync_core::SyncError;
use thiserror::Error;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidInput(_) | CliError::Config(_) => 4,
            CliError::Io(_) => 1,
            CliError::Sync(err) => match err {
                SyncError::AuthFailure(_) => 2,
                SyncError::SourceUnavailable(_)
                | SyncError::TargetUnavailable(_)
                | SyncError::TransientApi { .. }
                | SyncError::MaxRetriesExceeded { .. } => 3,
                _ => 1,
            },
        }
    }
}

impl From<dirsync_graph::GraphError> for CliError {
    fn from(e: dirsync_graph::GraphError) -> Self {
        match e {
            dirsync_graph::GraphError::Config(msg) => CliError::Config(msg),
            other => CliError::Sync(other.into()),
        }
    }
}

impl From<dirsync_scim::ScimClientError> for CliError {
    fn from(e: dirsync_scim::ScimClientError) -> Self {
        match e {
            dirsync_scim::ScimClientError::InvalidConfig(msg) => CliError::Config(msg),
            other => CliError::Sync(other.into()),
        }
    }
}
