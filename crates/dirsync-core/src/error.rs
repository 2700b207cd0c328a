//! Error types for the reconciliation engine.
//!
//! Errors carry a transient/fatal classification that drives retry and
//! partial-failure handling in the reconciler.

use thiserror::Error;

use crate::ids::SourceId;
use crate::model::PrincipalKind;

/// Result type alias using `SyncError`.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing a directory into the target.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Rate limiting or a server-side failure from either API.
    #[error("transient API error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    TransientApi {
        status: Option<u16>,
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Retries for a transient error were exhausted.
    #[error("{operation} failed after {attempts} attempt(s): {message}")]
    MaxRetriesExceeded {
        operation: String,
        attempts: u32,
        message: String,
    },

    /// The source directory could not be reached.
    #[error("source directory unavailable: {0}")]
    SourceUnavailable(String),

    /// The target account could not be reached.
    #[error("target account unavailable: {0}")]
    TargetUnavailable(String),

    /// Credentials were rejected by either API.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// A target lookup matched more than one principal, or a principal owned
    /// by a different source identity.
    #[error("conflicting {kind} principal for '{natural_key}': {reason}")]
    PrincipalConflict {
        kind: PrincipalKind,
        natural_key: String,
        reason: String,
    },

    /// The source principal has no attribute usable as a natural key.
    #[error("{kind} {source_id} has no natural key")]
    MissingNaturalKey {
        kind: PrincipalKind,
        source_id: SourceId,
    },

    /// A referenced object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A collaborator returned data that could not be interpreted.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The identity mapping store failed.
    #[error("mapping store error: {0}")]
    Store(String),

    /// The run was aborted before this operation could start.
    #[error("run cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Creates a transient error without a `Retry-After` hint.
    pub fn transient(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::TransientApi {
            status,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientApi { .. })
    }

    /// Whether the error must abort the whole run.
    ///
    /// Everything else is scoped to a single principal or group and is
    /// reported as a warning.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TransientApi { .. }
                | Self::MaxRetriesExceeded { .. }
                | Self::SourceUnavailable(_)
                | Self::TargetUnavailable(_)
                | Self::AuthFailure(_)
                | Self::Store(_)
                | Self::Cancelled
                | Self::Internal(_)
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidData(e.to_string())
    }
}
