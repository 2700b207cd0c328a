//! SCIM client error types.

use dirsync_core::SyncError;
use thiserror::Error;

/// Result type alias using `ScimClientError`.
pub type ScimClientResult<T> = Result<T, ScimClientError>;

/// Errors returned by the SCIM target.
#[derive(Debug, Error)]
pub enum ScimClientError {
    /// Client construction or configuration problem.
    #[error("invalid SCIM configuration: {0}")]
    InvalidConfig(String),

    /// 401 from the target.
    #[error("SCIM authentication error: {0}")]
    AuthError(String),

    /// 404 from the target.
    #[error("SCIM resource not found: {0}")]
    NotFound(String),

    /// 409 from the target, usually a uniqueness violation on create.
    #[error("SCIM conflict: {0}")]
    Conflict(String),

    /// 429 from the target.
    #[error("SCIM target rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success status.
    #[error("SCIM error ({status}): {detail}")]
    ScimError { status: u16, detail: String },

    /// A response body could not be interpreted.
    #[error("SCIM parse error: {0}")]
    ParseError(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<ScimClientError> for SyncError {
    fn from(e: ScimClientError) -> Self {
        match e {
            ScimClientError::AuthError(msg) => SyncError::AuthFailure(msg),
            ScimClientError::NotFound(msg) => SyncError::NotFound(msg),
            ScimClientError::RateLimited { retry_after_secs } => SyncError::TransientApi {
                status: Some(429),
                message: "SCIM target rate limited".to_string(),
                retry_after_secs,
            },
            ScimClientError::ScimError { status: 403, detail } => SyncError::AuthFailure(detail),
            ScimClientError::ScimError { status, detail } if status >= 500 => {
                SyncError::transient(Some(status), detail)
            }
            ScimClientError::ScimError { status, detail } => {
                SyncError::InvalidData(format!("SCIM {status}: {detail}"))
            }
            ScimClientError::Conflict(msg) => SyncError::InvalidData(format!("conflict: {msg}")),
            ScimClientError::ParseError(msg) => SyncError::InvalidData(msg),
            ScimClientError::InvalidConfig(msg) => SyncError::InvalidData(msg),
            ScimClientError::Http(err) if err.is_timeout() => {
                SyncError::transient(None, format!("SCIM request timed out: {err}"))
            }
            ScimClientError::Http(err) => SyncError::TargetUnavailable(err.to_string()),
        }
    }
}
