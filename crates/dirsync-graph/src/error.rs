//! Error types for the Graph source directory.

use dirsync_core::SyncError;
use thiserror::Error;

/// Result type alias using `GraphError`.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur when reading from Microsoft Graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// `OAuth2` authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Microsoft Graph API error response.
    #[error("Graph API error ({status}): {code} - {message}")]
    GraphApi {
        status: u16,
        code: String,
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A directory object could not be interpreted.
    #[error("Invalid directory object: {0}")]
    InvalidObject(String),
}

impl GraphError {
    /// HTTP status of an API error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::GraphApi { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<GraphError> for SyncError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Auth(msg) => SyncError::AuthFailure(msg),
            GraphError::GraphApi {
                status,
                code,
                message,
                retry_after_secs,
            } => match status {
                401 | 403 => SyncError::AuthFailure(format!("{code}: {message}")),
                404 => SyncError::NotFound(format!("{code}: {message}")),
                429 | 500..=599 => SyncError::TransientApi {
                    status: Some(status),
                    message: format!("{code}: {message}"),
                    retry_after_secs,
                },
                _ => SyncError::InvalidData(format!("Graph API {status} {code}: {message}")),
            },
            GraphError::Http(err) => SyncError::SourceUnavailable(err.to_string()),
            GraphError::Json(err) => SyncError::InvalidData(err.to_string()),
            GraphError::Url(err) => SyncError::InvalidData(err.to_string()),
            GraphError::InvalidObject(msg) => SyncError::InvalidData(msg),
            GraphError::Config(msg) => SyncError::InvalidData(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> GraphError {
        GraphError::GraphApi {
            status,
            code: "code".into(),
            message: "message".into(),
            retry_after_secs: Some(3),
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(SyncError::from(api(401)), SyncError::AuthFailure(_)));
        assert!(matches!(SyncError::from(api(403)), SyncError::AuthFailure(_)));
        assert!(matches!(SyncError::from(api(404)), SyncError::NotFound(_)));
        assert!(matches!(SyncError::from(api(400)), SyncError::InvalidData(_)));
        assert!(matches!(
            SyncError::from(api(429)),
            SyncError::TransientApi {
                status: Some(429),
                retry_after_secs: Some(3),
                ..
            }
        ));
        assert!(SyncError::from(api(503)).is_retryable());
    }

    #[test]
    fn test_auth_error_is_fatal() {
        let err: SyncError = GraphError::Auth("invalid_client".into()).into();
        assert!(err.is_fatal());
    }
}
