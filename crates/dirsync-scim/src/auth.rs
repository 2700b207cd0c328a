//! SCIM target authentication.

use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};

/// Static bearer token (a Databricks personal access token or an
/// account-level OAuth token minted out of band).
#[derive(Clone)]
pub struct ScimAuth {
    token: SecretString,
}

impl std::fmt::Debug for ScimAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScimAuth")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl ScimAuth {
    #[must_use]
    pub fn bearer(token: SecretString) -> Self {
        Self { token }
    }

    /// Apply authentication to a request builder.
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(self.token.expose_secret())
    }
}
