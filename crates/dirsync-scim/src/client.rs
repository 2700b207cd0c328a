//! SCIM 2.0 HTTP client (reqwest-based).
//!
//! Thin RFC 7644 operations over `Users`, `ServicePrincipals` and `Groups`.
//! Retrying is left to the caller.

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::ScimAuth;
use crate::models::{
    ResourceType, ScimErrorBody, ScimListResponse, ScimMember, ScimPatchOp, ScimPatchRequest,
    ScimResource,
};
use crate::{ScimClientError, ScimClientResult};

const SCIM_CONTENT_TYPE: &str = "application/scim+json";

/// SCIM 2.0 HTTP client for outbound provisioning.
#[derive(Debug, Clone)]
pub struct ScimClient {
    /// Base URL of the SCIM root (e.g. `https://accounts.example.com/api/2.0/accounts/<id>/scim/v2`).
    base_url: String,
    auth: ScimAuth,
    http_client: Client,
}

impl ScimClient {
    /// Create a new SCIM client.
    pub fn new(base_url: &str, auth: ScimAuth, timeout: Duration) -> ScimClientResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dirsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ScimClientError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self::with_http_client(base_url, auth, http_client))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    #[must_use]
    pub fn with_http_client(base_url: &str, auth: ScimAuth, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            http_client,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, resource: ResourceType, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/{}/{}", self.base_url, resource.endpoint(), id),
            None => format!("{}/{}", self.base_url, resource.endpoint()),
        }
    }

    /// List resources matching a filter (GET /<Resource>?filter=...).
    pub async fn list(
        &self,
        resource: ResourceType,
        filter: &str,
        count: u32,
    ) -> ScimClientResult<ScimListResponse<ScimResource>> {
        let url = self.url(resource, None);
        debug!("SCIM GET {} (filter={:?})", url, filter);
        let builder = self
            .http_client
            .get(&url)
            .query(&[("filter", filter.to_string()), ("count", count.to_string())]);
        let response = self.auth.apply(builder).send().await?;
        self.handle_response(response).await
    }

    /// Get a resource by SCIM id.
    pub async fn get(&self, resource: ResourceType, id: &str) -> ScimClientResult<ScimResource> {
        let url = self.url(resource, Some(id));
        debug!("SCIM GET {}", url);
        let response = self.auth.apply(self.http_client.get(&url)).send().await?;
        self.handle_response(response).await
    }

    /// Current member ids of a group.
    pub async fn get_group_members(&self, group_id: &str) -> ScimClientResult<Vec<ScimMember>> {
        let url = self.url(ResourceType::Groups, Some(group_id));
        debug!("SCIM GET {} (members)", url);
        let builder = self
            .http_client
            .get(&url)
            .query(&[("attributes", "members")]);
        let response = self.auth.apply(builder).send().await?;
        let group: ScimResource = self.handle_response(response).await?;
        Ok(group.members.unwrap_or_default())
    }

    /// Create a resource (POST /<Resource>).
    pub async fn create(
        &self,
        resource: ResourceType,
        body: &ScimResource,
    ) -> ScimClientResult<ScimResource> {
        let url = self.url(resource, None);
        debug!("SCIM POST {}", url);
        self.send_json(self.http_client.post(&url), body).await
    }

    /// Apply a PATCH request to a resource.
    pub async fn patch(
        &self,
        resource: ResourceType,
        id: &str,
        patch: &ScimPatchRequest,
    ) -> ScimClientResult<()> {
        let url = self.url(resource, Some(id));
        debug!("SCIM PATCH {} ({} ops)", url, patch.operations.len());
        let builder = self
            .http_client
            .patch(&url)
            .header(reqwest::header::CONTENT_TYPE, SCIM_CONTENT_TYPE)
            .json(patch);
        let response = self.auth.apply(builder).send().await?;

        // Targets answer PATCH with either 204 or the updated resource.
        if response.status().is_success() {
            Ok(())
        } else {
            self.handle_error_response(response).await
        }
    }

    /// Patch group members: one `add` with every new member, one `remove`
    /// per dropped member.
    pub async fn patch_group_members(
        &self,
        group_id: &str,
        add_member_ids: &[String],
        remove_member_ids: &[String],
    ) -> ScimClientResult<()> {
        let mut operations = Vec::new();

        if !add_member_ids.is_empty() {
            let members: Vec<serde_json::Value> = add_member_ids
                .iter()
                .map(|id| serde_json::json!({ "value": id }))
                .collect();
            operations.push(ScimPatchOp::add("members", serde_json::Value::Array(members)));
        }

        for id in remove_member_ids {
            let escaped = escape_scim_filter_value(id);
            operations.push(ScimPatchOp::remove(format!("members[value eq \"{escaped}\"]")));
        }

        if operations.is_empty() {
            return Ok(());
        }
        self.patch(ResourceType::Groups, group_id, &ScimPatchRequest::new(operations))
            .await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        builder: reqwest::RequestBuilder,
        body: &B,
    ) -> ScimClientResult<T> {
        let builder = builder
            .header(reqwest::header::CONTENT_TYPE, SCIM_CONTENT_TYPE)
            .json(body);
        let response = self.auth.apply(builder).send().await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ScimClientResult<T> {
        if response.status().is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| ScimClientError::ParseError(format!("Failed to parse response: {e}")))
        } else {
            self.handle_error_response(response).await
        }
    }

    async fn handle_error_response<T>(&self, response: reqwest::Response) -> ScimClientResult<T> {
        let status = response.status();

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        let detail = match serde_json::from_str::<ScimErrorBody>(&body) {
            Ok(ScimErrorBody {
                detail: Some(detail),
                ..
            }) => detail,
            _ if body.is_empty() => format!("HTTP {status}"),
            _ => body,
        };

        match status {
            StatusCode::NOT_FOUND => Err(ScimClientError::NotFound(detail)),
            StatusCode::CONFLICT => Err(ScimClientError::Conflict(detail)),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("SCIM target rate limited, retry after {:?}s", retry_after);
                Err(ScimClientError::RateLimited {
                    retry_after_secs: retry_after,
                })
            }
            StatusCode::UNAUTHORIZED => Err(ScimClientError::AuthError(format!(
                "Authentication failed (401): {detail}"
            ))),
            _ => Err(ScimClientError::ScimError {
                status: status.as_u16(),
                detail,
            }),
        }
    }
}

/// Escape a value for use inside a SCIM filter string literal.
///
/// RFC 7644 Section 3.4.2.2 encloses string values in double-quotes.
#[must_use]
pub fn escape_scim_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_escaping() {
        assert_eq!(escape_scim_filter_value("plain"), "plain");
        assert_eq!(escape_scim_filter_value(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_scim_filter_value(r"a\b"), r"a\\b");
    }

    #[test]
    fn test_base_url_is_normalized() {
        let auth = ScimAuth::bearer(secrecy::SecretString::new("t".into()));
        let client = ScimClient::with_http_client("https://host/scim/v2/", auth, Client::new());
        assert_eq!(
            client.url(ResourceType::ServicePrincipals, Some("42")),
            "https://host/scim/v2/ServicePrincipals/42"
        );
    }
}
