//! Microsoft Graph HTTP client with token injection and paging.
//!
//! Throttling and server errors are surfaced as [`GraphError::GraphApi`]
//! with the `Retry-After` hint attached; retrying is the caller's concern.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::{GraphConfig, GraphCredentials, GraphError, GraphResult, TokenCache};

/// `OData` error response from Microsoft Graph.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

/// `OData` error body.
#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
}

/// Response wrapper for paginated Graph API responses.
#[derive(Debug, Deserialize)]
pub struct ODataResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Microsoft Graph API client.
#[derive(Debug)]
pub struct GraphClient {
    http_client: reqwest::Client,
    token_cache: TokenCache,
    /// Always ends with `/` so relative paths join below the version.
    base_url: Url,
}

impl GraphClient {
    /// Creates a client for the configured tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or the
    /// configured endpoint is not a valid URL.
    pub fn new(config: &GraphConfig, credentials: GraphCredentials) -> GraphResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GraphError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            token_cache: TokenCache::new(config, credentials, http_client.clone()),
            http_client,
            base_url: Url::parse(&format!("{}/", config.base_url()))?,
        })
    }

    /// Returns the base URL for Graph API requests.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Performs a GET on `url` (absolute, or relative to the base URL).
    ///
    /// A 401 invalidates the cached token and the request is replayed once
    /// with a fresh one.
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> GraphResult<T> {
        let url = self.absolute(url)?;
        let mut refreshed = false;

        loop {
            let token = self.token_cache.get_token().await?;
            let response = self
                .http_client
                .get(url.clone())
                .bearer_auth(&token)
                .header("ConsistencyLevel", "eventual")
                .send()
                .await?;
            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED && !refreshed {
                debug!("Access token rejected, refreshing");
                self.token_cache.invalidate().await;
                refreshed = true;
                continue;
            }

            if status.is_success() {
                let body = response.bytes().await?;
                return serde_json::from_slice(&body).map_err(GraphError::from);
            }

            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<ODataError>(&error_body) {
                Ok(odata) => (odata.error.code, odata.error.message),
                Err(_) => (status.to_string(), error_body),
            };
            return Err(GraphError::GraphApi {
                status: status.as_u16(),
                code,
                message,
                retry_after_secs,
            });
        }
    }

    /// Fetches every page of a collection by following `@odata.nextLink`.
    #[instrument(skip(self))]
    pub async fn get_all<T: DeserializeOwned>(&self, initial_url: &str) -> GraphResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(initial_url.to_string());
        let mut pages = 0usize;

        while let Some(url) = next {
            let page: ODataResponse<T> = self.get(&url).await?;
            pages += 1;
            items.extend(page.value);
            next = page.next_link;
        }

        debug!(pages, items = items.len(), "Collection fetched");
        Ok(items)
    }

    /// Resolves `url` against the versioned base; `@odata.nextLink` values
    /// are already absolute and pass through.
    fn absolute(&self, url: &str) -> GraphResult<Url> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(self.base_url.join(url.trim_start_matches('/'))?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn client() -> GraphClient {
        let config = GraphConfig::new("tenant").with_endpoint("http://localhost:1");
        GraphClient::new(
            &config,
            GraphCredentials {
                client_id: "c".into(),
                client_secret: SecretString::new("s".into()),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_relative_urls_are_joined_to_base() {
        let client = client();
        assert_eq!(client.base_url(), "http://localhost:1/v1.0");
        assert_eq!(
            client.absolute("/groups/g1").unwrap().as_str(),
            "http://localhost:1/v1.0/groups/g1"
        );
        assert_eq!(
            client.absolute("groups?$select=id").unwrap().as_str(),
            "http://localhost:1/v1.0/groups?$select=id"
        );
        assert_eq!(
            client
                .absolute("http://localhost:1/v1.0/groups?$skiptoken=x")
                .unwrap()
                .as_str(),
            "http://localhost:1/v1.0/groups?$skiptoken=x"
        );
    }

    #[test]
    fn test_malformed_next_link_is_a_url_error() {
        let err = client().absolute("http://[broken/groups").unwrap_err();
        assert!(matches!(err, GraphError::Url(_)));
    }

    #[test]
    fn test_odata_response_parses_next_link() {
        let page: ODataResponse<serde_json::Value> = serde_json::from_str(
            r#"{"value":[{"id":"a"}],"@odata.nextLink":"https://graph/next"}"#,
        )
        .unwrap();
        assert_eq!(page.value.len(), 1);
        assert_eq!(page.next_link.as_deref(), Some("https://graph/next"));
    }
}
