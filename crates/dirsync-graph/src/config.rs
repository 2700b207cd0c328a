//! Graph connection settings.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::{GraphError, GraphResult};

/// Microsoft cloud the tenant lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphCloud {
    #[default]
    Commercial,
    UsGovernment,
    China,
}

impl GraphCloud {
    #[must_use]
    pub fn login_endpoint(self) -> &'static str {
        match self {
            Self::Commercial => "https://login.microsoftonline.com",
            Self::UsGovernment => "https://login.microsoftonline.us",
            Self::China => "https://login.chinacloudapi.cn",
        }
    }

    #[must_use]
    pub fn graph_endpoint(self) -> &'static str {
        match self {
            Self::Commercial => "https://graph.microsoft.com",
            Self::UsGovernment => "https://graph.microsoft.us",
            Self::China => "https://microsoftgraph.chinacloudapi.cn",
        }
    }
}

impl std::str::FromStr for GraphCloud {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "commercial" | "global" | "public" => Ok(Self::Commercial),
            "us_government" | "usgov" | "gcc_high" => Ok(Self::UsGovernment),
            "china" => Ok(Self::China),
            other => Err(GraphError::Config(format!("unknown cloud: {other}"))),
        }
    }
}

/// App registration used for the client-credentials flow.
#[derive(Clone)]
pub struct GraphCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl std::fmt::Debug for GraphCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Where and how to reach Microsoft Graph.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub cloud: GraphCloud,
    /// Graph API version segment, `v1.0` or `beta`.
    pub api_version: String,
    /// Overrides the cloud's login endpoint.
    pub login_endpoint: Option<String>,
    /// Overrides the cloud's Graph endpoint.
    pub graph_endpoint: Option<String>,
    pub request_timeout_secs: u64,
}

impl GraphConfig {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            cloud: GraphCloud::default(),
            api_version: "v1.0".to_string(),
            login_endpoint: None,
            graph_endpoint: None,
            request_timeout_secs: 30,
        }
    }

    /// Points both login and Graph requests at `base` (for mock servers).
    #[must_use]
    pub fn with_endpoint(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.login_endpoint = Some(base.clone());
        self.graph_endpoint = Some(base);
        self
    }

    #[must_use]
    pub fn login_endpoint(&self) -> &str {
        self.login_endpoint
            .as_deref()
            .unwrap_or_else(|| self.cloud.login_endpoint())
            .trim_end_matches('/')
    }

    #[must_use]
    pub fn graph_endpoint(&self) -> &str {
        self.graph_endpoint
            .as_deref()
            .unwrap_or_else(|| self.cloud.graph_endpoint())
            .trim_end_matches('/')
    }

    /// `{graph}/{version}`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}/{}", self.graph_endpoint(), self.api_version)
    }

    /// OAuth scope granting the app's Graph permissions.
    #[must_use]
    pub fn scope(&self) -> String {
        format!("{}/.default", self.cloud.graph_endpoint())
    }

    /// Reads tenant and app credentials from the environment.
    ///
    /// `GRAPH_ARM_*` variables take precedence over their `ARM_*` fallbacks.
    /// `GRAPH_CLOUD`, `GRAPH_API_VERSION`, `GRAPH_ENDPOINT` and
    /// `GRAPH_LOGIN_ENDPOINT` are optional.
    pub fn from_env() -> GraphResult<(Self, GraphCredentials)> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> GraphResult<(Self, GraphCredentials)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(&format!("GRAPH_{name}"))
                .or_else(|| lookup(name))
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    GraphError::Config(format!(
                        "unknown {}, set GRAPH_{name} or {name} environment variables",
                        name.trim_start_matches("ARM_").to_ascii_lowercase()
                    ))
                })
        };

        let tenant_id = read("ARM_TENANT_ID")?;
        let client_id = read("ARM_CLIENT_ID")?;
        let client_secret = read("ARM_CLIENT_SECRET")?;

        let mut config = Self::new(tenant_id);
        if let Some(cloud) = lookup("GRAPH_CLOUD") {
            config.cloud = cloud.parse()?;
        }
        if let Some(version) = lookup("GRAPH_API_VERSION") {
            config.api_version = version;
        }
        config.graph_endpoint = lookup("GRAPH_ENDPOINT");
        config.login_endpoint = lookup("GRAPH_LOGIN_ENDPOINT");

        Ok((
            config,
            GraphCredentials {
                client_id,
                client_secret: SecretString::new(client_secret),
            },
        ))
    }
}
