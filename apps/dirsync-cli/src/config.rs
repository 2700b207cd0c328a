//! Target account settings read from the environment.

use secrecy::SecretString;

use crate::error::{CliError, CliResult};

/// Where the SCIM target lives and how to authenticate.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub scim_url: String,
    pub token: SecretString,
}

impl TargetConfig {
    pub fn from_env() -> CliResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the SCIM root in this order:
    ///
    /// 1. `DIRSYNC_SCIM_URL`
    /// 2. `DATABRICKS_HOST` + `DATABRICKS_ACCOUNT_ID` (account console)
    /// 3. `DATABRICKS_HOST` alone (workspace-level SCIM)
    ///
    /// The token comes from `DIRSYNC_SCIM_TOKEN`, else `DATABRICKS_TOKEN`.
    pub fn from_lookup<F>(lookup: F) -> CliResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let scim_url = match (
            var("DIRSYNC_SCIM_URL"),
            var("DATABRICKS_HOST"),
            var("DATABRICKS_ACCOUNT_ID"),
        ) {
            (Some(url), _, _) => url.trim_end_matches('/').to_string(),
            (None, Some(host), Some(account)) => {
                format!("{}/api/2.0/accounts/{account}/scim/v2", normalize_host(&host))
            }
            (None, Some(host), None) => {
                format!("{}/api/2.0/preview/scim/v2", normalize_host(&host))
            }
            (None, None, _) => {
                return Err(CliError::Config(
                    "unknown SCIM target, set DIRSYNC_SCIM_URL or DATABRICKS_HOST".to_string(),
                ))
            }
        };

        let token = var("DIRSYNC_SCIM_TOKEN")
            .or_else(|| var("DATABRICKS_TOKEN"))
            .ok_or_else(|| {
                CliError::Config(
                    "missing SCIM token, set DIRSYNC_SCIM_TOKEN or DATABRICKS_TOKEN".to_string(),
                )
            })?;

        Ok(Self {
            scim_url,
            token: SecretString::new(token),
        })
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}
