//! Microsoft Graph source directory for dirsync.
//!
//! Reads whitelisted Entra ID groups and their direct members with an
//! app-only token (client credentials flow) and exposes them through
//! [`dirsync_core::SourceDirectory`].
//!
//! # Example
//!
//! ```no_run
//! use dirsync_core::{SourceDirectory, SourceId};
//! use dirsync_graph::{GraphConfig, GraphDirectory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (config, credentials) = GraphConfig::from_env()?;
//! let directory = GraphDirectory::new(&config, credentials)?;
//! let group = directory.get_group(&SourceId::new("8f0c...")).await?;
//! println!("{} has {} direct members", group.principal.display_name, group.member_refs.len());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod graph_client;

pub use auth::TokenCache;
pub use config::{GraphCloud, GraphConfig, GraphCredentials};
pub use directory::{DownloadStats, GraphDirectory};
pub use error::{GraphError, GraphResult};
pub use graph_client::GraphClient;
