//! SCIM 2.0 target account for dirsync.
//!
//! Talks to a SCIM root such as the Databricks account console
//! (`{host}/api/2.0/accounts/{account_id}/scim/v2`) and exposes it through
//! [`dirsync_core::TargetAccount`]. Nothing here can delete or deactivate
//! a principal.

pub mod account;
pub mod auth;
pub mod client;
pub mod error;
pub mod models;

pub use account::ScimAccount;
pub use auth::ScimAuth;
pub use client::ScimClient;
pub use error::{ScimClientError, ScimClientResult};
pub use models::{ResourceType, ScimResource};
