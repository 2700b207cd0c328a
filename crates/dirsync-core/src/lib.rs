//! Reconciliation engine for one-way, additive directory synchronization.
//!
//! Whitelisted source groups are flattened into their leaf principals,
//! every principal is mapped to (or created in) the target account, and
//! each group's target membership is brought in line with the source.
//! Principals are never deleted or disabled; the action plan has no
//! variant that could express it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dirsync_core::{MemoryMappingStore, Reconciler, ReconcilerConfig, SourceDirectory, TargetAccount};
//!
//! # async fn example(
//! #     source: Arc<dyn SourceDirectory>,
//! #     target: Arc<dyn TargetAccount>,
//! # ) -> Result<(), dirsync_core::SyncError> {
//! let store = Arc::new(MemoryMappingStore::new());
//! let reconciler = Reconciler::new(source, target, store, ReconcilerConfig::default());
//!
//! let report = reconciler.run(&["3f2a9c1e-0000-0000-0000-000000000001".into()], true).await?;
//! for action in report.actions() {
//!     println!("{action}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod expander;
pub mod ids;
pub mod mapper;
pub mod model;
pub mod plan;
pub mod profile;
pub mod reconciler;
pub mod retry;
pub mod snapshot;
pub mod store;
pub mod traits;
pub mod writer;

// Re-exports
pub use error::{SyncError, SyncResult};
pub use expander::{Expansion, GroupExpander};
pub use ids::{SourceId, TargetId};
pub use mapper::{IdentityMapper, Resolution, ResolutionOrigin, Resolved};
pub use model::{
    EffectiveMembership, IdentityMapping, MemberRef, PrincipalAttributes, PrincipalKind,
    SkippedMember, SourceGroup, SourcePrincipal, TargetPrincipal,
};
pub use plan::{
    ActionRecord, ActionStatus, GroupReport, ReconciliationAction, RunReport, RunSummary,
    SyncWarning,
};
pub use reconciler::{Reconciler, ReconcilerConfig};
pub use retry::RetryPolicy;
pub use snapshot::SourceSnapshot;
pub use store::{FileMappingStore, FlushPolicy, IdentityMappingStore, MemoryMappingStore};
pub use traits::{CreateOutcome, SourceDirectory, TargetAccount};
pub use writer::{Creation, TargetWriter};
