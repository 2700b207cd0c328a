//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

pub mod fake_source;
pub mod fake_target;

use std::sync::Arc;

use dirsync_core::{
    FlushPolicy, IdentityMappingStore, Reconciler, ReconcilerConfig, RetryPolicy,
};

use fake_source::FakeSource;
use fake_target::FakeTarget;

/// Config with no retry delays.
pub fn test_config() -> ReconcilerConfig {
    ReconcilerConfig {
        max_parallel_groups: 4,
        sync_member_attributes: true,
        flush_policy: FlushPolicy::EndOfRun,
        retry: RetryPolicy::immediate(3),
    }
}

pub fn reconciler(
    source: &Arc<FakeSource>,
    target: &Arc<FakeTarget>,
    store: Arc<dyn IdentityMappingStore>,
) -> Reconciler {
    reconciler_with(source, target, store, test_config())
}

pub fn reconciler_with(
    source: &Arc<FakeSource>,
    target: &Arc<FakeTarget>,
    store: Arc<dyn IdentityMappingStore>,
    config: ReconcilerConfig,
) -> Reconciler {
    Reconciler::new(source.clone(), target.clone(), store, config)
}

/// Installs a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
