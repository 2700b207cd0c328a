//! The `dirsync` binary: wires the Graph source, the SCIM target and the
//! mapping store into a reconciler run.

pub mod cli;
pub mod config;
pub mod error;
pub mod groups;
pub mod logging;
pub mod output;

use std::sync::Arc;
use std::time::Duration;

use dirsync_core::{
    FileMappingStore, FlushPolicy, IdentityMappingStore, MemoryMappingStore, Reconciler,
    ReconcilerConfig, RetryPolicy, RunReport,
};
use dirsync_graph::{GraphConfig, GraphDirectory};
use dirsync_scim::{ScimAccount, ScimAuth, ScimClient};
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::TargetConfig;
use crate::error::CliResult;

const SCIM_TIMEOUT: Duration = Duration::from_secs(60);

/// Engine settings derived from the flags.
pub fn reconciler_config(cli: &Cli) -> ReconcilerConfig {
    ReconcilerConfig {
        max_parallel_groups: usize::from(cli.max_parallel_groups),
        sync_member_attributes: !cli.skip_member_attributes,
        flush_policy: if cli.flush_per_mapping {
            FlushPolicy::PerMapping
        } else {
            FlushPolicy::EndOfRun
        },
        retry: RetryPolicy {
            max_retries: cli.max_retries,
            ..RetryPolicy::default()
        },
    }
}

/// Runs one sync with configuration read through `env`.
///
/// Ctrl-C cancels the run; writes already made are kept and, in live mode,
/// their mappings are flushed before returning.
pub async fn run<F>(cli: &Cli, env: F) -> CliResult<RunReport>
where
    F: Fn(&str) -> Option<String>,
{
    let (graph_config, credentials) = GraphConfig::from_lookup(&env)?;
    let target_config = TargetConfig::from_lookup(&env)?;
    let group_refs = groups::load_group_list(&cli.groups_json_file).await?;

    let directory = Arc::new(GraphDirectory::new(&graph_config, credentials)?);
    let client = ScimClient::new(
        &target_config.scim_url,
        ScimAuth::bearer(target_config.token.clone()),
        SCIM_TIMEOUT,
    )?;
    let account = Arc::new(ScimAccount::new(client));
    info!(tenant_id = %graph_config.tenant_id, scim_url = %target_config.scim_url, "Configured");

    let store: Arc<dyn IdentityMappingStore> = match &cli.mapping_file {
        Some(path) => Arc::new(FileMappingStore::open(path).await?),
        None => Arc::new(MemoryMappingStore::new()),
    };

    let config = reconciler_config(cli);
    let group_ids = groups::resolve_groups(&group_refs, directory.as_ref(), &config.retry).await?;

    let reconciler = Reconciler::new(directory.clone(), account, store, config);
    let cancel = reconciler.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let result = reconciler.run(&group_ids, cli.dry_run).await;
    interrupt.abort();
    directory.log_summary();

    let report = result?;
    if let Some(path) = &cli.report_file {
        output::write_report(path, &report).await?;
        info!(path = %path.display(), "Wrote run report");
    }
    Ok(report)
}
