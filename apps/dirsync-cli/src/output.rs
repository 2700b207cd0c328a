//! Human-readable run summary and the JSON report file.

use dirsync_core::{ActionStatus, RunReport};
use std::path::Path;

use crate::error::CliResult;

/// Renders the end-of-run summary printed to stdout.
pub fn render_summary(report: &RunReport) -> String {
    let summary = report.summary();
    let mode = if report.dry_run { " (dry run)" } else { "" };
    let mut out = format!(
        "Run {}{mode}: {} group(s), {} action(s), {} warning(s), {} failed\n",
        report.run_id,
        summary.groups,
        summary.total_actions,
        summary.warnings,
        summary.failed()
    );

    for (action_type, count) in &summary.by_type {
        out.push_str(&format!("  {action_type}: {count}\n"));
    }
    for (kind, count) in &summary.created {
        out.push_str(&format!("  created {kind}: {count}\n"));
    }

    if report.dry_run {
        for action in report.actions() {
            out.push_str(&format!("  would {action}\n"));
        }
    }
    for record in report.records() {
        if let ActionStatus::Failed { reason } = &record.status {
            out.push_str(&format!("  failed to {}: {reason}\n", record.action));
        }
    }
    for warning in &report.warnings {
        out.push_str(&format!("  warning: {warning}\n"));
    }
    out
}

pub fn print_summary(report: &RunReport) {
    print!("{}", render_summary(report));
}

/// Writes the report as pretty JSON.
pub async fn write_report(path: &Path, report: &RunReport) -> CliResult<()> {
    let json = serde_json::to_vec_pretty(report).map_err(dirsync_core::SyncError::from)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    Ok(())
}
