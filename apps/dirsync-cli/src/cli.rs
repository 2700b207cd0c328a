//! Command-line flags.

use clap::Parser;
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Sync whitelisted Entra ID groups, their nested members and service
/// principals into a SCIM account. Never deletes or disables anything.
#[derive(Debug, Clone, Parser)]
#[command(name = "dirsync", author, version, about, long_about = None)]
pub struct Cli {
    /// JSON array of group object ids, display names or {"id"|"name"} objects
    #[arg(long, value_name = "PATH", env = "DIRSYNC_GROUPS_JSON_FILE")]
    pub groups_json_file: PathBuf,

    /// Plan and report actions without writing to the target
    #[arg(long)]
    pub dry_run: bool,

    /// Debug logs for dirsync itself
    #[arg(long, short)]
    pub verbose: bool,

    /// Debug logs for everything, including HTTP clients
    #[arg(long)]
    pub debug: bool,

    /// Persist source-to-target id mappings here between runs
    #[arg(long, value_name = "PATH", env = "DIRSYNC_MAPPING_FILE")]
    pub mapping_file: Option<PathBuf>,

    /// Write the mapping file after every new mapping instead of at the end
    #[arg(long, requires = "mapping_file")]
    pub flush_per_mapping: bool,

    /// Groups reconciled concurrently
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    pub max_parallel_groups: u16,

    /// Retries for throttled or failing API calls
    #[arg(long, default_value_t = 6)]
    pub max_retries: u32,

    /// Only create members and set memberships; leave attributes of
    /// existing members alone
    #[arg(long)]
    pub skip_member_attributes: bool,

    /// Write the JSON run report here
    #[arg(long, value_name = "PATH")]
    pub report_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["dirsync", "--groups-json-file", "groups.json"]).unwrap();
        assert!(!cli.dry_run);
        assert_eq!(cli.max_parallel_groups, 4);
        assert_eq!(cli.max_retries, 6);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_flush_per_mapping_needs_mapping_file() {
        let err = Cli::try_parse_from([
            "dirsync",
            "--groups-json-file",
            "g.json",
            "--flush-per-mapping",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_zero_parallelism_is_rejected() {
        assert!(Cli::try_parse_from([
            "dirsync",
            "--groups-json-file",
            "g.json",
            "--max-parallel-groups",
            "0",
        ])
        .is_err());
    }
}
