//! dirsync - one-way sync of Entra ID groups into a SCIM account.

use clap::Parser;
use dirsync_cli::cli::Cli;
use dirsync_cli::{logging, output};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(
        logging::default_filter(cli.verbose, cli.debug),
        cli.log_format,
    );

    match dirsync_cli::run(&cli, |key| std::env::var(key).ok()).await {
        Ok(report) => {
            output::print_summary(&report);
            let code = if report.summary().failed() > 0 { 1 } else { 0 };
            std::process::exit(code);
        }
        Err(e) => {
            tracing::error!(error = %e, "Sync failed");
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
