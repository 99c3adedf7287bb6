//! Mailbox relocation CLI.
//!
//! Relocates one account to another mail server: configuration always,
//! content unless `--skip-content`. Exit code 0 on success; each fatal
//! failure site has its own small exit code so operators can script
//! against the outcome.
//!
//! ## Usage
//!
//! ```bash
//! mailbox_move user@example.com mail2.example.com
//! mailbox_move user@example.com mail2.example.com --dry-run -vv
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mailbox_move::directory::CommandDirectory;
use mailbox_move::{
    AccountMover, Collaborators, DelayPolicy, FallbackEndpoint, MoveOptions, MoveOutcome,
    MoveReport, DEFAULT_PROPAGATION_DELAY_SECS,
};

#[derive(Parser, Debug)]
#[command(
    name = "mailbox_move",
    version,
    about = "Relocate a mailbox account to another mail server"
)]
struct Cli {
    /// Account to relocate (user@domain).
    account: String,

    /// Destination mail server host name.
    dest_host: String,

    /// Directory for the content export artifact and the snapshot dump.
    #[arg(long, default_value = "/tmp")]
    tmp_dir: PathBuf,

    /// Relocate configuration only; skip content export and import.
    #[arg(long)]
    skip_content: bool,

    /// Extract, persist the snapshot, and stop; mutate nothing.
    #[arg(long)]
    dry_run: bool,

    /// -v for per-step detail, -vv for full diagnostics (also persists
    /// the snapshot on a live run).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Propagation delay between dependent directory operations.
    #[arg(long, default_value_t = DEFAULT_PROPAGATION_DELAY_SECS)]
    delay_secs: u64,

    /// Secondary upload URL tried once if the primary content import fails.
    #[arg(long)]
    fallback_url: Option<String>,

    /// Credential presented to the fallback upload endpoint.
    #[arg(long, requires = "fallback_url")]
    fallback_credential: Option<String>,
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "mailbox_move=info",
        1 => "mailbox_move=debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn summarize(report: &MoveReport) {
    for warning in &report.warnings {
        tracing::warn!(phase = %warning.phase, "{}", warning.detail);
    }
    tracing::info!(
        account = %report.account,
        dest_host = %report.dest_host,
        warnings = report.warnings.len(),
        replaced_signature_ids = report.replacements.len(),
        elapsed_ms = report.elapsed_ms,
        "done"
    );
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let directory = CommandDirectory::from_env();
    let dirs = Collaborators {
        query: &directory,
        mutate: &directory,
        transfer: &directory,
        privileged: &directory,
        secrets: &directory,
    };

    let mut options = MoveOptions::new(cli.account, cli.dest_host);
    options.tmp_dir = cli.tmp_dir;
    options.skip_content = cli.skip_content;
    options.dry_run = cli.dry_run;
    options.diagnostic = cli.verbose >= 2;
    options.fallback = cli.fallback_url.map(|url| FallbackEndpoint {
        url,
        credential: cli.fallback_credential.unwrap_or_default(),
    });

    let delays = DelayPolicy::fixed(Duration::from_secs(cli.delay_secs));

    match AccountMover::new(dirs, options, delays).run() {
        Ok(MoveOutcome::Completed(report)) => {
            summarize(&report);
            ExitCode::SUCCESS
        }
        Ok(MoveOutcome::DryRun(report)) => {
            if let Some(path) = &report.snapshot_path {
                tracing::info!(path = %path.display(), "dry run complete; snapshot persisted");
            }
            summarize(&report);
            ExitCode::SUCCESS
        }
        Ok(MoveOutcome::AlreadyOnHost) => {
            tracing::info!("account already on the destination host; nothing to do");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(exit_code = err.exit_code(), "{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
