//! # nfe CLI entry point
//!
//! Parses arguments, installs logging, and dispatches to the subcommand
//! handlers on a Tokio runtime.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nfe_cli::cert::{run_cert, CertArgs};
use nfe_cli::event::{run_cancel, run_void_range, CancelArgs, VoidRangeArgs};
use nfe_cli::issue::{run_issue, IssueArgs};
use nfe_cli::query::{run_query, run_status, QueryArgs, StatusArgs};
use nfe_cli::sequence::{run_sequence, SequenceArgs};

/// NF-e issuance toolchain.
///
/// Builds, validates, signs and transmits electronic invoices, and
/// manages their lifecycle with the state tax authority.
#[derive(Parser, Debug)]
#[command(name = "nfe", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to the pipeline configuration.
    #[arg(long, global = true, default_value = "nfe.yaml", env = "NFE_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Issue a document from a business input file.
    Issue(IssueArgs),

    /// Cancel an authorized document.
    Cancel(CancelArgs),

    /// Void a range of unused numbers.
    VoidRange(VoidRangeArgs),

    /// Ask the authority about a document.
    Query(QueryArgs),

    /// Check the authority's service status.
    Status(StatusArgs),

    /// Inspect the signing certificate.
    Cert(CertArgs),

    /// Inspect or consume the numbering counter.
    Sequence(SequenceArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("starting runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let config = cli.config;
    let result = runtime.block_on(async {
        match cli.command {
            Commands::Issue(args) => run_issue(&args, &config).await,
            Commands::Cancel(args) => run_cancel(&args, &config).await,
            Commands::VoidRange(args) => run_void_range(&args, &config).await,
            Commands::Query(args) => run_query(&args, &config).await,
            Commands::Status(args) => run_status(&args, &config).await,
            Commands::Cert(args) => run_cert(&args, &config),
            Commands::Sequence(args) => run_sequence(&args, &config),
        }
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
