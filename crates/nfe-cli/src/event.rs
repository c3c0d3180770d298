//! # Cancel and Void-Range Subcommands

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use nfe_core::{AccessKey, DocumentNumber, Series};

use crate::EXIT_REFUSED;

#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Access key of the authorized document (44 digits, `NFe` prefix
    /// optional).
    pub key: String,

    /// Justification, 15 to 255 characters.
    #[arg(long)]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct VoidRangeArgs {
    /// Series of the range; the configured series by default.
    #[arg(long)]
    pub series: Option<u16>,

    /// First number of the range.
    #[arg(long)]
    pub from: u32,

    /// Last number of the range.
    #[arg(long)]
    pub to: u32,

    /// Justification, 15 to 255 characters.
    #[arg(long)]
    pub reason: String,
}

pub async fn run_cancel(args: &CancelArgs, config: &Path) -> Result<u8> {
    let key = AccessKey::parse(&args.key).context("access key")?;
    let pipeline = crate::open_pipeline(config).await?;
    let outcome = pipeline.cancel(&key, &args.reason).await?;

    let verdict = if outcome.accepted { "ACCEPTED" } else { "REFUSED" };
    println!("Cancellation of {key}: {verdict}");
    println!("  Status:   [{}] {}", outcome.result.status_code, outcome.result.motive);
    if let Some(protocol) = &outcome.result.protocol {
        println!("  Protocol: {protocol}");
    }
    println!("  Artifact: {}", outcome.artifact.path.display());
    Ok(if outcome.accepted { 0 } else { EXIT_REFUSED })
}

pub async fn run_void_range(args: &VoidRangeArgs, config: &Path) -> Result<u8> {
    let series = args.series.map(Series::new).transpose().context("series")?;
    let first = DocumentNumber::new(args.from).context("--from")?;
    let last = DocumentNumber::new(args.to).context("--to")?;
    let pipeline = crate::open_pipeline(config).await?;
    let outcome = pipeline.void_range(series, first, last, &args.reason).await?;

    let verdict = if outcome.accepted { "ACCEPTED" } else { "REFUSED" };
    println!(
        "Void range {}..={} of series {}: {verdict}",
        outcome.range.first, outcome.range.last, outcome.range.series
    );
    println!("  Status:   [{}] {}", outcome.result.status_code, outcome.result.motive);
    for key in &outcome.voided {
        println!("  cancelled: {key}");
    }
    println!("  Artifact: {}", outcome.artifact.path.display());
    Ok(if outcome.accepted { 0 } else { EXIT_REFUSED })
}
