//! # Query and Status Subcommands

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use nfe_core::{AccessKey, QueryOutcome, Uf};

use crate::EXIT_REFUSED;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Access key to look up.
    pub key: String,

    /// Show the local lifecycle record and its transitions as well.
    #[arg(long)]
    pub local: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// State whose authority to ask; the issuer's state by default.
    #[arg(long)]
    pub uf: Option<Uf>,
}

pub async fn run_query(args: &QueryArgs, config: &Path) -> Result<u8> {
    let key = AccessKey::parse(&args.key).context("access key")?;
    let pipeline = crate::open_pipeline(config).await?;

    if args.local {
        match pipeline.record(&key).await? {
            Some(record) => {
                println!("Local record: {key}");
                println!("  State:    {}", record.state);
                println!("  Number:   {} (series {})", record.number, record.series);
                if let Some(protocol) = &record.protocol {
                    println!("  Protocol: {protocol}");
                }
                println!("  Updated:  {}", record.updated_at.to_rfc3339());
                for t in &record.snapshot.transitions {
                    println!("    {} → {} at {}: {}", t.from_state, t.to_state, t.timestamp, t.reason);
                }
            }
            None => println!("Local record: none for {key}"),
        }
    }

    let result = pipeline.query(&key).await?;
    let situation = match result.query_outcome() {
        QueryOutcome::Authorized => "AUTHORIZED".to_string(),
        QueryOutcome::Cancelled => "CANCELLED".to_string(),
        QueryOutcome::NotFound => "NOT FOUND".to_string(),
        QueryOutcome::Other(code) => format!("OTHER ({code})"),
    };
    println!("Authority: {situation}");
    println!("  Status: [{}] {}", result.status_code, result.motive);
    Ok(match result.query_outcome() {
        QueryOutcome::Authorized | QueryOutcome::Cancelled => 0,
        _ => EXIT_REFUSED,
    })
}

pub async fn run_status(args: &StatusArgs, config: &Path) -> Result<u8> {
    let pipeline = crate::open_pipeline(config).await?;
    let result = pipeline.status(args.uf).await?;
    let online = result.service_online();
    println!(
        "Service: {}",
        if online { "ONLINE" } else { "UNAVAILABLE" }
    );
    println!("  Status: [{}] {}", result.status_code, result.motive);
    Ok(if online { 0 } else { EXIT_REFUSED })
}
