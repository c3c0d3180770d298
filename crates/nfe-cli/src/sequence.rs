//! # Sequence Subcommand
//!
//! Reads or consumes the numbering counter of one series. `next` burns a
//! number: use it only to reserve one for a document issued elsewhere.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use nfe_core::{Series, SequenceKey};
use nfe_store::{FileSequenceAllocator, SequenceAllocator};

#[derive(Args, Debug)]
pub struct SequenceArgs {
    #[command(subcommand)]
    pub command: SequenceCommand,

    /// Series; the configured series by default.
    #[arg(long, global = true)]
    pub series: Option<u16>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCommand {
    /// Print the number the next document would get.
    Peek,
    /// Consume and print the next number.
    Next,
}

pub fn run_sequence(args: &SequenceArgs, config: &Path) -> Result<u8> {
    let config = crate::load_config(config)?;
    let series = args.series.map(Series::new).transpose().context("series")?;
    let key: SequenceKey = config.sequence_key(series);
    let allocator = FileSequenceAllocator::open(&config.storage.sequence_dir)
        .with_context(|| format!("opening {}", config.storage.sequence_dir.display()))?;
    let number = match args.command {
        SequenceCommand::Peek => allocator.peek(key)?,
        SequenceCommand::Next => allocator.next_number(key)?,
    };
    println!("{key}: {number}");
    Ok(0)
}
