//! # Issue Subcommand
//!
//! Reads one business input document (YAML) and runs it through the
//! pipeline, or resubmits a document left in `FAILED_PENDING_RETRY`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;

use nfe_builder::BusinessInput;
use nfe_core::{AccessKey, Series};
use nfe_pipeline::IssueOutcome;
use nfe_state::DocumentState;

use crate::EXIT_REFUSED;

#[derive(Args, Debug)]
pub struct IssueArgs {
    /// Business input (recipient, items, totals) as YAML.
    #[arg(required_unless_present = "resubmit")]
    pub input: Option<PathBuf>,

    /// Series to number from; the configured series by default.
    #[arg(long)]
    pub series: Option<u16>,

    /// Resubmit the document with this access key instead.
    #[arg(long, conflicts_with = "input")]
    pub resubmit: Option<String>,
}

pub fn read_input(path: &Path) -> Result<BusinessInput> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub async fn run_issue(args: &IssueArgs, config: &Path) -> Result<u8> {
    let pipeline = crate::open_pipeline(config).await?;

    let outcome = if let Some(key) = &args.resubmit {
        let key = AccessKey::parse(key).context("access key")?;
        pipeline.resubmit(&key).await?
    } else {
        let Some(path) = &args.input else {
            bail!("an input file is required");
        };
        let input = read_input(path)?;
        let series = args.series.map(Series::new).transpose().context("series")?;
        pipeline.issue(input, series).await?
    };
    report(&outcome);
    Ok(if outcome.state == DocumentState::Authorized {
        0
    } else {
        EXIT_REFUSED
    })
}

fn report(outcome: &IssueOutcome) {
    println!("Document: {}", outcome.access_key);
    println!("  Number:   {}", outcome.number);
    println!("  State:    {}", outcome.state);
    println!("  Status:   [{}] {}", outcome.result.status_code, outcome.result.motive);
    if let Some(protocol) = &outcome.result.protocol {
        println!("  Protocol: {protocol}");
    }
    println!("  Artifact: {}", outcome.artifact.path.display());
    for warning in &outcome.warnings {
        println!("  warning: {warning}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_business_input_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.yaml");
        std::fs::write(
            &path,
            r#"
operation_nature: Venda de mercadoria
items:
  - code: P001
    description: Camiseta algodao
    ncm: "61091000"
    cfop: "5102"
    unit: UN
    quantity: "2"
    unit_value: "10.00"
"#,
        )
        .unwrap();
        let input = read_input(&path).unwrap();
        assert_eq!(input.items.len(), 1);
        assert_eq!(input.operation_nature.as_deref(), Some("Venda de mercadoria"));
        assert!(input.issuer.is_none());
    }

    #[test]
    fn unreadable_input_names_the_file() {
        let err = read_input(Path::new("/nonexistent/input.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("input.yaml"));
    }
}
