//! # nfe-cli — Command Line for the NF-e Stack
//!
//! Provides the `nfe` binary.
//!
//! ## Subcommands
//!
//! - `nfe issue <input.yaml>`: issue one document; `--resubmit <key>`
//!   retries a document left pending.
//! - `nfe cancel <key> --reason`: cancel an authorized document.
//! - `nfe void-range --series --from --to --reason`: void unused numbers.
//! - `nfe query <key>` / `nfe status`: ask the authority.
//! - `nfe cert info`: inspect the configured certificate.
//! - `nfe sequence peek|next`: inspect or consume the numbering counter.
//!
//! ## Exit codes
//!
//! `0` success, `1` error, `2` the authority answered but refused.

pub mod cert;
pub mod event;
pub mod issue;
pub mod query;
pub mod sequence;

use std::path::Path;

use anyhow::{Context, Result};
use nfe_pipeline::{Pipeline, PipelineConfig};

/// The authority answered and refused.
pub const EXIT_REFUSED: u8 = 2;

/// Load the YAML configuration at `path`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    PipelineConfig::from_path(path).with_context(|| format!("loading {}", path.display()))
}

/// Load the configuration and open the pipeline.
pub async fn open_pipeline(path: &Path) -> Result<Pipeline> {
    let config = load_config(path)?;
    Pipeline::open(config).await.context("opening pipeline")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_names_the_file() {
        let err = load_config(Path::new("/nonexistent/nfe.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/nfe.yaml"));
    }
}
