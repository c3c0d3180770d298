//! # nfe-pipeline — Document Issuance Orchestration
//!
//! Ties the components together into the issuance, resubmission,
//! cancellation and void-range flows.
//!
//! ## Design
//!
//! - **Configuration** (`config.rs`): one YAML file per installation; the
//!   certificate passphrase can come from `NFE_CERT_PASSWORD`.
//! - **Pipeline** (`pipeline.rs`): explicitly constructed; every
//!   dependency (certificate store, allocator, tax adapter, transport) is
//!   owned by the [`Pipeline`] value, none is a global.
//! - **Errors** (`error.rs`): [`PipelineError`] wraps each component's
//!   error and exposes a short `kind()` label.
//!
//! ## Crate Policy
//!
//! - Authority rejections are outcomes, never errors.
//! - Blocking file work (counter lock, artifact fsync) runs on the
//!   blocking pool.
//! - Metrics go through the `metrics` facade. Installing an exporter is
//!   the host's choice.

pub mod config;
pub mod error;
pub mod pipeline;

pub use config::{CertificateConfig, PipelineConfig, StorageConfig, PASSWORD_ENV};
pub use error::PipelineError;
pub use pipeline::{EventOutcome, IssueOutcome, Pipeline, VoidOutcome};
