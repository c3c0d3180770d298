//! Pipeline error taxonomy.
//!
//! Each component keeps its own error type; [`PipelineError`] wraps them so
//! a caller can match on the kind and still print the component's motive.
//! An authority rejection is never an error. It comes back as an outcome.

use nfe_builder::BuildError;
use nfe_core::{AccessKey, IdentifierError};
use nfe_crypto::{CertificateError, SignError};
use nfe_schema::ValidationError;
use nfe_sefaz::TransportError;
use nfe_state::{EventError, LifecycleError};
use nfe_store::{SequencingError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// Retry with backoff. Never skip a number.
    #[error(transparent)]
    Sequencing(#[from] SequencingError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Sign(#[from] SignError),

    /// No answer was obtained. The document, if any, is recorded as
    /// `FailedPendingRetry`, or `Rejected` when the failure is terminal.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error("configuration: {0}")]
    Config(String),

    #[error("no document with access key {0}")]
    NotFound(String),

    /// The authority's view of a document contradicts the local record.
    #[error("authority reports {access_key} as {status_code} ({motive}), local record disagrees")]
    Diverged {
        access_key: AccessKey,
        status_code: u16,
        motive: String,
    },

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),
}

impl PipelineError {
    /// Short label for logs, metrics and exit codes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Certificate(_) => "certificate",
            Self::Sequencing(_) => "sequencing",
            Self::Build(_) => "build",
            Self::Validation(_) => "validation",
            Self::Sign(_) => "sign",
            Self::Transport(e) => e.kind(),
            Self::Lifecycle(_) => "lifecycle",
            Self::Store(_) => "store",
            Self::Event(_) => "event",
            Self::Identifier(_) => "identifier",
            Self::Config(_) => "config",
            Self::NotFound(_) => "not_found",
            Self::Diverged { .. } => "diverged",
            Self::Task(_) => "task",
        }
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}
