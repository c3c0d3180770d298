//! Storage errors.

use std::path::PathBuf;

use nfe_core::SequenceKey;
use nfe_state::LifecycleError;
use thiserror::Error;

/// Failure to allocate a document number. The caller must not build a
/// document without one.
#[derive(Debug, Error)]
pub enum SequencingError {
    /// The counter file or its lock could not be read or written.
    #[error("sequence storage {path} unavailable: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The counter file exists but does not hold a valid counter.
    #[error("sequence counter {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Every number of the series has been used.
    #[error("numbering exhausted for {key}")]
    Exhausted { key: SequenceKey },
}

/// Failure in the artifact store or the lifecycle repository.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An artifact with the same name is already in place.
    #[error("artifact {path} already exists")]
    AlreadyExists { path: PathBuf },

    #[error("artifact {path} not found")]
    NotFound { path: PathBuf },

    #[error("lifecycle database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("lifecycle database migration: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A stored row does not decode to a valid record.
    #[error("corrupt lifecycle record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
