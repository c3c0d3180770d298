//! # nfe-store — Durable Storage
//!
//! Everything the pipeline must not lose across a crash.
//!
//! ## Design
//!
//! - **Sequence allocator** (`sequence.rs`): one counter file per series
//!   and environment, read-incremented-rewritten under an exclusive file
//!   lock. No in-memory counter.
//! - **Artifact store** (`artifact.rs`): signed XML in `pending/`, `sent/`
//!   and `failed/`, written with fsync and atomic rename.
//! - **Lifecycle repository** (`repository.rs`): SQLite via `sqlx`, with
//!   the queries exposed to reporting layers.
//!
//! ## Crate Policy
//!
//! - The allocator and artifact store are synchronous; async callers run
//!   them on a blocking thread.
//! - Byte fidelity: artifacts are stored and moved as opaque bytes.

pub mod artifact;
pub mod error;
pub mod repository;
pub mod sequence;

pub use artifact::{Artifact, ArtifactKind, ArtifactLocation, ArtifactStore};
pub use error::{SequencingError, StoreError};
pub use repository::{DocumentRecord, EventRecord, VoidRangeRecord};
pub use sequence::{FileSequenceAllocator, SequenceAllocator};
