//! # nfe-state — Fiscal Document Lifecycle
//!
//! Owns the `FiscalDocument` aggregate and the rules for moving it through
//! its lifecycle.
//!
//! ## State Machines
//!
//! - **Document** (`document.rs`): `Draft → Signed → Submitted →
//!   Authorized | Rejected`, with `FailedPendingRetry` for transport
//!   failures and `Authorized → Cancelled` through an accepted cancellation
//!   event or void range.
//!
//! - **Events** (`event.rs`): `CancellationEvent` and `VoidRange`, the two
//!   separately modeled acts that may cancel an authorized document.
//!
//! ## Design
//!
//! The business content and the XML tree of a document are only reachable
//! mutably while the document is a `Draft`. Once signed, the bytes that were
//! signed are the bytes that are transmitted and archived.

pub mod document;
pub mod event;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use document::{
    DocumentContent, DocumentSnapshot, DocumentState, FiscalDocument, LifecycleError,
    TransitionEvidence, TransitionRecord,
};
pub use event::{CancellationEvent, EventError, Justification, VoidRange, CANCELLATION_EVENT_TYPE};
