//! # nfe-schema — Document Validation
//!
//! Checks an assembled document before it is signed. Every problem is
//! collected into a [`ValidationResult`] as a [`Finding`] naming the
//! element path, so a caller can show the full list at once.
//!
//! ## Design
//!
//! - **Layout** (`layout.rs`): ordered element slots for the subset of the
//!   4.00 layout the pipeline emits, and a generic sequence checker.
//! - **Validation** (`validate.rs`): field formats, code sets shared with
//!   the builder through `nfe_core::tax_code`, and reconciliation of items,
//!   totals and payments within one cent.
//! - **Findings** (`finding.rs`): errors block signing; warnings travel
//!   with the document.
//!
//! ## Crate Policy
//!
//! - Pure functions over the XML tree. No I/O and no logging.
//! - A document that passes here can still be rejected by the authority;
//!   the goal is to catch what can be caught locally.

pub mod finding;
pub mod layout;
pub mod validate;

pub use finding::{Finding, FindingKind, Findings, ValidationError, ValidationResult};
pub use validate::{validate, Validator, ValidatorConfig, MAX_ITEMS};
