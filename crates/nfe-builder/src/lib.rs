//! # nfe-builder — Document Assembly
//!
//! Turns business input into a `Draft` fiscal document and produces the
//! request payloads for every authority operation.
//!
//! - **Configuration** (`config.rs`): `BuilderConfig`, the named defaults
//!   for every non-business field of the identification block.
//! - **Input** (`input.rs`): `BusinessInput` and `ItemInput` with optional
//!   fields, so a missing field is reported by path.
//! - **Taxes** (`tax.rs`): the `TaxCalculator` adapter contract and
//!   `StandardTaxCalculator`, a reference implementation.
//! - **Document** (`document.rs`): access key composition and the
//!   layout-ordered `NFe` tree.
//! - **Payloads** (`payload.rs`): authorization batch, receipt and protocol
//!   queries, cancellation event, void range and service status.
//!
//! ## Crate Policy
//!
//! - Assembly only. Format and arithmetic checks belong to `nfe-schema`;
//!   signing belongs to `nfe-crypto`.

pub mod config;
pub mod document;
pub mod error;
pub mod input;
pub mod payload;
pub mod tax;

pub use config::BuilderConfig;
pub use document::{DocumentBuilder, HOMOLOGATION_RECIPIENT_NAME, LAYOUT_VERSION};
pub use error::BuildError;
pub use input::{BusinessInput, ItemInput};
pub use tax::{PisCofinsRegime, StandardTaxCalculator, TaxCalculator, TaxContext, TaxError};
