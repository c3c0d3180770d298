//! # nfe-core — Foundational Types for the NF-e Stack
//!
//! This crate is the bedrock of the electronic fiscal document pipeline. It
//! defines the type-system primitives every other crate builds on and depends
//! on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for fiscal identifiers.** `Cnpj`, `Cpf`, `Series`,
//!    `DocumentNumber`, `AccessKey` are validated at construction, check
//!    digits included. No bare strings for identifiers.
//!
//! 2. **`CanonicalXml` newtype.** Every digest over XML flows through
//!    `CanonicalXml::exclusive()`. Signing raw serializer output is not
//!    expressible.
//!
//! 3. **Decimal money.** Amounts are `rust_decimal::Decimal`, never floats,
//!    and are rendered with a fixed scale at the XML boundary.
//!
//! 4. **One XML tree.** Documents are assembled as an `XmlElement` tree so
//!    element order is explicit in code and the same tree feeds the writer,
//!    the canonicalizer and the validator.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `nfe-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod access_key;
pub mod canonical;
pub mod document;
pub mod error;
pub mod identity;
pub mod jurisdiction;
pub mod money;
pub mod tax_code;
pub mod temporal;
pub mod transmission;
pub mod xml;

// Re-export primary types for ergonomic imports.
pub use access_key::{mod11_check_digit, AccessKey, AccessKeyParts};
pub use canonical::CanonicalXml;
pub use document::{Address, Issuer, LineItem, Recipient, TaxBreakdown, TaxLine, Totals};
pub use error::{IdentifierError, NfeError, XmlError};
pub use identity::{
    Cnpj, Cpf, DocumentNumber, NumericCode, SequenceKey, Series, StateRegistration, TaxId,
};
pub use jurisdiction::{Environment, Uf};
pub use tax_code::TaxKind;
pub use temporal::Timestamp;
pub use transmission::{AuthorizationOutcome, QueryOutcome, TransmissionResult};
pub use xml::{XmlElement, XmlNode, NFE_NAMESPACE};
