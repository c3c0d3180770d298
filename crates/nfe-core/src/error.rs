//! # Error Types — Structured Error Hierarchy
//!
//! Defines the leaf error types shared across the NF-e stack. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Identifier errors name the identifier kind and the offending value so
//!   callers can render a precise message without re-parsing.
//! - XML errors carry the parser message and, where known, the element path.

use thiserror::Error;

/// Top-level error type for `nfe-core`.
#[derive(Error, Debug)]
pub enum NfeError {
    /// A fiscal identifier failed validation.
    #[error("identifier error: {0}")]
    Identifier(#[from] IdentifierError),

    /// XML parsing or structure error.
    #[error("xml error: {0}")]
    Xml(#[from] XmlError),

    /// Timestamp or date parsing failure.
    #[error("temporal error: {0}")]
    Temporal(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validation failure for a fiscal identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// The identifier does not have the required number of digits.
    #[error("{kind} must have {expected} digits, got {actual}")]
    InvalidLength {
        /// Identifier kind (e.g. "CNPJ").
        kind: &'static str,
        /// Required digit count.
        expected: usize,
        /// Digit count found.
        actual: usize,
    },

    /// The identifier contains characters other than ASCII digits.
    #[error("{kind} must contain only digits: {value:?}")]
    NonDigit {
        /// Identifier kind.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// The check digit(s) do not match.
    #[error("{kind} check digit mismatch: {value}")]
    CheckDigit {
        /// Identifier kind.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// Numeric value outside the allowed range.
    #[error("{kind} out of range: {value}")]
    OutOfRange {
        /// Identifier kind.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Unknown state abbreviation or IBGE code.
    #[error("unknown jurisdiction: {0}")]
    UnknownJurisdiction(String),
}

/// Error while reading or navigating an XML tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    /// The input is not well-formed XML.
    #[error("malformed xml: {0}")]
    Malformed(String),

    /// The document has no root element.
    #[error("document has no root element")]
    NoRoot,

    /// A closing tag did not match the open element.
    #[error("mismatched closing tag: expected </{expected}>, found </{found}>")]
    MismatchedTag {
        /// Name of the element left open.
        expected: String,
        /// Name found in the closing tag.
        found: String,
    },

    /// A required element was not present.
    #[error("missing element: {0}")]
    MissingElement(String),
}
