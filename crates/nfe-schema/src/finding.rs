//! # Validation Findings
//!
//! A finding names the element it concerns by path
//! (`/NFe/infNFe/det[1]/prod/NCM`), a machine-readable kind, and a message
//! fit for an end user. Errors block signing; warnings are reported and
//! carried along.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What went wrong, independent of where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    // Hard errors.
    MissingElement,
    UnexpectedElement,
    OutOfOrder,
    MalformedIdentifier,
    MalformedValue,
    InvalidCode,
    ItemValueDivergence,
    TotalsDivergence,
    TooManyItems,

    // Warnings.
    LowUnitPrice,
    LargeItemCount,
    MissingTaxDetail,
    RecipientIndicator,
}

impl FindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingElement => "missing_element",
            Self::UnexpectedElement => "unexpected_element",
            Self::OutOfOrder => "out_of_order",
            Self::MalformedIdentifier => "malformed_identifier",
            Self::MalformedValue => "malformed_value",
            Self::InvalidCode => "invalid_code",
            Self::ItemValueDivergence => "item_value_divergence",
            Self::TotalsDivergence => "totals_divergence",
            Self::TooManyItems => "too_many_items",
            Self::LowUnitPrice => "low_unit_price",
            Self::LargeItemCount => "large_item_count",
            Self::MissingTaxDetail => "missing_tax_detail",
            Self::RecipientIndicator => "recipient_indicator",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    /// Element path, `/`-separated, with 1-based indices for repeated
    /// elements.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {}: [{}] {}", self.path, self.kind, self.message)
    }
}

/// Outcome of validating one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    errors: Vec<Finding>,
    warnings: Vec<Finding>,
}

impl ValidationResult {
    /// No hard errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Finding] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Finding] {
        &self.warnings
    }

    /// Whether any error of `kind` was found.
    pub fn has_error(&self, kind: FindingKind) -> bool {
        self.errors.iter().any(|f| f.kind == kind)
    }

    pub fn has_warning(&self, kind: FindingKind) -> bool {
        self.warnings.iter().any(|f| f.kind == kind)
    }

    /// The warnings when there are no errors; otherwise the errors as a
    /// [`ValidationError`].
    pub fn into_result(self) -> Result<Vec<Finding>, ValidationError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(ValidationError::Invalid {
                errors: Findings(self.errors),
                warnings: self.warnings,
            })
        }
    }

    pub(crate) fn error(&mut self, kind: FindingKind, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(Finding {
            kind,
            path: path.into(),
            message: message.into(),
        });
    }

    pub(crate) fn warn(&mut self, kind: FindingKind, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(Finding {
            kind,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// A list of findings rendered one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Findings(pub Vec<Finding>);

impl Findings {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Finding] {
        &self.0
    }
}

impl fmt::Display for Findings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, finding) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{finding}")?;
        }
        Ok(())
    }
}

/// A document with hard errors. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("document failed validation with {} error(s):\n{errors}", .errors.len())]
    Invalid {
        errors: Findings,
        /// Warnings found alongside the errors.
        warnings: Vec<Finding>,
    },
}

impl ValidationError {
    pub fn errors(&self) -> &[Finding] {
        match self {
            Self::Invalid { errors, .. } => errors.as_slice(),
        }
    }
}
