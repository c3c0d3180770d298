//! Errors raised while assembling documents and request payloads.

use nfe_core::{IdentifierError, NfeError};
use thiserror::Error;

use crate::tax::TaxError;

/// Bad business input or configuration. Never retried.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A required business field is absent.
    #[error("missing required field: {field}")]
    MissingField {
        /// Dotted path of the field, e.g. `items[0].ncm`.
        field: String,
    },

    /// A field is present but unusable for assembly.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Dotted path of the field.
        field: String,
        /// Why the value was refused.
        reason: String,
    },

    /// The tax computation adapter failed for an item.
    #[error("tax computation failed for item {item}: {source}")]
    Tax {
        /// 1-based item number (`nItem`).
        item: usize,
        #[source]
        source: TaxError,
    },

    /// An identifier could not be composed.
    #[error("identifier error: {0}")]
    Identifier(#[from] IdentifierError),

    /// A builder default is out of range.
    #[error("invalid builder configuration: {0}")]
    InvalidConfig(String),
}

impl BuildError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

impl From<NfeError> for BuildError {
    fn from(err: NfeError) -> Self {
        match err {
            NfeError::Identifier(e) => Self::Identifier(e),
            other => Self::InvalidConfig(other.to_string()),
        }
    }
}
