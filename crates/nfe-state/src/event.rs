//! # Cancelling Events — Cancellation and Void Range
//!
//! An authorized document can only leave `Authorized` through one of two
//! acts registered with the authority:
//!
//! - a **cancellation event** (`tpEvento` 110111) naming the document's
//!   access key and authorization protocol;
//! - a **void range** (inutilização) declaring a run of numbers in one
//!   series unusable.
//!
//! Both carry a free-text justification of 15 to 255 characters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use nfe_core::access_key::MODEL_NFE;
use nfe_core::{AccessKey, Cnpj, DocumentNumber, Environment, Series, Timestamp, Uf};

/// Event type code of a cancellation.
pub const CANCELLATION_EVENT_TYPE: &str = "110111";

/// Errors constructing a cancelling event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Justification outside 15..=255 characters.
    #[error("justification must have 15 to 255 characters, got {len}")]
    JustificationLength {
        /// Character count after trimming.
        len: usize,
    },

    /// Event sequence outside 1..=20.
    #[error("event sequence must be 1 to 20, got {0}")]
    SequenceOutOfRange(u8),

    /// Range start after range end.
    #[error("void range start {first} is after end {last}")]
    InvertedRange {
        /// First number.
        first: u32,
        /// Last number.
        last: u32,
    },

    /// Authorization protocol is empty.
    #[error("authorization protocol is required")]
    MissingProtocol,
}

/// Justification text (`xJust`), trimmed, 15 to 255 characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Justification(String);

impl Justification {
    pub const MIN_CHARS: usize = 15;
    pub const MAX_CHARS: usize = 255;

    pub fn new(text: &str) -> Result<Self, EventError> {
        let trimmed = text.trim();
        let len = trimmed.chars().count();
        if !(Self::MIN_CHARS..=Self::MAX_CHARS).contains(&len) {
            return Err(EventError::JustificationLength { len });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Justification {
    type Error = EventError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<Justification> for String {
    fn from(j: Justification) -> Self {
        j.0
    }
}

// ─── Cancellation ────────────────────────────────────────────────────

/// Cancellation of an authorized document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationEvent {
    pub access_key: AccessKey,
    /// `nProt` of the authorization being cancelled.
    pub authorization_protocol: String,
    /// `nSeqEvento`, 1 for the first event of this type.
    pub sequence: u8,
    pub justification: Justification,
    pub issued_at: Timestamp,
}

impl CancellationEvent {
    pub fn new(
        access_key: AccessKey,
        authorization_protocol: String,
        sequence: u8,
        justification: Justification,
    ) -> Result<Self, EventError> {
        if !(1..=20).contains(&sequence) {
            return Err(EventError::SequenceOutOfRange(sequence));
        }
        if authorization_protocol.trim().is_empty() {
            return Err(EventError::MissingProtocol);
        }
        Ok(Self {
            access_key,
            authorization_protocol,
            sequence,
            justification,
            issued_at: Timestamp::now(),
        })
    }

    /// `Id` attribute of `infEvento`: `ID` + type + key + 2-digit sequence.
    pub fn element_id(&self) -> String {
        format!(
            "ID{}{}{:02}",
            CANCELLATION_EVENT_TYPE,
            self.access_key.as_str(),
            self.sequence
        )
    }

    /// Jurisdiction of the cancelled document, from its access key.
    pub fn uf_code(&self) -> &str {
        self.access_key.uf_code()
    }
}

// ─── Void Range ──────────────────────────────────────────────────────

/// A run of numbers in one series declared unusable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidRange {
    pub issuer: Cnpj,
    pub uf: Uf,
    /// Calendar year of the request.
    pub year: i32,
    pub environment: Environment,
    pub series: Series,
    pub first: DocumentNumber,
    pub last: DocumentNumber,
    pub justification: Justification,
}

impl VoidRange {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        issuer: Cnpj,
        uf: Uf,
        year: i32,
        environment: Environment,
        series: Series,
        first: DocumentNumber,
        last: DocumentNumber,
        justification: Justification,
    ) -> Result<Self, EventError> {
        if first > last {
            return Err(EventError::InvertedRange {
                first: first.get(),
                last: last.get(),
            });
        }
        Ok(Self {
            issuer,
            uf,
            year,
            environment,
            series,
            first,
            last,
            justification,
        })
    }

    /// `Id` attribute of `infInut`:
    /// `ID` + cUF + yy + CNPJ + model + series(3) + first(9) + last(9).
    pub fn element_id(&self) -> String {
        format!(
            "ID{:02}{:02}{}{}{}{}{}",
            self.uf.ibge_code(),
            self.year.rem_euclid(100),
            self.issuer.as_str(),
            MODEL_NFE,
            self.series.padded(),
            self.first.padded(),
            self.last.padded()
        )
    }

    /// Two-digit year (`ano`).
    pub fn short_year(&self) -> String {
        format!("{:02}", self.year.rem_euclid(100))
    }

    /// Whether `number` in `series` under `environment` falls in the range.
    pub fn covers(&self, environment: Environment, series: Series, number: DocumentNumber) -> bool {
        self.environment == environment
            && self.series == series
            && (self.first..=self.last).contains(&number)
    }

    /// Count of numbers in the range.
    pub fn count(&self) -> u32 {
        self.last.get() - self.first.get() + 1
    }
}
