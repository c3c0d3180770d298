//! # Fiscal Identifiers — Validated Newtypes
//!
//! Newtype wrappers for the identifiers that appear on a fiscal document.
//! Each type validates on construction, so a value that exists is well-formed.
//!
//! ## Check Digits
//!
//! - **CNPJ** (company tax ID, 14 digits): two modulus-11 digits, weights
//!   `5..2,9..2` then `6..2,9..2`.
//! - **CPF** (individual tax ID, 11 digits): two modulus-11 digits, weights
//!   `10..2` then `11..2`.
//!
//! In both, a remainder below 2 yields digit `0`, otherwise `11 - remainder`.
//! Inputs consisting of one repeated digit pass the arithmetic but are
//! rejected as invalid registrations.
//!
//! Formatting punctuation (`.`, `/`, `-`, spaces) is stripped before
//! validation.

use serde::{Deserialize, Serialize};

use crate::error::IdentifierError;
use crate::jurisdiction::Environment;

/// Keep only ASCII digits, rejecting anything other than common punctuation.
fn strip_formatting(kind: &'static str, raw: &str) -> Result<String, IdentifierError> {
    let mut digits = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !matches!(c, '.' | '/' | '-' | ' ') {
            return Err(IdentifierError::NonDigit {
                kind,
                value: raw.to_string(),
            });
        }
    }
    Ok(digits)
}

fn digit_values(s: &str) -> Vec<u32> {
    s.bytes().map(|b| u32::from(b - b'0')).collect()
}

fn weighted_mod11(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    let rem = sum % 11;
    if rem < 2 {
        0
    } else {
        11 - rem
    }
}

fn all_same_digit(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(first) => bytes.all(|b| b == first),
        None => true,
    }
}

// ─── CNPJ ────────────────────────────────────────────────────────────

const CNPJ_WEIGHTS_1: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const CNPJ_WEIGHTS_2: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Company tax registration number (14 digits, two check digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cnpj(String);

impl Cnpj {
    /// Parse and validate a CNPJ, accepting formatted input
    /// (`11.222.333/0001-81`) or bare digits.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let digits = strip_formatting("CNPJ", raw)?;
        if digits.len() != 14 {
            return Err(IdentifierError::InvalidLength {
                kind: "CNPJ",
                expected: 14,
                actual: digits.len(),
            });
        }
        if all_same_digit(&digits) {
            return Err(IdentifierError::CheckDigit {
                kind: "CNPJ",
                value: digits,
            });
        }
        let d = digit_values(&digits);
        let dv1 = weighted_mod11(&d[..12], &CNPJ_WEIGHTS_1);
        let dv2 = weighted_mod11(&d[..13], &CNPJ_WEIGHTS_2);
        if d[12] != dv1 || d[13] != dv2 {
            return Err(IdentifierError::CheckDigit {
                kind: "CNPJ",
                value: digits,
            });
        }
        Ok(Self(digits))
    }

    /// Compute the two check digits for a 12-digit CNPJ base.
    pub fn check_digits(base: &str) -> Result<(u32, u32), IdentifierError> {
        let digits = strip_formatting("CNPJ", base)?;
        if digits.len() != 12 {
            return Err(IdentifierError::InvalidLength {
                kind: "CNPJ base",
                expected: 12,
                actual: digits.len(),
            });
        }
        let mut d = digit_values(&digits);
        let dv1 = weighted_mod11(&d, &CNPJ_WEIGHTS_1);
        d.push(dv1);
        let dv2 = weighted_mod11(&d, &CNPJ_WEIGHTS_2);
        Ok((dv1, dv2))
    }

    /// The 14 bare digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cnpj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cnpj {
    type Error = IdentifierError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Cnpj> for String {
    fn from(value: Cnpj) -> Self {
        value.0
    }
}

// ─── CPF ─────────────────────────────────────────────────────────────

const CPF_WEIGHTS_1: [u32; 9] = [10, 9, 8, 7, 6, 5, 4, 3, 2];
const CPF_WEIGHTS_2: [u32; 10] = [11, 10, 9, 8, 7, 6, 5, 4, 3, 2];

/// Individual taxpayer number (11 digits, two check digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cpf(String);

impl Cpf {
    /// Parse and validate a CPF, accepting formatted input
    /// (`123.456.789-09`) or bare digits.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let digits = strip_formatting("CPF", raw)?;
        if digits.len() != 11 {
            return Err(IdentifierError::InvalidLength {
                kind: "CPF",
                expected: 11,
                actual: digits.len(),
            });
        }
        if all_same_digit(&digits) {
            return Err(IdentifierError::CheckDigit {
                kind: "CPF",
                value: digits,
            });
        }
        let d = digit_values(&digits);
        let dv1 = weighted_mod11(&d[..9], &CPF_WEIGHTS_1);
        let dv2 = weighted_mod11(&d[..10], &CPF_WEIGHTS_2);
        if d[9] != dv1 || d[10] != dv2 {
            return Err(IdentifierError::CheckDigit {
                kind: "CPF",
                value: digits,
            });
        }
        Ok(Self(digits))
    }

    /// The 11 bare digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cpf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cpf {
    type Error = IdentifierError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Cpf> for String {
    fn from(value: Cpf) -> Self {
        value.0
    }
}

/// A recipient is identified either by company or by personal tax ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxId {
    Cnpj(Cnpj),
    Cpf(Cpf),
}

impl TaxId {
    /// Element name used in the document (`CNPJ` or `CPF`).
    pub fn element_name(&self) -> &'static str {
        match self {
            Self::Cnpj(_) => "CNPJ",
            Self::Cpf(_) => "CPF",
        }
    }

    /// Bare digits.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cnpj(c) => c.as_str(),
            Self::Cpf(c) => c.as_str(),
        }
    }
}

// ─── State registration ──────────────────────────────────────────────

/// State tax registration (IE): either the literal `ISENTO` (exempt) or
/// 2 to 14 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateRegistration(String);

impl StateRegistration {
    /// Marker for exempt registrations.
    pub const EXEMPT: &'static str = "ISENTO";

    /// Parse a state registration.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(Self::EXEMPT) {
            return Ok(Self(Self::EXEMPT.to_string()));
        }
        let digits = strip_formatting("IE", trimmed)?;
        if !(2..=14).contains(&digits.len()) {
            return Err(IdentifierError::InvalidLength {
                kind: "IE",
                expected: 14,
                actual: digits.len(),
            });
        }
        Ok(Self(digits))
    }

    /// Whether this is the exempt marker.
    pub fn is_exempt(&self) -> bool {
        self.0 == Self::EXEMPT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StateRegistration {
    type Error = IdentifierError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StateRegistration> for String {
    fn from(value: StateRegistration) -> Self {
        value.0
    }
}

// ─── Numbering ───────────────────────────────────────────────────────

/// Document series, 1 to 999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Series(u16);

impl Series {
    pub const MAX: u16 = 999;

    pub fn new(value: u16) -> Result<Self, IdentifierError> {
        if value == 0 || value > Self::MAX {
            return Err(IdentifierError::OutOfRange {
                kind: "series",
                value: value.to_string(),
            });
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// Zero-padded three-digit form used inside access keys and IDs.
    pub fn padded(self) -> String {
        format!("{:03}", self.0)
    }
}

impl std::fmt::Display for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Series {
    type Error = IdentifierError;
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Series> for u16 {
    fn from(value: Series) -> Self {
        value.0
    }
}

/// Document number, 1 to 999,999,999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct DocumentNumber(u32);

impl DocumentNumber {
    pub const MAX: u32 = 999_999_999;

    pub fn new(value: u32) -> Result<Self, IdentifierError> {
        if value == 0 || value > Self::MAX {
            return Err(IdentifierError::OutOfRange {
                kind: "document number",
                value: value.to_string(),
            });
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Zero-padded nine-digit form used inside access keys and IDs.
    pub fn padded(self) -> String {
        format!("{:09}", self.0)
    }
}

impl std::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for DocumentNumber {
    type Error = IdentifierError;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocumentNumber> for u32 {
    fn from(value: DocumentNumber) -> Self {
        value.0
    }
}

/// The 8-digit numeric code (`cNF`) embedded in the access key.
///
/// The authority rejects a code equal to the document number, so
/// [`NumericCode::random_for`] never produces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumericCode(u32);

impl NumericCode {
    pub const MAX: u32 = 99_999_999;

    pub fn new(value: u32) -> Result<Self, IdentifierError> {
        if value > Self::MAX {
            return Err(IdentifierError::OutOfRange {
                kind: "numeric code",
                value: value.to_string(),
            });
        }
        Ok(Self(value))
    }

    /// Draw a random code distinct from `number`.
    pub fn random_for(number: DocumentNumber) -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        loop {
            let candidate = rng.gen_range(0..=Self::MAX);
            if candidate != number.get() {
                return Self(candidate);
            }
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Zero-padded eight-digit form.
    pub fn padded(self) -> String {
        format!("{:08}", self.0)
    }
}

/// Numbering scope: numbers are unique per series within one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceKey {
    pub series: Series,
    pub environment: Environment,
}

impl SequenceKey {
    pub fn new(series: Series, environment: Environment) -> Self {
        Self {
            series,
            environment,
        }
    }
}

impl std::fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.series, self.environment)
    }
}
