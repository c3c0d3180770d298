//! # Access Key — 44-Digit Document Identifier
//!
//! The access key uniquely identifies a fiscal document nationwide. Layout:
//!
//! ```text
//! cUF(2) AAMM(4) CNPJ(14) mod(2) serie(3) nNF(9) tpEmis(1) cNF(8) cDV(1)
//! ```
//!
//! ## Check Digit
//!
//! `cDV` is the modulus-11 digit of the preceding 43 digits: walk the digits
//! right-to-left multiplying by the cyclic weights `2,3,...,9,2,3,...`, sum,
//! and take `11 - (sum mod 11)`, except that a remainder of 0 or 1 yields `0`.
//!
//! ## Security Invariant
//!
//! `AccessKey` has a private field and is only constructed through
//! [`AccessKey::compose`] or [`AccessKey::parse`], both of which enforce the
//! length and check digit.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::IdentifierError;
use crate::identity::{Cnpj, DocumentNumber, NumericCode, Series};
use crate::jurisdiction::Uf;

/// Document model code for the electronic invoice.
pub const MODEL_NFE: &str = "55";

/// Compute the modulus-11 check digit of a digit string.
///
/// Returns `None` if the input contains a non-digit.
pub fn mod11_check_digit(digits: &str) -> Option<u8> {
    let mut sum: u32 = 0;
    let mut weight: u32 = 2;
    for b in digits.bytes().rev() {
        if !b.is_ascii_digit() {
            return None;
        }
        sum += u32::from(b - b'0') * weight;
        weight = if weight == 9 { 2 } else { weight + 1 };
    }
    let rem = sum % 11;
    // rem < 2 maps to 0; otherwise 11 - rem is always in 2..=9.
    Some(if rem < 2 { 0 } else { (11 - rem) as u8 })
}

/// Components from which an access key is composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyParts {
    pub uf: Uf,
    /// Emission date; only year and month are used.
    pub emitted_on: NaiveDate,
    pub issuer: Cnpj,
    pub series: Series,
    pub number: DocumentNumber,
    /// Emission type (`tpEmis`), `1` for normal emission.
    pub emission_type: u8,
    pub numeric_code: NumericCode,
}

/// A validated 44-digit access key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey(String);

impl AccessKey {
    pub const LEN: usize = 44;

    /// Compose a key from its parts and append the check digit.
    pub fn compose(parts: &AccessKeyParts) -> Result<Self, IdentifierError> {
        if parts.emission_type > 9 {
            return Err(IdentifierError::OutOfRange {
                kind: "emission type",
                value: parts.emission_type.to_string(),
            });
        }
        let prefix = format!(
            "{:02}{:02}{:02}{}{}{}{}{}{}",
            parts.uf.ibge_code(),
            parts.emitted_on.year() % 100,
            parts.emitted_on.month(),
            parts.issuer.as_str(),
            MODEL_NFE,
            parts.series.padded(),
            parts.number.padded(),
            parts.emission_type,
            parts.numeric_code.padded(),
        );
        debug_assert_eq!(prefix.len(), Self::LEN - 1);
        let dv = mod11_check_digit(&prefix).ok_or_else(|| IdentifierError::NonDigit {
            kind: "access key",
            value: prefix.clone(),
        })?;
        Ok(Self(format!("{prefix}{dv}")))
    }

    /// Parse an existing key, verifying length and check digit.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let raw = raw.trim();
        let raw = raw.strip_prefix("NFe").unwrap_or(raw);
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdentifierError::NonDigit {
                kind: "access key",
                value: raw.to_string(),
            });
        }
        if raw.len() != Self::LEN {
            return Err(IdentifierError::InvalidLength {
                kind: "access key",
                expected: Self::LEN,
                actual: raw.len(),
            });
        }
        let (prefix, dv) = raw.split_at(Self::LEN - 1);
        let expected = mod11_check_digit(prefix).map(|d| d.to_string());
        if expected.as_deref() != Some(dv) {
            return Err(IdentifierError::CheckDigit {
                kind: "access key",
                value: raw.to_string(),
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing check digit.
    pub fn check_digit(&self) -> u8 {
        self.0.as_bytes()[Self::LEN - 1] - b'0'
    }

    /// `cUF` portion.
    pub fn uf_code(&self) -> &str {
        &self.0[0..2]
    }

    /// Issuer CNPJ portion.
    pub fn issuer_digits(&self) -> &str {
        &self.0[6..20]
    }

    /// Series portion (3 digits).
    pub fn series_digits(&self) -> &str {
        &self.0[22..25]
    }

    /// Number portion (9 digits).
    pub fn number_digits(&self) -> &str {
        &self.0[25..34]
    }

    /// `cNF` portion (8 digits).
    pub fn numeric_code_digits(&self) -> &str {
        &self.0[35..43]
    }

    /// The `Id` attribute value of `infNFe`.
    pub fn element_id(&self) -> String {
        format!("NFe{}", self.0)
    }
}

impl std::fmt::Display for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccessKey {
    type Error = IdentifierError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccessKey> for String {
    fn from(value: AccessKey) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> AccessKeyParts {
        AccessKeyParts {
            uf: Uf::SP,
            emitted_on: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            issuer: Cnpj::parse("11222333000181").unwrap(),
            series: Series::new(1).unwrap(),
            number: DocumentNumber::new(4).unwrap(),
            emission_type: 1,
            numeric_code: NumericCode::new(12_345_678).unwrap(),
        }
    }

    #[test]
    fn compose_layout() {
        let key = AccessKey::compose(&parts()).unwrap();
        assert_eq!(key.as_str().len(), 44);
        assert!(key.as_str().starts_with("352403112223330001815500100000000411234567"));
        assert_eq!(key.uf_code(), "35");
        assert_eq!(key.issuer_digits(), "11222333000181");
        assert_eq!(key.series_digits(), "001");
        assert_eq!(key.number_digits(), "000000004");
        assert_eq!(key.numeric_code_digits(), "12345678");
        assert_eq!(key.element_id(), format!("NFe{key}"));
    }

    #[test]
    fn compose_then_parse() {
        let key = AccessKey::compose(&parts()).unwrap();
        let parsed = AccessKey::parse(key.as_str()).unwrap();
        assert_eq!(parsed, key);
        let with_prefix = AccessKey::parse(&key.element_id()).unwrap();
        assert_eq!(with_prefix, key);
    }

    #[test]
    fn parse_rejects_wrong_check_digit() {
        let key = AccessKey::compose(&parts()).unwrap();
        let mut s = key.as_str()[..43].to_string();
        s.push(char::from(b'0' + (key.check_digit() + 1) % 10));
        assert!(matches!(
            AccessKey::parse(&s).unwrap_err(),
            IdentifierError::CheckDigit { .. }
        ));
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(matches!(
            AccessKey::parse("1234").unwrap_err(),
            IdentifierError::InvalidLength { .. }
        ));
    }

    #[test]
    fn mod11_remainder_below_two_maps_to_zero() {
        // "0" -> sum 0 -> rem 0 -> 0
        assert_eq!(mod11_check_digit("0"), Some(0));
        // "5" * 2 = 10 -> rem 10 -> 1
        assert_eq!(mod11_check_digit("5"), Some(1));
        // "6" * 2 = 12 -> rem 1 -> 0
        assert_eq!(mod11_check_digit("6"), Some(0));
        assert_eq!(mod11_check_digit("12a"), None);
    }

    #[test]
    fn mod11_weights_wrap_after_nine() {
        // Nine ones: weights 2..9 then 2 -> sum 46 -> rem 2 -> 9
        assert_eq!(mod11_check_digit("111111111"), Some(9));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        /// Independent reference: explicit weight table, left-to-right.
        fn reference_dv(prefix: &str) -> u8 {
            let n = prefix.len();
            let mut sum = 0u32;
            for (i, c) in prefix.chars().enumerate() {
                let pos_from_right = (n - 1 - i) as u32;
                let weight = 2 + (pos_from_right % 8);
                sum += c.to_digit(10).unwrap() * weight;
            }
            match sum % 11 {
                0 | 1 => 0,
                r => (11 - r) as u8,
            }
        }

        proptest! {
            #[test]
            fn check_digit_matches_reference(prefix in "[0-9]{43}") {
                prop_assert_eq!(mod11_check_digit(&prefix), Some(reference_dv(&prefix)));
            }

            #[test]
            fn any_prefix_with_its_digit_parses(prefix in "[0-9]{43}") {
                let dv = mod11_check_digit(&prefix).unwrap();
                let key = format!("{prefix}{dv}");
                prop_assert!(AccessKey::parse(&key).is_ok());
            }
        }
    }
}
