//! # Jurisdiction Primitives — States and Environments
//!
//! The tax authority a document is filed with is the issuer's state (UF).
//! Each state has a two-digit IBGE code that appears as `cUF` in the
//! document, in the access key and in the SOAP header.
//!
//! `Environment` selects the live (`tpAmb=1`) or test (`tpAmb=2`) endpoints.
//! Numbering is independent per environment.

use serde::{Deserialize, Serialize};

use crate::error::IdentifierError;

/// Brazilian federative unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Uf {
    AC,
    AL,
    AP,
    AM,
    BA,
    CE,
    DF,
    ES,
    GO,
    MA,
    MT,
    MS,
    MG,
    PA,
    PB,
    PR,
    PE,
    PI,
    RJ,
    RN,
    RS,
    RO,
    RR,
    SC,
    SP,
    SE,
    TO,
}

/// (state, abbreviation, IBGE code)
const UF_TABLE: [(Uf, &str, u8); 27] = [
    (Uf::AC, "AC", 12),
    (Uf::AL, "AL", 27),
    (Uf::AP, "AP", 16),
    (Uf::AM, "AM", 13),
    (Uf::BA, "BA", 29),
    (Uf::CE, "CE", 23),
    (Uf::DF, "DF", 53),
    (Uf::ES, "ES", 32),
    (Uf::GO, "GO", 52),
    (Uf::MA, "MA", 21),
    (Uf::MT, "MT", 51),
    (Uf::MS, "MS", 50),
    (Uf::MG, "MG", 31),
    (Uf::PA, "PA", 15),
    (Uf::PB, "PB", 25),
    (Uf::PR, "PR", 41),
    (Uf::PE, "PE", 26),
    (Uf::PI, "PI", 22),
    (Uf::RJ, "RJ", 33),
    (Uf::RN, "RN", 24),
    (Uf::RS, "RS", 43),
    (Uf::RO, "RO", 11),
    (Uf::RR, "RR", 14),
    (Uf::SC, "SC", 42),
    (Uf::SP, "SP", 35),
    (Uf::SE, "SE", 28),
    (Uf::TO, "TO", 17),
];

impl Uf {
    /// All states in table order.
    pub fn all() -> impl Iterator<Item = Uf> {
        UF_TABLE.iter().map(|(uf, _, _)| *uf)
    }

    /// Two-letter abbreviation.
    pub fn as_str(self) -> &'static str {
        UF_TABLE
            .iter()
            .find(|(uf, _, _)| *uf == self)
            .map(|(_, abbr, _)| *abbr)
            .unwrap_or("??")
    }

    /// IBGE numeric code (`cUF`).
    pub fn ibge_code(self) -> u8 {
        UF_TABLE
            .iter()
            .find(|(uf, _, _)| *uf == self)
            .map(|(_, _, code)| *code)
            .unwrap_or(0)
    }

    /// Look up a state by its IBGE code.
    pub fn from_ibge_code(code: u8) -> Result<Self, IdentifierError> {
        UF_TABLE
            .iter()
            .find(|(_, _, c)| *c == code)
            .map(|(uf, _, _)| *uf)
            .ok_or_else(|| IdentifierError::UnknownJurisdiction(code.to_string()))
    }

    /// Look up a state by abbreviation (case-insensitive).
    pub fn parse(abbr: &str) -> Result<Self, IdentifierError> {
        let upper = abbr.trim().to_ascii_uppercase();
        UF_TABLE
            .iter()
            .find(|(_, a, _)| *a == upper)
            .map(|(uf, _, _)| *uf)
            .ok_or_else(|| IdentifierError::UnknownJurisdiction(abbr.to_string()))
    }

    /// South and Southeast states, relevant for the 12% interstate rate.
    pub fn is_south_or_southeast(self) -> bool {
        matches!(
            self,
            Self::SP | Self::RJ | Self::MG | Self::ES | Self::PR | Self::SC | Self::RS
        )
    }
}

impl std::fmt::Display for Uf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Uf {
    type Err = IdentifierError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Uf {
    type Error = IdentifierError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Uf> for String {
    fn from(value: Uf) -> Self {
        value.as_str().to_string()
    }
}

// ─── Environment ─────────────────────────────────────────────────────

/// Authority environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Live environment, `tpAmb=1`.
    Production,
    /// Test environment, `tpAmb=2`.
    Homologation,
}

impl Environment {
    /// `tpAmb` code.
    pub fn code(self) -> u8 {
        match self {
            Self::Production => 1,
            Self::Homologation => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, IdentifierError> {
        match code {
            1 => Ok(Self::Production),
            2 => Ok(Self::Homologation),
            other => Err(IdentifierError::OutOfRange {
                kind: "environment",
                value: other.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Homologation => "homologation",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = IdentifierError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "producao" | "1" => Ok(Self::Production),
            "homologation" | "homologacao" | "2" => Ok(Self::Homologation),
            other => Err(IdentifierError::OutOfRange {
                kind: "environment",
                value: other.to_string(),
            }),
        }
    }
}
