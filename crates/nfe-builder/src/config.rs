//! # Builder Defaults
//!
//! Every field of the identification block that is not business data has a
//! named default here. Deployments override them in the `builder` section
//! of the pipeline configuration; nothing in the assembly code falls back
//! to an inline literal.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use nfe_core::temporal::parse_offset;

use crate::error::BuildError;

/// Named defaults for the identification block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// `tpEmis`: 1 normal emission.
    pub emission_type: u8,
    /// `tpImp`: 1 portrait DANFE.
    pub print_format: u8,
    /// `finNFe`: 1 regular document.
    pub purpose: u8,
    /// `indFinal`: 1 sale to a final consumer.
    pub final_consumer: u8,
    /// `indPres`: 1 in-person operation.
    pub presence: u8,
    /// `procEmi`: 0 issued by the taxpayer's own application.
    pub emission_process: u8,
    /// `verProc`.
    pub process_version: String,
    /// `natOp` used when the input names none.
    pub operation_nature: String,
    /// `CRT` rendered when the issuer profile leaves it unset.
    pub tax_regime: u8,
    /// Offset used to render `dhEmi` and to date the access key.
    pub utc_offset: String,
    /// `tpNF`: 1 outbound.
    pub operation_type: u8,
    /// `modFrete`: 9 no freight.
    pub freight_mode: u8,
    /// `tPag`: 01 cash.
    pub payment_method: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            emission_type: 1,
            print_format: 1,
            purpose: 1,
            final_consumer: 1,
            presence: 1,
            emission_process: 0,
            process_version: "1.0".into(),
            operation_nature: "Venda".into(),
            tax_regime: 3,
            utc_offset: "-03:00".into(),
            operation_type: 1,
            freight_mode: 9,
            payment_method: "01".into(),
        }
    }
}

impl BuilderConfig {
    /// Parsed [`BuilderConfig::utc_offset`].
    pub fn offset(&self) -> Result<FixedOffset, BuildError> {
        parse_offset(&self.utc_offset).map_err(|e| BuildError::InvalidConfig(e.to_string()))
    }

    /// Check every default against the values the layout admits.
    pub fn validate(&self) -> Result<(), BuildError> {
        let check = |name: &str, value: u8, allowed: &[u8]| {
            if allowed.contains(&value) {
                Ok(())
            } else {
                Err(BuildError::InvalidConfig(format!(
                    "{name} must be one of {allowed:?}, got {value}"
                )))
            }
        };
        check("emission_type", self.emission_type, &[1, 2, 3, 4, 5, 6, 7, 9])?;
        check("print_format", self.print_format, &[0, 1, 2, 3, 4, 5])?;
        check("purpose", self.purpose, &[1, 2, 3, 4])?;
        check("final_consumer", self.final_consumer, &[0, 1])?;
        check("presence", self.presence, &[0, 1, 2, 3, 4, 5, 9])?;
        check("emission_process", self.emission_process, &[0, 1, 2, 3])?;
        check("tax_regime", self.tax_regime, &[1, 2, 3])?;
        check("operation_type", self.operation_type, &[0, 1])?;
        check("freight_mode", self.freight_mode, &[0, 1, 2, 3, 4, 9])?;

        if self.process_version.is_empty() || self.process_version.len() > 20 {
            return Err(BuildError::InvalidConfig(
                "process_version must have 1 to 20 characters".into(),
            ));
        }
        if self.operation_nature.trim().is_empty() || self.operation_nature.chars().count() > 60 {
            return Err(BuildError::InvalidConfig(
                "operation_nature must have 1 to 60 characters".into(),
            ));
        }
        if self.payment_method.len() != 2 || !self.payment_method.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(BuildError::InvalidConfig(
                "payment_method must be a two-digit code".into(),
            ));
        }
        self.offset()?;
        Ok(())
    }
}
