//! # Business Input
//!
//! What a caller supplies to issue a document. Fields are optional at the
//! type level so that a missing field surfaces as
//! [`BuildError::MissingField`] with its path, instead of a deserialization
//! failure with no structure.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use nfe_core::{Issuer, LineItem, NumericCode, Recipient, TaxBreakdown, Timestamp, Totals};

use crate::error::BuildError;

/// One document's worth of business data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessInput {
    /// Usually filled from the configured issuer profile.
    pub issuer: Option<Issuer>,
    pub recipient: Option<Recipient>,
    /// `natOp`; the configured default applies when absent.
    pub operation_nature: Option<String>,
    /// Emission instant; now when absent.
    pub issued_at: Option<Timestamp>,
    /// `cNF`; drawn at random when absent.
    pub numeric_code: Option<NumericCode>,
    pub items: Vec<ItemInput>,
    pub freight: Decimal,
    pub insurance: Decimal,
    pub discount: Decimal,
    pub other: Decimal,
    /// Totals as declared by the caller. When absent they are computed
    /// from the items.
    pub declared_totals: Option<Totals>,
    /// Free-text notes for the taxpayer (`infCpl`).
    pub notes: Option<String>,
}

impl BusinessInput {
    pub fn issuer(&self) -> Result<&Issuer, BuildError> {
        self.issuer.as_ref().ok_or_else(|| BuildError::missing("issuer"))
    }

    pub fn recipient(&self) -> Result<&Recipient, BuildError> {
        self.recipient
            .as_ref()
            .ok_or_else(|| BuildError::missing("recipient"))
    }
}

/// One line as supplied by the caller, before taxes are computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemInput {
    pub code: Option<String>,
    pub description: Option<String>,
    pub ean: Option<String>,
    pub ncm: Option<String>,
    pub cfop: Option<String>,
    pub unit: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_value: Option<Decimal>,
    /// Merchandise origin (`orig`).
    pub origin: u8,
    /// Explicit tax detail. When present the tax adapter is not consulted.
    pub taxes: Option<TaxBreakdown>,
    /// Hints for the tax adapter.
    pub icms_cst: Option<String>,
    /// ICMS base reduction in percent, for CST 20 and 70.
    pub icms_base_reduction: Option<Decimal>,
    pub ipi_cst: Option<String>,
    pub ipi_rate: Option<Decimal>,
    pub pis_cofins_cst: Option<String>,
    pub additional_info: Option<String>,
}

impl ItemInput {
    /// `quantity × unit_value` rounded to cents, once both are present.
    pub fn gross_value(&self, index: usize) -> Result<Decimal, BuildError> {
        let quantity = require(&self.quantity, index, "quantity")?;
        let unit_value = require(&self.unit_value, index, "unit_value")?;
        Ok(nfe_core::money::round2(quantity * unit_value))
    }

    /// Combine with computed taxes into a document line.
    ///
    /// `index` is 0-based and used only for error paths.
    pub fn into_line_item(self, index: usize, taxes: TaxBreakdown) -> Result<LineItem, BuildError> {
        Ok(LineItem {
            code: require_text(self.code, index, "code")?,
            description: require_text(self.description, index, "description")?,
            ean: self.ean,
            ncm: require_text(self.ncm, index, "ncm")?,
            cfop: require_text(self.cfop, index, "cfop")?,
            unit: require_text(self.unit, index, "unit")?,
            quantity: require(&self.quantity, index, "quantity")?,
            unit_value: require(&self.unit_value, index, "unit_value")?,
            taxes,
            additional_info: self.additional_info,
        })
    }
}

fn require<T: Copy>(value: &Option<T>, index: usize, field: &str) -> Result<T, BuildError> {
    value.ok_or_else(|| BuildError::missing(format!("items[{index}].{field}")))
}

fn require_text(value: Option<String>, index: usize, field: &str) -> Result<String, BuildError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(BuildError::missing(format!("items[{index}].{field}"))),
    }
}
