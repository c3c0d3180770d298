//! # Fiscal Document Model
//!
//! Business data carried by a fiscal document: the parties, the ordered line
//! items with their tax breakdown, and the document totals.
//!
//! These types hold *values*; the lifecycle aggregate that owns them lives
//! in `nfe-state`, and their XML rendering lives in `nfe-builder`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identity::{Cnpj, StateRegistration, TaxId};
use crate::jurisdiction::Uf;
use crate::money::round2;

/// IBGE country code for Brazil.
pub const BRAZIL_COUNTRY_CODE: &str = "1058";

fn default_country_code() -> String {
    BRAZIL_COUNTRY_CODE.to_string()
}

fn default_country() -> String {
    "Brasil".to_string()
}

/// Postal address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    pub district: String,
    /// 7-digit IBGE municipality code.
    pub city_code: String,
    pub city: String,
    pub uf: Uf,
    /// 8-digit CEP.
    pub postal_code: String,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// The issuing company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub cnpj: Cnpj,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_name: Option<String>,
    pub state_registration: StateRegistration,
    /// Taxation regime (`CRT`): 1 simples nacional, 2 simples with excess,
    /// 3 normal regime. 0 means unset.
    #[serde(default)]
    pub tax_regime: u8,
    pub address: Address,
}

/// The recipient, a company or an individual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub tax_id: TaxId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_registration: Option<StateRegistration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub address: Address,
}

impl Recipient {
    /// `indIEDest`: 1 taxpayer with IE, 2 exempt, 9 non-taxpayer.
    pub fn ie_indicator(&self) -> u8 {
        match (&self.tax_id, &self.state_registration) {
            (TaxId::Cnpj(_), Some(ie)) if ie.is_exempt() => 2,
            (TaxId::Cnpj(_), Some(_)) => 1,
            _ => 9,
        }
    }
}

/// One tax on one item: situation code, base, rate (percent) and amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLine {
    pub cst: String,
    #[serde(default)]
    pub base: Decimal,
    #[serde(default)]
    pub rate: Decimal,
    #[serde(default)]
    pub amount: Decimal,
}

impl TaxLine {
    /// A line with no base or amount.
    pub fn exempt(cst: impl Into<String>) -> Self {
        Self {
            cst: cst.into(),
            base: Decimal::ZERO,
            rate: Decimal::ZERO,
            amount: Decimal::ZERO,
        }
    }
}

/// Per-item taxes as supplied by the tax computation adapter.
///
/// A `None` component means the adapter supplied no detail for that tax;
/// the builder renders the configured non-taxed default for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    /// Merchandise origin (`orig`), 0 for domestic.
    #[serde(default)]
    pub origin: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icms: Option<TaxLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipi: Option<TaxLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pis: Option<TaxLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cofins: Option<TaxLine>,
}

impl TaxBreakdown {
    fn amount(line: &Option<TaxLine>) -> Decimal {
        line.as_ref().map(|l| l.amount).unwrap_or_default()
    }

    pub fn icms_amount(&self) -> Decimal {
        Self::amount(&self.icms)
    }

    pub fn ipi_amount(&self) -> Decimal {
        Self::amount(&self.ipi)
    }

    pub fn pis_amount(&self) -> Decimal {
        Self::amount(&self.pis)
    }

    pub fn cofins_amount(&self) -> Decimal {
        Self::amount(&self.cofins)
    }

    /// Approximate total tax burden for the item (`vTotTrib`).
    pub fn total_amount(&self) -> Decimal {
        self.icms_amount() + self.ipi_amount() + self.pis_amount() + self.cofins_amount()
    }

    /// Whether any of ICMS, PIS or COFINS detail is missing.
    pub fn is_incomplete(&self) -> bool {
        self.icms.is_none() || self.pis.is_none() || self.cofins.is_none()
    }
}

/// One line of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub code: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ean: Option<String>,
    /// 8-digit merchandise classification.
    pub ncm: String,
    /// 4-digit fiscal operation code.
    pub cfop: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_value: Decimal,
    #[serde(default)]
    pub taxes: TaxBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

impl LineItem {
    /// `quantity × unit_value`, rounded to cents.
    pub fn gross_value(&self) -> Decimal {
        round2(self.quantity * self.unit_value)
    }
}

/// Document totals (`ICMSTot`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Totals {
    pub icms_base: Decimal,
    pub icms: Decimal,
    pub products: Decimal,
    pub freight: Decimal,
    pub insurance: Decimal,
    pub discount: Decimal,
    pub ipi: Decimal,
    pub pis: Decimal,
    pub cofins: Decimal,
    pub other: Decimal,
    /// Total document value (`vNF`).
    pub document: Decimal,
    /// Approximate tax burden (`vTotTrib`).
    pub approximate_taxes: Decimal,
}

impl Totals {
    /// Totals implied by the items.
    pub fn from_items(items: &[LineItem]) -> Self {
        let mut t = Totals::default();
        for item in items {
            t.products += item.gross_value();
            if let Some(icms) = &item.taxes.icms {
                t.icms_base += icms.base;
                t.icms += icms.amount;
            }
            t.ipi += item.taxes.ipi_amount();
            t.pis += item.taxes.pis_amount();
            t.cofins += item.taxes.cofins_amount();
            t.approximate_taxes += item.taxes.total_amount();
        }
        t.document = t.document_value();
        t
    }

    /// `vNF`: products less discount, plus charges and IPI.
    pub fn document_value(&self) -> Decimal {
        self.products - self.discount + self.freight + self.insurance + self.other + self.ipi
    }
}
