//! # Tax Computation Adapter
//!
//! The pipeline treats tax computation as a collaborator: per item it asks a
//! [`TaxCalculator`] for a [`TaxBreakdown`] and renders whatever comes back.
//! A failure is a hard build error for the whole document.
//!
//! [`StandardTaxCalculator`] is a reference adapter covering the common
//! cases of a regime-normal seller. It is not a rules engine:
//!
//! - **ICMS**: internal rate of the issuer's state for same-state
//!   operations, 12% between South/Southeast states, 7% otherwise. CST 20
//!   and 70 apply the item's base reduction. Exempt codes carry no amounts.
//! - **IPI**: `53` (non-taxed output) unless the item says otherwise.
//! - **PIS/COFINS**: rates by regime (real 1.65/7.6, presumed 0.65/3.0,
//!   simples 0/0); CST 01/02 taxed, 04–09 exempt.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use nfe_core::money::{percent_of, round2};
use nfe_core::tax_code::{ipi_is_taxed, TaxKind, DEFAULT_IPI_CST};
use nfe_core::{Issuer, Recipient, TaxBreakdown, TaxLine, Uf};

use crate::input::ItemInput;

/// Failure reported by a tax adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaxError {
    /// The situation code is outside what the adapter implements.
    #[error("{tax} CST {cst} is not supported")]
    UnsupportedCst {
        /// Which tax.
        tax: TaxKind,
        /// The code requested.
        cst: String,
    },

    /// The code needs a parameter the item did not carry.
    #[error("{tax} CST {cst} requires {parameter}")]
    MissingParameter {
        tax: TaxKind,
        cst: String,
        /// Name of the absent item field.
        parameter: &'static str,
    },

    /// An external adapter could not answer.
    #[error("tax adapter unavailable: {0}")]
    Unavailable(String),
}

/// Who trades with whom, for rate selection.
#[derive(Debug, Clone, Copy)]
pub struct TaxContext<'a> {
    pub issuer: &'a Issuer,
    pub recipient: &'a Recipient,
}

impl TaxContext<'_> {
    pub fn is_interstate(&self) -> bool {
        self.issuer.address.uf != self.recipient.address.uf
    }
}

/// Per-item tax computation.
pub trait TaxCalculator: Send + Sync {
    /// Taxes for one item whose gross value is `gross`.
    fn compute(
        &self,
        item: &ItemInput,
        gross: Decimal,
        ctx: &TaxContext<'_>,
    ) -> Result<TaxBreakdown, TaxError>;
}

/// Federal contribution regime for PIS/COFINS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PisCofinsRegime {
    /// Lucro real, non-cumulative.
    Real,
    /// Lucro presumido, cumulative.
    Presumed,
    /// Simples nacional; collected through the unified payment.
    Simples,
}

impl PisCofinsRegime {
    /// Regime implied by the issuer's `CRT`.
    pub fn from_crt(crt: u8) -> Self {
        match crt {
            1 | 2 => Self::Simples,
            _ => Self::Real,
        }
    }

    /// (PIS, COFINS) rates in percent.
    pub fn rates(self) -> (Decimal, Decimal) {
        match self {
            Self::Real => (Decimal::new(165, 2), Decimal::new(76, 1)),
            Self::Presumed => (Decimal::new(65, 2), Decimal::new(3, 0)),
            Self::Simples => (Decimal::ZERO, Decimal::ZERO),
        }
    }

    fn default_cst(self) -> &'static str {
        match self {
            Self::Simples => "07",
            _ => "01",
        }
    }
}

/// Internal ICMS rate of a state, in percent.
pub fn internal_icms_rate(uf: Uf) -> Decimal {
    match uf {
        Uf::AC | Uf::AL | Uf::ES | Uf::GO | Uf::MT | Uf::MS | Uf::PA | Uf::RR | Uf::SC => {
            Decimal::from(17)
        }
        Uf::RO => Decimal::new(175, 1),
        _ => Decimal::from(18),
    }
}

/// Interstate ICMS rate between two states, in percent.
pub fn interstate_icms_rate(from: Uf, to: Uf) -> Decimal {
    if from.is_south_or_southeast() && to.is_south_or_southeast() {
        Decimal::from(12)
    } else {
        Decimal::from(7)
    }
}

/// Reference adapter for regime-normal sellers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardTaxCalculator {
    pub regime: PisCofinsRegime,
    /// ICMS code used when the item names none.
    pub default_icms_cst: String,
}

impl StandardTaxCalculator {
    pub fn new(regime: PisCofinsRegime) -> Self {
        Self {
            regime,
            default_icms_cst: "00".into(),
        }
    }

    /// Adapter for an issuer, deriving the regime from its `CRT`.
    pub fn for_issuer(issuer: &Issuer) -> Self {
        Self::new(PisCofinsRegime::from_crt(issuer.tax_regime))
    }

    fn icms(&self, item: &ItemInput, gross: Decimal, ctx: &TaxContext<'_>) -> Result<TaxLine, TaxError> {
        let cst = item
            .icms_cst
            .clone()
            .unwrap_or_else(|| self.default_icms_cst.clone());
        let issuer_uf = ctx.issuer.address.uf;
        let rate = if ctx.is_interstate() {
            interstate_icms_rate(issuer_uf, ctx.recipient.address.uf)
        } else {
            internal_icms_rate(issuer_uf)
        };

        match cst.as_str() {
            "00" | "10" | "90" => Ok(TaxLine {
                base: gross,
                rate,
                amount: percent_of(gross, rate),
                cst,
            }),
            "20" | "70" => {
                let reduction = item.icms_base_reduction.ok_or_else(|| TaxError::MissingParameter {
                    tax: TaxKind::Icms,
                    cst: cst.clone(),
                    parameter: "icms_base_reduction",
                })?;
                let base = round2(gross * (Decimal::ONE_HUNDRED - reduction) / Decimal::ONE_HUNDRED);
                Ok(TaxLine {
                    base,
                    rate,
                    amount: percent_of(base, rate),
                    cst,
                })
            }
            "30" | "40" | "41" | "50" | "51" | "60" => Ok(TaxLine::exempt(cst)),
            _ => Err(TaxError::UnsupportedCst {
                tax: TaxKind::Icms,
                cst,
            }),
        }
    }

    fn ipi(&self, item: &ItemInput, gross: Decimal) -> Result<TaxLine, TaxError> {
        let cst = item
            .ipi_cst
            .clone()
            .unwrap_or_else(|| DEFAULT_IPI_CST.to_string());
        if !TaxKind::Ipi.accepts(&cst) {
            return Err(TaxError::UnsupportedCst {
                tax: TaxKind::Ipi,
                cst,
            });
        }
        if !ipi_is_taxed(&cst) {
            return Ok(TaxLine::exempt(cst));
        }
        let rate = item.ipi_rate.unwrap_or_default();
        Ok(TaxLine {
            base: gross,
            rate,
            amount: percent_of(gross, rate),
            cst,
        })
    }

    fn pis_cofins(&self, item: &ItemInput, gross: Decimal) -> Result<(TaxLine, TaxLine), TaxError> {
        let cst = item
            .pis_cofins_cst
            .clone()
            .unwrap_or_else(|| self.regime.default_cst().to_string());
        match cst.as_str() {
            "04" | "05" | "06" | "07" | "08" | "09" => {
                Ok((TaxLine::exempt(cst.clone()), TaxLine::exempt(cst)))
            }
            c if c == "03" || !TaxKind::Pis.accepts(c) => Err(TaxError::UnsupportedCst {
                tax: TaxKind::Pis,
                cst,
            }),
            _ => {
                let (pis_rate, cofins_rate) = self.regime.rates();
                let line = |rate: Decimal| TaxLine {
                    cst: cst.clone(),
                    base: gross,
                    rate,
                    amount: percent_of(gross, rate),
                };
                Ok((line(pis_rate), line(cofins_rate)))
            }
        }
    }
}

impl TaxCalculator for StandardTaxCalculator {
    fn compute(
        &self,
        item: &ItemInput,
        gross: Decimal,
        ctx: &TaxContext<'_>,
    ) -> Result<TaxBreakdown, TaxError> {
        let icms = self.icms(item, gross, ctx)?;
        let ipi = self.ipi(item, gross)?;
        let (pis, cofins) = self.pis_cofins(item, gross)?;
        Ok(TaxBreakdown {
            origin: item.origin,
            icms: Some(icms),
            ipi: Some(ipi),
            pis: Some(pis),
            cofins: Some(cofins),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfe_state::test_support::{sample_address, sample_issuer, sample_recipient};

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn item() -> ItemInput {
        ItemInput {
            quantity: Some(Decimal::from(2)),
            unit_value: Some(Decimal::from(50)),
            ..ItemInput::default()
        }
    }

    fn compute(item: &ItemInput, recipient_uf: Uf, regime: PisCofinsRegime) -> Result<TaxBreakdown, TaxError> {
        let issuer = sample_issuer();
        let mut recipient = sample_recipient();
        recipient.address = sample_address(recipient_uf);
        let ctx = TaxContext {
            issuer: &issuer,
            recipient: &recipient,
        };
        StandardTaxCalculator::new(regime).compute(item, Decimal::from(100), &ctx)
    }

    #[test]
    fn same_state_uses_internal_rate() {
        let taxes = compute(&item(), Uf::SP, PisCofinsRegime::Real).unwrap();
        let icms = taxes.icms.unwrap();
        assert_eq!(icms.cst, "00");
        assert_eq!(icms.rate, Decimal::from(18));
        assert_eq!(icms.amount, d("18.00"));
    }

    #[test]
    fn interstate_rates() {
        let south = compute(&item(), Uf::RJ, PisCofinsRegime::Real).unwrap();
        assert_eq!(south.icms.unwrap().amount, d("12.00"));
        let north = compute(&item(), Uf::BA, PisCofinsRegime::Real).unwrap();
        assert_eq!(north.icms.unwrap().amount, d("7.00"));
    }

    #[test]
    fn base_reduction_requires_parameter() {
        let mut i = item();
        i.icms_cst = Some("20".into());
        let err = compute(&i, Uf::SP, PisCofinsRegime::Real).unwrap_err();
        assert!(matches!(err, TaxError::MissingParameter { parameter: "icms_base_reduction", .. }));

        i.icms_base_reduction = Some(Decimal::from(40));
        let icms = compute(&i, Uf::SP, PisCofinsRegime::Real).unwrap().icms.unwrap();
        assert_eq!(icms.base, d("60.00"));
        assert_eq!(icms.amount, d("10.80"));
    }

    #[test]
    fn exempt_icms_has_no_amounts() {
        let mut i = item();
        i.icms_cst = Some("41".into());
        let icms = compute(&i, Uf::SP, PisCofinsRegime::Real).unwrap().icms.unwrap();
        assert_eq!(icms.amount, Decimal::ZERO);
        assert_eq!(icms.base, Decimal::ZERO);
    }

    #[test]
    fn unknown_icms_code_is_an_error() {
        let mut i = item();
        i.icms_cst = Some("99".into());
        assert!(matches!(
            compute(&i, Uf::SP, PisCofinsRegime::Real),
            Err(TaxError::UnsupportedCst { tax: TaxKind::Icms, .. })
        ));
    }

    #[test]
    fn ipi_defaults_to_non_taxed() {
        let taxes = compute(&item(), Uf::SP, PisCofinsRegime::Real).unwrap();
        assert_eq!(taxes.ipi.unwrap(), TaxLine::exempt("53"));

        let mut i = item();
        i.ipi_cst = Some("50".into());
        i.ipi_rate = Some(Decimal::from(5));
        let ipi = compute(&i, Uf::SP, PisCofinsRegime::Real).unwrap().ipi.unwrap();
        assert_eq!(ipi.amount, d("5.00"));
    }

    #[test]
    fn pis_cofins_by_regime() {
        let real = compute(&item(), Uf::SP, PisCofinsRegime::Real).unwrap();
        assert_eq!(real.pis.unwrap().amount, d("1.65"));
        assert_eq!(real.cofins.unwrap().amount, d("7.60"));

        let presumed = compute(&item(), Uf::SP, PisCofinsRegime::Presumed).unwrap();
        assert_eq!(presumed.pis.unwrap().amount, d("0.65"));
        assert_eq!(presumed.cofins.unwrap().amount, d("3.00"));

        let simples = compute(&item(), Uf::SP, PisCofinsRegime::Simples).unwrap();
        assert_eq!(simples.pis.unwrap().cst, "07");
        assert_eq!(simples.cofins.unwrap().amount, Decimal::ZERO);
    }

    #[test]
    fn regime_from_crt() {
        assert_eq!(PisCofinsRegime::from_crt(1), PisCofinsRegime::Simples);
        assert_eq!(PisCofinsRegime::from_crt(3), PisCofinsRegime::Real);
    }

    #[test]
    fn internal_rate_table_spot_checks() {
        assert_eq!(internal_icms_rate(Uf::RO), d("17.5"));
        assert_eq!(internal_icms_rate(Uf::MS), Decimal::from(17));
        assert_eq!(internal_icms_rate(Uf::RJ), Decimal::from(18));
    }
}
