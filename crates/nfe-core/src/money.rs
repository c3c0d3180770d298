//! # Money — Decimal Amounts at the XML Boundary
//!
//! Amounts are `Decimal` end to end. The document layout fixes the number of
//! fractional digits per field: currency values use 2, quantities and unit
//! values up to 4 (rendered here with 4), PIS/COFINS rates 4, other rates 2.

use rust_decimal::{Decimal, RoundingStrategy};

/// Maximum divergence allowed between declared and computed totals.
pub const TOTALS_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Round half away from zero to `scale` fractional digits.
pub fn round(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Round to cents.
pub fn round2(value: Decimal) -> Decimal {
    round(value, 2)
}

/// Render with exactly `scale` fractional digits.
pub fn format_fixed(value: Decimal, scale: u32) -> String {
    let mut v = round(value, scale);
    v.rescale(scale);
    v.to_string()
}

/// Render a currency value (`0.00`).
pub fn format_amount(value: Decimal) -> String {
    format_fixed(value, 2)
}

/// Whether two amounts agree within [`TOTALS_TOLERANCE`].
pub fn within_tolerance(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= TOTALS_TOLERANCE
}

/// `base * rate / 100`, rounded to cents.
pub fn percent_of(base: Decimal, rate: Decimal) -> Decimal {
    round2(base * rate / Decimal::ONE_HUNDRED)
}
