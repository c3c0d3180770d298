//! # Tax Situation Codes
//!
//! The authority publishes a closed set of situation codes (CST) per tax.
//! The code also selects which XML group carries the tax on an item
//! (`ICMS00`, `IPINT`, `PISAliq`, ...), so the builder and the validator
//! share these tables.

/// ICMS situation codes accepted for regime-normal issuers.
pub const ICMS_CST: &[&str] = &["00", "10", "20", "30", "40", "41", "50", "51", "60", "70", "90"];

/// IPI situation codes.
pub const IPI_CST: &[&str] = &[
    "00", "01", "02", "03", "04", "05", "49", "50", "51", "52", "53", "54", "55", "99",
];

/// PIS and COFINS situation codes (the two taxes share one table).
pub const PIS_COFINS_CST: &[&str] = &[
    "01", "02", "03", "04", "05", "06", "07", "08", "09", "49", "50", "51", "52", "53", "54", "55",
    "56", "60", "61", "62", "63", "64", "65", "66", "67", "70", "71", "72", "73", "74", "75", "98",
    "99",
];

/// Default codes applied when the tax adapter supplies no detail.
pub const DEFAULT_ICMS_CST: &str = "41";
pub const DEFAULT_IPI_CST: &str = "53";
pub const DEFAULT_PIS_COFINS_CST: &str = "08";

/// IPI framing code (`cEnq`) for operations without a specific framing.
pub const IPI_DEFAULT_FRAMING: &str = "999";

/// Which of the four item taxes a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxKind {
    Icms,
    Ipi,
    Pis,
    Cofins,
}

impl TaxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Icms => "ICMS",
            Self::Ipi => "IPI",
            Self::Pis => "PIS",
            Self::Cofins => "COFINS",
        }
    }

    /// The published code set for this tax.
    pub fn codes(self) -> &'static [&'static str] {
        match self {
            Self::Icms => ICMS_CST,
            Self::Ipi => IPI_CST,
            Self::Pis | Self::Cofins => PIS_COFINS_CST,
        }
    }

    pub fn accepts(self, cst: &str) -> bool {
        self.codes().contains(&cst)
    }
}

impl std::fmt::Display for TaxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// XML group for an ICMS code. `40`, `41` and `50` share `ICMS40`.
pub fn icms_group(cst: &str) -> Option<&'static str> {
    Some(match cst {
        "00" => "ICMS00",
        "10" => "ICMS10",
        "20" => "ICMS20",
        "30" => "ICMS30",
        "40" | "41" | "50" => "ICMS40",
        "51" => "ICMS51",
        "60" => "ICMS60",
        "70" => "ICMS70",
        "90" => "ICMS90",
        _ => return None,
    })
}

/// Whether an ICMS code carries base, rate and amount fields.
pub fn icms_is_taxed(cst: &str) -> bool {
    matches!(cst, "00" | "10" | "20" | "51" | "70" | "90")
}

/// Whether an IPI code is reported in `IPITrib` (otherwise `IPINT`).
pub fn ipi_is_taxed(cst: &str) -> bool {
    matches!(cst, "00" | "49" | "50" | "99")
}

/// Group suffix for PIS/COFINS: `Aliq`, `NT` or `Outr`.
pub fn pis_cofins_group_suffix(cst: &str) -> &'static str {
    match cst {
        "01" | "02" => "Aliq",
        "04" | "05" | "06" | "07" | "08" | "09" => "NT",
        _ => "Outr",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_sets_match_published_tables() {
        assert_eq!(ICMS_CST.len(), 11);
        assert_eq!(IPI_CST.len(), 14);
        assert_eq!(PIS_COFINS_CST.len(), 33);
        assert!(TaxKind::Pis.accepts("08"));
        assert!(!TaxKind::Pis.accepts("10"));
        assert!(!TaxKind::Icms.accepts("01"));
    }

    #[test]
    fn defaults_are_members_of_their_sets() {
        assert!(TaxKind::Icms.accepts(DEFAULT_ICMS_CST));
        assert!(TaxKind::Ipi.accepts(DEFAULT_IPI_CST));
        assert!(TaxKind::Cofins.accepts(DEFAULT_PIS_COFINS_CST));
    }

    #[test]
    fn every_icms_code_has_a_group() {
        for cst in ICMS_CST {
            assert!(icms_group(cst).is_some(), "{cst}");
        }
        assert_eq!(icms_group("41"), Some("ICMS40"));
        assert_eq!(icms_group("99"), None);
    }

    #[test]
    fn pis_groups() {
        assert_eq!(pis_cofins_group_suffix("01"), "Aliq");
        assert_eq!(pis_cofins_group_suffix("07"), "NT");
        assert_eq!(pis_cofins_group_suffix("99"), "Outr");
    }
}
