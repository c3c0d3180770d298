//! # Document Builder
//!
//! Assembles a `Draft` [`FiscalDocument`] from business input, the
//! allocated number and the taxed items.
//!
//! ## Element Order
//!
//! The authority validates the 4.00 layout as an XSD sequence, so element
//! order is part of the wire contract. Every block below is written in
//! layout order and nothing is reordered afterwards:
//!
//! ```text
//! NFe
//! └── infNFe (versao, Id)
//!     ├── ide       identification
//!     ├── emit      issuer, enderEmit
//!     ├── dest      recipient, enderDest
//!     ├── det*      one per item, nItem = 1..n in input order
//!     ├── total     ICMSTot
//!     ├── transp    modFrete
//!     ├── pag       detPag
//!     └── infAdic?  infCpl
//! ```
//!
//! The signer later appends `Signature` after `infNFe`.
//!
//! ## Arithmetic
//!
//! The builder does not reconcile totals. Declared totals in the input are
//! rendered as given; the validator compares them with the items.

use chrono::FixedOffset;
use rust_decimal::Decimal;

use nfe_core::access_key::MODEL_NFE;
use nfe_core::money::{format_amount, format_fixed};
use nfe_core::tax_code::{
    icms_group, icms_is_taxed, ipi_is_taxed, pis_cofins_group_suffix, DEFAULT_ICMS_CST,
    DEFAULT_IPI_CST, DEFAULT_PIS_COFINS_CST, IPI_DEFAULT_FRAMING,
};
use nfe_core::{
    AccessKey, AccessKeyParts, Address, DocumentNumber, Environment, Issuer, LineItem,
    NumericCode, Recipient, SequenceKey, TaxBreakdown, TaxLine, Timestamp, Totals, XmlElement,
    NFE_NAMESPACE,
};
use nfe_state::{DocumentContent, FiscalDocument};

use crate::config::BuilderConfig;
use crate::error::BuildError;
use crate::input::BusinessInput;
use crate::tax::{TaxCalculator, TaxContext};

/// Layout version written in `versao`.
pub const LAYOUT_VERSION: &str = "4.00";

/// Recipient name the authority requires in the homologation environment.
pub const HOMOLOGATION_RECIPIENT_NAME: &str =
    "NF-E EMITIDA EM AMBIENTE DE HOMOLOGACAO - SEM VALOR FISCAL";

/// GTIN placeholder for items without a barcode.
pub const NO_GTIN: &str = "SEM GTIN";

/// Builds draft documents with one set of defaults.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    config: BuilderConfig,
    offset: FixedOffset,
}

impl DocumentBuilder {
    pub fn new(config: BuilderConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let offset = config.offset()?;
        Ok(Self { config, offset })
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Ask `calculator` for the taxes of each input item and produce the
    /// document lines. Items that carry explicit taxes skip the adapter.
    pub fn compute_items(
        &self,
        input: &BusinessInput,
        calculator: &dyn TaxCalculator,
    ) -> Result<Vec<LineItem>, BuildError> {
        if input.items.is_empty() {
            return Err(BuildError::missing("items"));
        }
        let ctx = TaxContext {
            issuer: input.issuer()?,
            recipient: input.recipient()?,
        };
        input
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let taxes = match &item.taxes {
                    Some(explicit) => explicit.clone(),
                    None => {
                        let gross = item.gross_value(index)?;
                        calculator
                            .compute(item, gross, &ctx)
                            .map_err(|source| BuildError::Tax {
                                item: index + 1,
                                source,
                            })?
                    }
                };
                item.clone().into_line_item(index, taxes)
            })
            .collect()
    }

    /// Assemble a `Draft` document.
    pub fn build(
        &self,
        input: &BusinessInput,
        key: SequenceKey,
        number: DocumentNumber,
        items: Vec<LineItem>,
    ) -> Result<FiscalDocument, BuildError> {
        let issuer = input.issuer()?.clone();
        let recipient = input.recipient()?.clone();
        if items.is_empty() {
            return Err(BuildError::missing("items"));
        }
        if issuer.name.trim().is_empty() {
            return Err(BuildError::missing("issuer.name"));
        }
        if recipient.name.trim().is_empty() {
            return Err(BuildError::missing("recipient.name"));
        }

        let issued_at = input.issued_at.unwrap_or_else(Timestamp::now);
        let numeric_code = input
            .numeric_code
            .unwrap_or_else(|| NumericCode::random_for(number));
        let access_key = AccessKey::compose(&AccessKeyParts {
            uf: issuer.address.uf,
            emitted_on: issued_at.local_date(self.offset),
            issuer: issuer.cnpj.clone(),
            series: key.series,
            number,
            emission_type: self.config.emission_type,
            numeric_code,
        })?;

        let totals = match &input.declared_totals {
            Some(declared) => declared.clone(),
            None => {
                let mut computed = Totals::from_items(&items);
                computed.freight = input.freight;
                computed.insurance = input.insurance;
                computed.discount = input.discount;
                computed.other = input.other;
                computed.document = computed.document_value();
                computed
            }
        };

        let content = DocumentContent {
            access_key,
            series: key.series,
            number,
            environment: key.environment,
            issuer,
            recipient,
            items,
            totals,
            operation_nature: input
                .operation_nature
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| self.config.operation_nature.clone()),
            issued_at,
            notes: input.notes.clone().filter(|n| !n.trim().is_empty()),
        };

        let xml = self.render(&content);
        tracing::debug!(
            access_key = %content.access_key,
            series = key.series.get(),
            number = number.get(),
            environment = %key.environment,
            items = content.items.len(),
            "document assembled"
        );
        Ok(FiscalDocument::new_draft(content, xml))
    }

    /// The `NFe` tree for `content`.
    pub fn render(&self, content: &DocumentContent) -> XmlElement {
        let mut inf = XmlElement::new("infNFe")
            .attr("versao", LAYOUT_VERSION)
            .attr("Id", content.access_key.element_id())
            .child(self.ide(content))
            .child(emit(&content.issuer, self.config.tax_regime))
            .child(dest(&content.recipient, content.environment));
        for (index, item) in content.items.iter().enumerate() {
            inf.push(det(index + 1, item));
        }
        let inf = inf
            .child(total(&content.totals))
            .child(XmlElement::new("transp").leaf("modFrete", self.config.freight_mode.to_string()))
            .child(self.pag(&content.totals))
            .opt_child(
                content
                    .notes
                    .as_ref()
                    .map(|n| XmlElement::new("infAdic").leaf("infCpl", n.as_str())),
            );
        XmlElement::new("NFe").attr("xmlns", NFE_NAMESPACE).child(inf)
    }

    fn ide(&self, c: &DocumentContent) -> XmlElement {
        let cfg = &self.config;
        let key = &c.access_key;
        XmlElement::new("ide")
            .leaf("cUF", key.uf_code())
            .leaf("cNF", key.numeric_code_digits())
            .leaf("natOp", c.operation_nature.as_str())
            .leaf("mod", MODEL_NFE)
            .leaf("serie", c.series.get().to_string())
            .leaf("nNF", c.number.get().to_string())
            .leaf("dhEmi", c.issued_at.to_local_rfc3339(self.offset))
            .leaf("tpNF", cfg.operation_type.to_string())
            .leaf("idDest", destination_indicator(&c.issuer, &c.recipient).to_string())
            .leaf("cMunFG", c.issuer.address.city_code.as_str())
            .leaf("tpImp", cfg.print_format.to_string())
            .leaf("tpEmis", cfg.emission_type.to_string())
            .leaf("cDV", key.check_digit().to_string())
            .leaf("tpAmb", c.environment.code().to_string())
            .leaf("finNFe", cfg.purpose.to_string())
            .leaf("indFinal", cfg.final_consumer.to_string())
            .leaf("indPres", cfg.presence.to_string())
            .leaf("procEmi", cfg.emission_process.to_string())
            .leaf("verProc", cfg.process_version.as_str())
    }

    fn pag(&self, totals: &Totals) -> XmlElement {
        XmlElement::new("pag").child(
            XmlElement::new("detPag")
                .leaf("tPag", self.config.payment_method.as_str())
                .leaf("vPag", format_amount(totals.document)),
        )
    }
}

/// `idDest`: 1 internal, 2 interstate, 3 abroad.
fn destination_indicator(issuer: &Issuer, recipient: &Recipient) -> u8 {
    if recipient.address.country_code != nfe_core::document::BRAZIL_COUNTRY_CODE {
        3
    } else if recipient.address.uf != issuer.address.uf {
        2
    } else {
        1
    }
}

fn address(name: &str, a: &Address) -> XmlElement {
    XmlElement::new(name)
        .leaf("xLgr", a.street.as_str())
        .leaf("nro", a.number.as_str())
        .opt_leaf("xCpl", a.complement.as_deref())
        .leaf("xBairro", a.district.as_str())
        .leaf("cMun", a.city_code.as_str())
        .leaf("xMun", a.city.as_str())
        .leaf("UF", a.uf.as_str())
        .leaf("CEP", a.postal_code.as_str())
        .leaf("cPais", a.country_code.as_str())
        .leaf("xPais", a.country.as_str())
        .opt_leaf("fone", a.phone.as_deref())
}

fn emit(issuer: &Issuer, default_regime: u8) -> XmlElement {
    let crt = if issuer.tax_regime == 0 {
        default_regime
    } else {
        issuer.tax_regime
    };
    XmlElement::new("emit")
        .leaf("CNPJ", issuer.cnpj.as_str())
        .leaf("xNome", issuer.name.as_str())
        .opt_leaf("xFant", issuer.trade_name.as_deref())
        .child(address("enderEmit", &issuer.address))
        .leaf("IE", issuer.state_registration.as_str())
        .leaf("CRT", crt.to_string())
}

fn dest(recipient: &Recipient, environment: Environment) -> XmlElement {
    let name = match environment {
        Environment::Homologation => HOMOLOGATION_RECIPIENT_NAME,
        Environment::Production => recipient.name.as_str(),
    };
    let indicator = recipient.ie_indicator();
    let ie = match indicator {
        1 => recipient.state_registration.as_ref().map(|ie| ie.as_str()),
        _ => None,
    };
    XmlElement::new("dest")
        .leaf(recipient.tax_id.element_name(), recipient.tax_id.as_str())
        .leaf("xNome", name)
        .child(address("enderDest", &recipient.address))
        .leaf("indIEDest", indicator.to_string())
        .opt_leaf("IE", ie)
        .opt_leaf("email", recipient.email.as_deref())
}

fn det(n: usize, item: &LineItem) -> XmlElement {
    let gtin = item.ean.as_deref().unwrap_or(NO_GTIN);
    let quantity = format_fixed(item.quantity, 4);
    let unit_value = format_fixed(item.unit_value, 4);
    let prod = XmlElement::new("prod")
        .leaf("cProd", item.code.as_str())
        .leaf("cEAN", gtin)
        .leaf("xProd", item.description.as_str())
        .leaf("NCM", item.ncm.as_str())
        .leaf("CFOP", item.cfop.as_str())
        .leaf("uCom", item.unit.as_str())
        .leaf("qCom", quantity.as_str())
        .leaf("vUnCom", unit_value.as_str())
        .leaf("vProd", format_amount(item.gross_value()))
        .leaf("cEANTrib", gtin)
        .leaf("uTrib", item.unit.as_str())
        .leaf("qTrib", quantity)
        .leaf("vUnTrib", unit_value)
        .leaf("indTot", "1");

    XmlElement::new("det")
        .attr("nItem", n.to_string())
        .child(prod)
        .child(imposto(&item.taxes, item.gross_value()))
        .opt_leaf("infAdProd", item.additional_info.as_deref())
}

fn imposto(taxes: &TaxBreakdown, gross: Decimal) -> XmlElement {
    let default_line = |cst: &str| TaxLine::exempt(cst);
    let icms = taxes.icms.clone().unwrap_or_else(|| default_line(DEFAULT_ICMS_CST));
    let ipi = taxes.ipi.clone().unwrap_or_else(|| default_line(DEFAULT_IPI_CST));
    let pis = taxes.pis.clone().unwrap_or_else(|| default_line(DEFAULT_PIS_COFINS_CST));
    let cofins = taxes
        .cofins
        .clone()
        .unwrap_or_else(|| default_line(DEFAULT_PIS_COFINS_CST));

    XmlElement::new("imposto")
        .leaf("vTotTrib", format_amount(taxes.total_amount()))
        .child(XmlElement::new("ICMS").child(icms_group_element(taxes.origin, &icms, gross)))
        .child(ipi_element(&ipi))
        .child(contribution_element("PIS", &pis))
        .child(contribution_element("COFINS", &cofins))
}

fn icms_group_element(origin: u8, line: &TaxLine, gross: Decimal) -> XmlElement {
    let cst = line.cst.as_str();
    let name = icms_group(cst)
        .map(str::to_string)
        .unwrap_or_else(|| format!("ICMS{cst}"));
    let mut group = XmlElement::new(name)
        .leaf("orig", origin.to_string())
        .leaf("CST", cst);

    if icms_is_taxed(cst) {
        group = group.leaf("modBC", "3");
        if matches!(cst, "20" | "70") {
            group = group.leaf("pRedBC", format_fixed(base_reduction(line.base, gross), 4));
        }
        group = group
            .leaf("vBC", format_amount(line.base))
            .leaf("pICMS", format_fixed(line.rate, 4))
            .leaf("vICMS", format_amount(line.amount));
    }
    // Substitution fields are mandatory in these groups; the pipeline does
    // not compute substitution, so they are rendered as zero.
    if matches!(cst, "10" | "30" | "70") {
        group = group
            .leaf("modBCST", "4")
            .leaf("vBCST", "0.00")
            .leaf("pICMSST", "0.0000")
            .leaf("vICMSST", "0.00");
    }
    group
}

fn base_reduction(base: Decimal, gross: Decimal) -> Decimal {
    if gross.is_zero() {
        return Decimal::ZERO;
    }
    Decimal::ONE_HUNDRED - base * Decimal::ONE_HUNDRED / gross
}

fn ipi_element(line: &TaxLine) -> XmlElement {
    let inner = if ipi_is_taxed(&line.cst) {
        XmlElement::new("IPITrib")
            .leaf("CST", line.cst.as_str())
            .leaf("vBC", format_amount(line.base))
            .leaf("pIPI", format_fixed(line.rate, 4))
            .leaf("vIPI", format_amount(line.amount))
    } else {
        XmlElement::new("IPINT").leaf("CST", line.cst.as_str())
    };
    XmlElement::new("IPI").leaf("cEnq", IPI_DEFAULT_FRAMING).child(inner)
}

/// PIS or COFINS block; both share the same shape.
fn contribution_element(tax: &str, line: &TaxLine) -> XmlElement {
    let suffix = pis_cofins_group_suffix(&line.cst);
    let mut group = XmlElement::new(format!("{tax}{suffix}")).leaf("CST", line.cst.as_str());
    if suffix != "NT" {
        group = group
            .leaf("vBC", format_amount(line.base))
            .leaf(format!("p{tax}"), format_fixed(line.rate, 4))
            .leaf(format!("v{tax}"), format_amount(line.amount));
    }
    XmlElement::new(tax).child(group)
}

fn total(t: &Totals) -> XmlElement {
    let zero = || format_amount(Decimal::ZERO);
    XmlElement::new("total").child(
        XmlElement::new("ICMSTot")
            .leaf("vBC", format_amount(t.icms_base))
            .leaf("vICMS", format_amount(t.icms))
            .leaf("vICMSDeson", zero())
            .leaf("vFCP", zero())
            .leaf("vBCST", zero())
            .leaf("vST", zero())
            .leaf("vFCPST", zero())
            .leaf("vFCPSTRet", zero())
            .leaf("vProd", format_amount(t.products))
            .leaf("vFrete", format_amount(t.freight))
            .leaf("vSeg", format_amount(t.insurance))
            .leaf("vDesc", format_amount(t.discount))
            .leaf("vII", zero())
            .leaf("vIPI", format_amount(t.ipi))
            .leaf("vIPIDevol", zero())
            .leaf("vPIS", format_amount(t.pis))
            .leaf("vCOFINS", format_amount(t.cofins))
            .leaf("vOutro", format_amount(t.other))
            .leaf("vNF", format_amount(t.document))
            .leaf("vTotTrib", format_amount(t.approximate_taxes)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ItemInput;
    use crate::tax::{PisCofinsRegime, StandardTaxCalculator};
    use nfe_core::{Series, Uf};
    use nfe_state::test_support::{sample_issuer, sample_recipient};
    use nfe_state::DocumentState;

    fn key() -> SequenceKey {
        SequenceKey::new(Series::new(1).unwrap(), Environment::Homologation)
    }

    fn input() -> BusinessInput {
        BusinessInput {
            issuer: Some(sample_issuer()),
            recipient: Some(sample_recipient()),
            issued_at: Some(Timestamp::parse("2024-03-15T10:30:00-03:00").unwrap()),
            numeric_code: Some(NumericCode::new(12_345_678).unwrap()),
            items: vec![ItemInput {
                code: Some("P001".into()),
                description: Some("Camiseta algodao".into()),
                ncm: Some("61091000".into()),
                cfop: Some("5102".into()),
                unit: Some("UN".into()),
                quantity: Some(Decimal::from(2)),
                unit_value: Some(Decimal::from(10)),
                ..ItemInput::default()
            }],
            ..BusinessInput::default()
        }
    }

    fn builder() -> DocumentBuilder {
        DocumentBuilder::new(BuilderConfig::default()).unwrap()
    }

    fn build(input: &BusinessInput) -> FiscalDocument {
        let b = builder();
        let calc = StandardTaxCalculator::new(PisCofinsRegime::Real);
        let items = b.compute_items(input, &calc).unwrap();
        b.build(input, key(), DocumentNumber::new(4).unwrap(), items).unwrap()
    }

    fn names(e: &XmlElement) -> Vec<String> {
        e.child_elements().map(|c| c.local_name().to_string()).collect()
    }

    #[test]
    fn builds_draft_with_access_key() {
        let doc = build(&input());
        assert_eq!(doc.state(), DocumentState::Draft);
        let key = doc.access_key().as_str();
        assert_eq!(key.len(), 44);
        assert!(key.starts_with("3524031122233300018155001000000004"));
        let inf = doc.xml().find_child("infNFe").unwrap();
        assert_eq!(inf.attribute("Id"), Some(format!("NFe{key}").as_str()));
        assert_eq!(inf.attribute("versao"), Some("4.00"));
    }

    #[test]
    fn blocks_in_layout_order() {
        let mut i = input();
        i.notes = Some("Pedido 42".into());
        i.items.push(i.items[0].clone());
        let doc = build(&i);
        let inf = doc.xml().find_child("infNFe").unwrap();
        assert_eq!(
            names(inf),
            ["ide", "emit", "dest", "det", "det", "total", "transp", "pag", "infAdic"]
        );
        let items: Vec<_> = inf
            .find_children("det")
            .map(|d| d.attribute("nItem").unwrap().to_string())
            .collect();
        assert_eq!(items, ["1", "2"]);
    }

    #[test]
    fn ide_sequence() {
        let doc = build(&input());
        let ide = doc.xml().path(&["infNFe", "ide"]).unwrap();
        assert_eq!(
            names(ide),
            [
                "cUF", "cNF", "natOp", "mod", "serie", "nNF", "dhEmi", "tpNF", "idDest", "cMunFG",
                "tpImp", "tpEmis", "cDV", "tpAmb", "finNFe", "indFinal", "indPres", "procEmi",
                "verProc"
            ]
        );
        assert_eq!(ide.child_text("dhEmi").unwrap(), "2024-03-15T10:30:00-03:00");
        assert_eq!(ide.child_text("tpAmb").unwrap(), "2");
        assert_eq!(ide.child_text("natOp").unwrap(), "Venda");
        let key = doc.access_key().as_str();
        assert_eq!(ide.child_text("cDV").unwrap(), &key[43..]);
    }

    #[test]
    fn totals_block_has_all_fields_in_order() {
        let doc = build(&input());
        let tot = doc.xml().path(&["infNFe", "total", "ICMSTot"]).unwrap();
        assert_eq!(names(tot).len(), 20);
        assert_eq!(names(tot).first().map(String::as_str), Some("vBC"));
        assert_eq!(names(tot).last().map(String::as_str), Some("vTotTrib"));
        assert_eq!(tot.child_text("vProd").unwrap(), "20.00");
        // 18% ICMS on 20.00 plus PIS/COFINS in the real regime.
        assert_eq!(tot.child_text("vICMS").unwrap(), "3.60");
        assert_eq!(tot.child_text("vPIS").unwrap(), "0.33");
        assert_eq!(tot.child_text("vCOFINS").unwrap(), "1.52");
        assert_eq!(tot.child_text("vNF").unwrap(), "20.00");
    }

    #[test]
    fn declared_totals_are_rendered_as_given() {
        let mut i = input();
        let mut declared = Totals::default();
        declared.products = Decimal::from(19);
        declared.document = Decimal::from(19);
        i.declared_totals = Some(declared);
        let doc = build(&i);
        let tot = doc.xml().path(&["infNFe", "total", "ICMSTot"]).unwrap();
        assert_eq!(tot.child_text("vProd").unwrap(), "19.00");
        assert_eq!(doc.content().totals.products, Decimal::from(19));
    }

    #[test]
    fn homologation_replaces_recipient_name() {
        let doc = build(&input());
        let dest = doc.xml().path(&["infNFe", "dest"]).unwrap();
        assert_eq!(dest.child_text("xNome").unwrap(), HOMOLOGATION_RECIPIENT_NAME);
        assert_eq!(dest.child_text("CPF").unwrap(), "52998224725");
        assert_eq!(dest.child_text("indIEDest").unwrap(), "9");
        assert!(dest.find_child("IE").is_none());
    }

    #[test]
    fn item_without_tax_detail_gets_non_taxed_defaults() {
        let b = builder();
        let mut items = b
            .compute_items(&input(), &StandardTaxCalculator::new(PisCofinsRegime::Real))
            .unwrap();
        items[0].taxes = TaxBreakdown::default();
        let doc = b
            .build(&input(), key(), DocumentNumber::new(5).unwrap(), items)
            .unwrap();
        let imposto = doc.xml().path(&["infNFe", "det", "imposto"]).unwrap();
        assert_eq!(
            imposto.path(&["ICMS", "ICMS40"]).unwrap().child_text("CST").unwrap(),
            "41"
        );
        assert!(imposto.path(&["IPI", "IPINT"]).is_some());
        assert_eq!(
            imposto.path(&["PIS", "PISNT"]).unwrap().child_text("CST").unwrap(),
            "08"
        );
        assert!(imposto.path(&["COFINS", "COFINSNT"]).is_some());
    }

    #[test]
    fn reduced_base_renders_reduction_percent() {
        let mut i = input();
        i.items[0].icms_cst = Some("20".into());
        i.items[0].icms_base_reduction = Some(Decimal::from(40));
        let doc = build(&i);
        let g = doc
            .xml()
            .path(&["infNFe", "det", "imposto", "ICMS", "ICMS20"])
            .unwrap();
        assert_eq!(g.child_text("pRedBC").unwrap(), "40.0000");
        assert_eq!(g.child_text("vBC").unwrap(), "12.00");
    }

    #[test]
    fn interstate_destination_indicator() {
        let mut i = input();
        let mut r = sample_recipient();
        r.address.uf = Uf::RJ;
        i.recipient = Some(r);
        let doc = build(&i);
        let ide = doc.xml().path(&["infNFe", "ide"]).unwrap();
        assert_eq!(ide.child_text("idDest").unwrap(), "2");
    }

    #[test]
    fn missing_recipient_is_a_build_error() {
        let mut i = input();
        i.recipient = None;
        let b = builder();
        let err = b
            .build(&i, key(), DocumentNumber::new(1).unwrap(), Vec::new())
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingField { field } if field == "recipient"));
    }

    #[test]
    fn no_items_is_a_build_error() {
        let mut i = input();
        i.items.clear();
        let b = builder();
        let calc = StandardTaxCalculator::new(PisCofinsRegime::Real);
        assert!(matches!(
            b.compute_items(&i, &calc),
            Err(BuildError::MissingField { field }) if field == "items"
        ));
    }

    #[test]
    fn tax_failure_names_the_item() {
        let mut i = input();
        i.items[0].icms_cst = Some("99".into());
        let b = builder();
        let calc = StandardTaxCalculator::new(PisCofinsRegime::Real);
        assert!(matches!(b.compute_items(&i, &calc), Err(BuildError::Tax { item: 1, .. })));
    }

    #[test]
    fn serialized_document_parses_back() {
        let doc = build(&input());
        let text = doc.to_xml_document();
        assert!(text.starts_with(nfe_core::xml::XML_DECLARATION));
        let parsed = XmlElement::parse(&text).unwrap();
        assert_eq!(&parsed, doc.xml());
    }
}
