//! # Document Validation
//!
//! Walks the `NFe` tree of a [`FiscalDocument`] and reports every problem
//! found, not just the first. Checks run in three layers:
//!
//! 1. **Structure.** Required elements are present, in layout order, with no
//!    strangers ([`crate::layout`]).
//! 2. **Fields.** Identifiers carry valid check digits, codes belong to
//!    their published sets, numeric fields parse and are in range.
//! 3. **Business rules.** Item values reconcile with quantity × unit value,
//!    the totals block reconciles with the items within one cent, and the
//!    payment covers the document value.
//!
//! Validation is pure. It reads the XML that will be signed, so a tree
//! edited after assembly is judged as edited.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use nfe_core::access_key::MODEL_NFE;
use nfe_core::money::{round2, within_tolerance};
use nfe_core::tax_code::{icms_group, ipi_is_taxed, pis_cofins_group_suffix};
use nfe_core::{
    AccessKey, Cnpj, Cpf, StateRegistration, TaxKind, Timestamp, Uf, XmlElement, NFE_NAMESPACE,
};
use nfe_state::{DocumentContent, FiscalDocument};

use crate::finding::{FindingKind, ValidationResult};
use crate::layout::{self, check_sequence};

/// Layout version accepted by the validator.
pub const LAYOUT_VERSION: &str = "4.00";

/// Hard limit on items per document.
pub const MAX_ITEMS: usize = 990;

/// GTIN placeholder accepted in `cEAN`/`cEANTrib`.
const NO_GTIN: &str = "SEM GTIN";

/// Payment method "no payment", which exempts the payment total check.
const NO_PAYMENT: &str = "90";

const PAYMENT_METHODS: &[&str] = &[
    "01", "02", "03", "04", "05", "10", "11", "12", "13", "15", "16", "17", "18", "19", "90", "99",
];

/// Thresholds for warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Unit values below this are flagged.
    pub low_unit_price: Decimal,
    /// Documents with more items than this are flagged.
    pub large_item_count: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            low_unit_price: Decimal::new(1, 2),
            large_item_count: 500,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate `document` and collect every finding.
    pub fn validate(&self, document: &FiscalDocument) -> ValidationResult {
        let mut check = Check {
            result: ValidationResult::default(),
            config: &self.config,
        };
        check.document(document.xml(), document.content());
        check.result
    }
}

/// Validate with default thresholds.
pub fn validate(document: &FiscalDocument) -> ValidationResult {
    Validator::default().validate(document)
}

// ─── Item sums ───────────────────────────────────────────────────────

/// Per-item amounts accumulated while walking `det` elements.
#[derive(Debug, Default)]
struct ItemSums {
    products: Decimal,
    icms_base: Decimal,
    icms: Decimal,
    ipi: Decimal,
    pis: Decimal,
    cofins: Decimal,
}

/// Trimmed text of a direct child. Absence is reported by the sequence
/// check, not here.
fn text(parent: &XmlElement, name: &str) -> Option<String> {
    parent.child_text(name).map(|t| t.trim().to_string())
}

// ─── Checker ─────────────────────────────────────────────────────────

struct Check<'a> {
    result: ValidationResult,
    config: &'a ValidatorConfig,
}

impl Check<'_> {
    fn document(&mut self, nfe: &XmlElement, content: &DocumentContent) {
        let path = "/NFe";
        if nfe.local_name() != "NFe" {
            self.result.error(
                FindingKind::UnexpectedElement,
                format!("/{}", nfe.local_name()),
                "document root must be NFe",
            );
            return;
        }
        if nfe.attribute("xmlns") != Some(NFE_NAMESPACE) {
            self.result.error(
                FindingKind::MalformedValue,
                format!("{path}/@xmlns"),
                format!("namespace must be {NFE_NAMESPACE}"),
            );
        }
        check_sequence(&mut self.result, nfe, path, layout::NFE);
        if let Some(inf) = nfe.find_child("infNFe") {
            self.inf_nfe(inf, content);
        }
        self.content_warnings(content);
    }

    fn inf_nfe(&mut self, inf: &XmlElement, content: &DocumentContent) {
        let path = "/NFe/infNFe";
        if inf.attribute("versao") != Some(LAYOUT_VERSION) {
            self.result.error(
                FindingKind::MalformedValue,
                format!("{path}/@versao"),
                format!("layout version must be {LAYOUT_VERSION}"),
            );
        }

        let key = &content.access_key;
        match inf.attribute("Id") {
            None => self.result.error(
                FindingKind::MissingElement,
                format!("{path}/@Id"),
                "element Id is absent",
            ),
            Some(id) => {
                if let Err(e) = AccessKey::parse(id) {
                    self.result
                        .error(FindingKind::MalformedIdentifier, format!("{path}/@Id"), e.to_string());
                } else if id != key.element_id() {
                    self.result.error(
                        FindingKind::MalformedIdentifier,
                        format!("{path}/@Id"),
                        format!("Id {id} does not match access key {key}"),
                    );
                }
            }
        }

        check_sequence(&mut self.result, inf, path, layout::INF_NFE);

        let mut destination = None;
        if let Some(ide) = inf.find_child("ide") {
            destination = self.ide(ide, content);
        }
        if let Some(emit) = inf.find_child("emit") {
            self.emit(emit, key);
        }
        if let Some(dest) = inf.find_child("dest") {
            self.dest(dest);
        }

        let dets: Vec<&XmlElement> = inf.find_children("det").collect();
        if dets.len() > MAX_ITEMS {
            self.result.error(
                FindingKind::TooManyItems,
                format!("{path}/det"),
                format!("{} items exceed the limit of {MAX_ITEMS}", dets.len()),
            );
        } else if dets.len() > self.config.large_item_count {
            self.result.warn(
                FindingKind::LargeItemCount,
                format!("{path}/det"),
                format!("{} items", dets.len()),
            );
        }
        let mut sums = ItemSums::default();
        for (index, det) in dets.iter().enumerate() {
            self.det(det, index + 1, destination, &mut sums);
        }

        let mut document_value = None;
        if let Some(total) = inf.find_child("total") {
            check_sequence(&mut self.result, total, "/NFe/infNFe/total", layout::TOTAL);
            if let Some(tot) = total.find_child("ICMSTot") {
                document_value = self.totals(tot, &sums);
            }
        }
        if let Some(transp) = inf.find_child("transp") {
            self.transp(transp);
        }
        if let Some(pag) = inf.find_child("pag") {
            self.pag(pag, document_value);
        }
        if let Some(adic) = inf.find_child("infAdic") {
            check_sequence(&mut self.result, adic, "/NFe/infNFe/infAdic", layout::INF_ADIC);
        }
    }

    /// Returns `idDest` when it is valid.
    fn ide(&mut self, ide: &XmlElement, content: &DocumentContent) -> Option<u8> {
        let path = "/NFe/infNFe/ide";
        check_sequence(&mut self.result, ide, path, layout::IDE);
        let key = &content.access_key;

        if let Some(cuf) = text(ide, "cUF") {
            let known = cuf.parse::<u8>().ok().and_then(|c| Uf::from_ibge_code(c).ok());
            if known.is_none() {
                self.invalid_code(path, "cUF", &cuf);
            } else if cuf != key.uf_code() {
                self.mismatch(path, "cUF", &cuf, key.uf_code());
            }
        }
        if let Some(cnf) = text(ide, "cNF") {
            if cnf != key.numeric_code_digits() {
                self.mismatch(path, "cNF", &cnf, key.numeric_code_digits());
            }
        }
        if let Some(natop) = text(ide, "natOp") {
            self.length(path, "natOp", &natop, 1, 60);
        }
        if let Some(model) = text(ide, "mod") {
            if model != MODEL_NFE {
                self.invalid_code(path, "mod", &model);
            }
        }
        if let Some(serie) = text(ide, "serie") {
            self.key_number(path, "serie", &serie, key.series_digits(), 999);
        }
        if let Some(nnf) = text(ide, "nNF") {
            self.key_number(path, "nNF", &nnf, key.number_digits(), 999_999_999);
        }
        if let Some(dh) = text(ide, "dhEmi") {
            if Timestamp::parse(&dh).is_err() {
                self.malformed(path, "dhEmi", format!("{dh} is not an RFC 3339 timestamp"));
            }
        }
        self.code(ide, path, "tpNF", &["0", "1"]);
        let destination = self.code(ide, path, "idDest", &["1", "2", "3"]);
        if let Some(city) = text(ide, "cMunFG") {
            self.digits(path, "cMunFG", &city, &[7]);
        }
        self.code(ide, path, "tpImp", &["0", "1", "2", "3", "4", "5"]);
        if let Some(tp) = text(ide, "tpEmis") {
            let in_key = &key.as_str()[34..35];
            if tp != in_key {
                self.mismatch(path, "tpEmis", &tp, in_key);
            }
        }
        if let Some(dv) = text(ide, "cDV") {
            let expected = key.check_digit().to_string();
            if dv != expected {
                self.mismatch(path, "cDV", &dv, &expected);
            }
        }
        if let Some(env) = text(ide, "tpAmb") {
            let expected = content.environment.code().to_string();
            if env != expected {
                self.mismatch(path, "tpAmb", &env, &expected);
            }
        }
        self.code(ide, path, "finNFe", &["1", "2", "3", "4"]);
        self.code(ide, path, "indFinal", &["0", "1"]);
        self.code(ide, path, "indPres", &["0", "1", "2", "3", "4", "5", "9"]);
        self.code(ide, path, "procEmi", &["0", "1", "2", "3"]);

        destination.and_then(|d| d.parse().ok())
    }

    fn emit(&mut self, emit: &XmlElement, key: &AccessKey) {
        let path = "/NFe/infNFe/emit";
        check_sequence(&mut self.result, emit, path, layout::EMIT);
        if let Some(cnpj) = text(emit, "CNPJ") {
            match Cnpj::parse(&cnpj) {
                Err(e) => self.identifier(path, "CNPJ", e),
                Ok(parsed) if parsed.as_str() != key.issuer_digits() => {
                    self.mismatch(path, "CNPJ", &cnpj, key.issuer_digits())
                }
                Ok(_) => {}
            }
        }
        if let Some(cpf) = text(emit, "CPF") {
            if let Err(e) = Cpf::parse(&cpf) {
                self.identifier(path, "CPF", e);
            }
        }
        if let Some(name) = text(emit, "xNome") {
            self.length(path, "xNome", &name, 2, 60);
        }
        if let Some(ie) = text(emit, "IE") {
            if let Err(e) = StateRegistration::parse(&ie) {
                self.identifier(path, "IE", e);
            }
        }
        self.code(emit, path, "CRT", &["1", "2", "3"]);
        if let Some(addr) = emit.find_child("enderEmit") {
            self.address(addr, &format!("{path}/enderEmit"));
        }
    }

    fn dest(&mut self, dest: &XmlElement) {
        let path = "/NFe/infNFe/dest";
        check_sequence(&mut self.result, dest, path, layout::DEST);
        if let Some(cnpj) = text(dest, "CNPJ") {
            if let Err(e) = Cnpj::parse(&cnpj) {
                self.identifier(path, "CNPJ", e);
            }
        }
        let cpf = text(dest, "CPF");
        if let Some(cpf) = &cpf {
            if let Err(e) = Cpf::parse(cpf) {
                self.identifier(path, "CPF", e);
            }
        }
        if let Some(name) = text(dest, "xNome") {
            self.length(path, "xNome", &name, 2, 60);
        }
        let ie = text(dest, "IE");
        if let Some(ie) = &ie {
            if let Err(e) = StateRegistration::parse(ie) {
                self.identifier(path, "IE", e);
            }
        }
        if let Some(indicator) = self.code(dest, path, "indIEDest", &["1", "2", "9"]) {
            if indicator == "1" && ie.is_none() {
                self.result.error(
                    FindingKind::MissingElement,
                    format!("{path}/IE"),
                    "indIEDest 1 requires the recipient IE",
                );
            }
            if cpf.is_some() && indicator != "9" {
                self.result.warn(
                    FindingKind::RecipientIndicator,
                    format!("{path}/indIEDest"),
                    format!("individual recipients are normally non-taxpayers (9), got {indicator}"),
                );
            }
        }
        if let Some(addr) = dest.find_child("enderDest") {
            self.address(addr, &format!("{path}/enderDest"));
        }
    }

    fn address(&mut self, addr: &XmlElement, path: &str) {
        check_sequence(&mut self.result, addr, path, layout::ADDRESS);
        if let Some(city) = text(addr, "cMun") {
            self.digits(path, "cMun", &city, &[7]);
        }
        if let Some(uf) = text(addr, "UF") {
            if Uf::parse(&uf).is_err() && uf != "EX" {
                self.invalid_code(path, "UF", &uf);
            }
        }
        if let Some(cep) = text(addr, "CEP") {
            self.digits(path, "CEP", &cep, &[8]);
        }
        if let Some(country) = text(addr, "cPais") {
            self.digits(path, "cPais", &country, &[4]);
        }
    }

    fn det(&mut self, det: &XmlElement, n: usize, destination: Option<u8>, sums: &mut ItemSums) {
        let path = format!("/NFe/infNFe/det[{n}]");
        check_sequence(&mut self.result, det, &path, layout::DET);
        match det.attribute("nItem") {
            Some(item) if item == n.to_string() => {}
            Some(item) => self.result.error(
                FindingKind::MalformedValue,
                format!("{path}/@nItem"),
                format!("item numbers must be sequential: expected {n}, found {item}"),
            ),
            None => self.result.error(
                FindingKind::MissingElement,
                format!("{path}/@nItem"),
                "item number is absent",
            ),
        }
        if let Some(prod) = det.find_child("prod") {
            self.prod(prod, &format!("{path}/prod"), destination, sums);
        }
        if let Some(imposto) = det.find_child("imposto") {
            self.imposto(imposto, &format!("{path}/imposto"), sums);
        }
    }

    fn prod(&mut self, prod: &XmlElement, path: &str, destination: Option<u8>, sums: &mut ItemSums) {
        check_sequence(&mut self.result, prod, path, layout::PROD);
        for field in ["cEAN", "cEANTrib"] {
            if let Some(gtin) = text(prod, field) {
                if gtin != NO_GTIN {
                    self.digits(path, field, &gtin, &[8, 12, 13, 14]);
                }
            }
        }
        if let Some(ncm) = text(prod, "NCM") {
            if ncm != "00" {
                self.digits(path, "NCM", &ncm, &[8]);
            }
        }
        if let Some(cfop) = text(prod, "CFOP") {
            self.cfop(path, &cfop, destination);
        }

        let quantity = self.decimal(prod, path, "qCom");
        let unit_value = self.decimal(prod, path, "vUnCom");
        let value = self.decimal(prod, path, "vProd");
        for (field, v) in [("qCom", quantity), ("vUnCom", unit_value)] {
            if let Some(v) = v {
                if v <= Decimal::ZERO {
                    self.malformed(path, field, format!("{field} must be positive, got {v}"));
                }
            }
        }
        if let Some(unit) = unit_value {
            if unit > Decimal::ZERO && unit < self.config.low_unit_price {
                self.result.warn(
                    FindingKind::LowUnitPrice,
                    format!("{path}/vUnCom"),
                    format!("unit value {unit} is below {}", self.config.low_unit_price),
                );
            }
        }
        if let (Some(q), Some(u), Some(v)) = (quantity, unit_value, value) {
            let expected = round2(q * u);
            if !within_tolerance(v, expected) {
                self.result.error(
                    FindingKind::ItemValueDivergence,
                    format!("{path}/vProd"),
                    format!("vProd {v} differs from qCom × vUnCom = {expected}"),
                );
            }
        }
        if prod.child_text("indTot").as_deref() == Some("1") {
            sums.products += value.unwrap_or_default();
        }
    }

    fn cfop(&mut self, path: &str, cfop: &str, destination: Option<u8>) {
        if !self.digits(path, "CFOP", cfop, &[4]) {
            return;
        }
        let first = cfop.as_bytes()[0];
        if !b"123567".contains(&first) {
            self.invalid_code(path, "CFOP", cfop);
            return;
        }
        // Outbound CFOPs encode the destination: 5 internal, 6 interstate,
        // 7 abroad.
        let implied = match first {
            b'5' => Some(1),
            b'6' => Some(2),
            b'7' => Some(3),
            _ => None,
        };
        if let (Some(implied), Some(destination)) = (implied, destination) {
            if implied != destination {
                self.result.error(
                    FindingKind::InvalidCode,
                    format!("{path}/CFOP"),
                    format!("CFOP {cfop} does not match idDest {destination}"),
                );
            }
        }
    }

    fn imposto(&mut self, imposto: &XmlElement, path: &str, sums: &mut ItemSums) {
        check_sequence(&mut self.result, imposto, path, layout::IMPOSTO);
        if let Some(total) = text(imposto, "vTotTrib") {
            self.parse_decimal(path, "vTotTrib", &total);
        }

        if let Some(icms) = imposto.find_child("ICMS") {
            let icms_path = format!("{path}/ICMS");
            if let Some(group) = self.single_group(icms, &icms_path) {
                let group_path = format!("{icms_path}/{}", group.local_name());
                if let Some(cst) = self.tax_code(group, &group_path, TaxKind::Icms) {
                    if icms_group(&cst) != Some(group.local_name()) {
                        self.group_mismatch(&group_path, TaxKind::Icms, &cst);
                    }
                }
                if let Some(origin) = text(group, "orig") {
                    let valid = origin.len() == 1 && matches!(origin.as_bytes()[0], b'0'..=b'8');
                    if !valid {
                        self.invalid_code(&group_path, "orig", &origin);
                    }
                }
                sums.icms_base += self.decimal(group, &group_path, "vBC").unwrap_or_default();
                sums.icms += self.decimal(group, &group_path, "vICMS").unwrap_or_default();
            }
        }

        if let Some(ipi) = imposto.find_child("IPI") {
            let ipi_path = format!("{path}/IPI");
            if ipi.find_child("cEnq").is_none() {
                self.result.error(
                    FindingKind::MissingElement,
                    format!("{ipi_path}/cEnq"),
                    "required element is absent",
                );
            }
            let group = ipi
                .child_elements()
                .find(|c| matches!(c.local_name(), "IPITrib" | "IPINT"));
            match group {
                None => self.result.error(
                    FindingKind::MissingElement,
                    format!("{ipi_path}/IPITrib|IPINT"),
                    "required element is absent",
                ),
                Some(group) => {
                    let group_path = format!("{ipi_path}/{}", group.local_name());
                    if let Some(cst) = self.tax_code(group, &group_path, TaxKind::Ipi) {
                        let expected = if ipi_is_taxed(&cst) { "IPITrib" } else { "IPINT" };
                        if group.local_name() != expected {
                            self.group_mismatch(&group_path, TaxKind::Ipi, &cst);
                        }
                    }
                    sums.ipi += self.decimal(group, &group_path, "vIPI").unwrap_or_default();
                }
            }
        }

        for kind in [TaxKind::Pis, TaxKind::Cofins] {
            let Some(block) = imposto.find_child(kind.as_str()) else {
                continue;
            };
            let block_path = format!("{path}/{kind}");
            let Some(group) = self.single_group(block, &block_path) else {
                continue;
            };
            let group_path = format!("{block_path}/{}", group.local_name());
            if let Some(cst) = self.tax_code(group, &group_path, kind) {
                let expected = format!("{kind}{}", pis_cofins_group_suffix(&cst));
                if group.local_name() != expected {
                    self.group_mismatch(&group_path, kind, &cst);
                }
            }
            let amount = self
                .decimal(group, &group_path, &format!("v{kind}"))
                .unwrap_or_default();
            match kind {
                TaxKind::Pis => sums.pis += amount,
                _ => sums.cofins += amount,
            }
        }
    }

    /// Returns `vNF` when it parses.
    fn totals(&mut self, tot: &XmlElement, sums: &ItemSums) -> Option<Decimal> {
        let path = "/NFe/infNFe/total/ICMSTot";
        check_sequence(&mut self.result, tot, path, layout::ICMS_TOT);

        let reconciled = [
            ("vProd", sums.products),
            ("vBC", sums.icms_base),
            ("vICMS", sums.icms),
            ("vIPI", sums.ipi),
            ("vPIS", sums.pis),
            ("vCOFINS", sums.cofins),
        ];
        for (field, expected) in reconciled {
            if let Some(declared) = self.decimal(tot, path, field) {
                if !within_tolerance(declared, expected) {
                    self.result.error(
                        FindingKind::TotalsDivergence,
                        format!("{path}/{field}"),
                        format!("declared {field} {declared} differs from the item sum {expected}"),
                    );
                }
            }
        }

        let mut amount = |field: &str| self.decimal(tot, path, field).unwrap_or_default();
        let expected = amount("vProd") - amount("vDesc") - amount("vICMSDeson")
            + amount("vST")
            + amount("vFCPST")
            + amount("vFrete")
            + amount("vSeg")
            + amount("vOutro")
            + amount("vII")
            + amount("vIPI")
            + amount("vIPIDevol");
        let declared = self.decimal(tot, path, "vNF")?;
        if !within_tolerance(declared, expected) {
            self.result.error(
                FindingKind::TotalsDivergence,
                format!("{path}/vNF"),
                format!("declared vNF {declared} differs from the computed document value {expected}"),
            );
        }
        Some(declared)
    }

    fn transp(&mut self, transp: &XmlElement) {
        let path = "/NFe/infNFe/transp";
        check_sequence(&mut self.result, transp, path, layout::TRANSP);
        self.code(transp, path, "modFrete", &["0", "1", "2", "3", "4", "9"]);
    }

    fn pag(&mut self, pag: &XmlElement, document_value: Option<Decimal>) {
        let path = "/NFe/infNFe/pag";
        check_sequence(&mut self.result, pag, path, layout::PAG);
        let mut paid = Decimal::ZERO;
        let mut exempt = false;
        for (index, det) in pag.find_children("detPag").enumerate() {
            let det_path = format!("{path}/detPag[{}]", index + 1);
            check_sequence(&mut self.result, det, &det_path, layout::DET_PAG);
            if let Some(method) = self.code(det, &det_path, "tPag", PAYMENT_METHODS) {
                exempt |= method == NO_PAYMENT;
            }
            paid += self.decimal(det, &det_path, "vPag").unwrap_or_default();
        }
        if let Some(change) = self.decimal(pag, path, "vTroco") {
            paid -= change;
        }
        if let Some(value) = document_value {
            if !exempt && paid < value && !within_tolerance(paid, value) {
                self.result.error(
                    FindingKind::TotalsDivergence,
                    format!("{path}/detPag"),
                    format!("payments {paid} do not cover vNF {value}"),
                );
            }
        }
    }

    fn content_warnings(&mut self, content: &DocumentContent) {
        for (index, item) in content.items.iter().enumerate() {
            if item.taxes.is_incomplete() {
                self.result.warn(
                    FindingKind::MissingTaxDetail,
                    format!("/NFe/infNFe/det[{}]/imposto", index + 1),
                    "tax detail missing; non-taxed defaults were rendered",
                );
            }
        }
    }

    // ── Field helpers ──

    /// Child text that must be one of `allowed`; returned only when valid.
    fn code(&mut self, parent: &XmlElement, path: &str, name: &str, allowed: &[&str]) -> Option<String> {
        let value = text(parent, name)?;
        if allowed.contains(&value.as_str()) {
            Some(value)
        } else {
            self.invalid_code(path, name, &value);
            None
        }
    }

    fn decimal(&mut self, parent: &XmlElement, path: &str, name: &str) -> Option<Decimal> {
        let value = text(parent, name)?;
        self.parse_decimal(path, name, &value)
    }

    fn parse_decimal(&mut self, path: &str, name: &str, value: &str) -> Option<Decimal> {
        match Decimal::from_str(value) {
            Ok(d) => Some(d),
            Err(_) => {
                self.malformed(path, name, format!("{value} is not a decimal number"));
                None
            }
        }
    }

    /// All ASCII digits with one of the given lengths.
    fn digits(&mut self, path: &str, name: &str, value: &str, lengths: &[usize]) -> bool {
        let ok = value.bytes().all(|b| b.is_ascii_digit()) && lengths.contains(&value.len());
        if !ok {
            let expected: Vec<String> = lengths.iter().map(|l| l.to_string()).collect();
            self.malformed(
                path,
                name,
                format!("{value} must be {} digits", expected.join(" or ")),
            );
        }
        ok
    }

    fn length(&mut self, path: &str, name: &str, value: &str, min: usize, max: usize) {
        let len = value.chars().count();
        if len < min || len > max {
            self.malformed(path, name, format!("length {len} outside {min}..={max}"));
        }
    }

    /// Numeric field that must agree with the digits embedded in the key.
    fn key_number(&mut self, path: &str, name: &str, value: &str, in_key: &str, max: u32) {
        match value.parse::<u32>() {
            Ok(n) if n <= max && (name != "nNF" || n > 0) => {
                if in_key.parse::<u32>().ok() != Some(n) {
                    self.mismatch(path, name, value, in_key);
                }
            }
            _ => self.malformed(path, name, format!("{value} is not in range")),
        }
    }

    fn tax_code(&mut self, group: &XmlElement, path: &str, kind: TaxKind) -> Option<String> {
        let Some(cst) = text(group, "CST") else {
            self.result.error(
                FindingKind::MissingElement,
                format!("{path}/CST"),
                "required element is absent",
            );
            return None;
        };
        if kind.accepts(&cst) {
            Some(cst)
        } else {
            self.result.error(
                FindingKind::InvalidCode,
                format!("{path}/CST"),
                format!("{cst} is not a valid {kind} situation code"),
            );
            None
        }
    }

    /// The one group element inside a tax block.
    fn single_group<'x>(&mut self, block: &'x XmlElement, path: &str) -> Option<&'x XmlElement> {
        let mut groups = block.child_elements();
        let first = groups.next();
        if first.is_none() {
            self.result.error(
                FindingKind::MissingElement,
                format!("{path}/*"),
                "tax group is absent",
            );
        }
        if let Some(extra) = groups.next() {
            self.result.error(
                FindingKind::UnexpectedElement,
                format!("{path}/{}", extra.local_name()),
                "only one tax group is allowed",
            );
        }
        first
    }

    fn group_mismatch(&mut self, path: &str, kind: TaxKind, cst: &str) {
        self.result.error(
            FindingKind::InvalidCode,
            path.to_string(),
            format!("{kind} situation code {cst} does not belong in this group"),
        );
    }

    fn invalid_code(&mut self, path: &str, name: &str, value: &str) {
        self.result.error(
            FindingKind::InvalidCode,
            format!("{path}/{name}"),
            format!("{value} is not an accepted value"),
        );
    }

    fn malformed(&mut self, path: &str, name: &str, message: String) {
        self.result
            .error(FindingKind::MalformedValue, format!("{path}/{name}"), message);
    }

    fn identifier(&mut self, path: &str, name: &str, error: nfe_core::IdentifierError) {
        self.result.error(
            FindingKind::MalformedIdentifier,
            format!("{path}/{name}"),
            error.to_string(),
        );
    }

    fn mismatch(&mut self, path: &str, name: &str, found: &str, expected: &str) {
        self.result.error(
            FindingKind::MalformedIdentifier,
            format!("{path}/{name}"),
            format!("{found} does not match the access key ({expected})"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfe_builder::{
        BuilderConfig, BusinessInput, DocumentBuilder, ItemInput, PisCofinsRegime,
        StandardTaxCalculator,
    };
    use nfe_core::{
        DocumentNumber, Environment, NumericCode, SequenceKey, Series, TaxBreakdown, TaxLine,
        Totals, XmlNode,
    };
    use nfe_state::test_support::{sample_issuer, sample_recipient};

    fn item(quantity: i64, unit_value: Decimal) -> ItemInput {
        ItemInput {
            code: Some("P001".into()),
            description: Some("Camiseta algodao".into()),
            ncm: Some("61091000".into()),
            cfop: Some("5102".into()),
            unit: Some("UN".into()),
            quantity: Some(Decimal::from(quantity)),
            unit_value: Some(unit_value),
            ..ItemInput::default()
        }
    }

    fn input() -> BusinessInput {
        BusinessInput {
            issuer: Some(sample_issuer()),
            recipient: Some(sample_recipient()),
            issued_at: Some(Timestamp::parse("2024-03-15T10:30:00-03:00").unwrap()),
            numeric_code: Some(NumericCode::new(12_345_678).unwrap()),
            items: vec![item(2, Decimal::from(10))],
            ..BusinessInput::default()
        }
    }

    fn build(input: &BusinessInput) -> FiscalDocument {
        let builder = DocumentBuilder::new(BuilderConfig::default()).unwrap();
        let calc = StandardTaxCalculator::new(PisCofinsRegime::Real);
        let items = builder.compute_items(input, &calc).unwrap();
        let key = SequenceKey::new(Series::new(1).unwrap(), Environment::Homologation);
        builder
            .build(input, key, DocumentNumber::new(4).unwrap(), items)
            .unwrap()
    }

    /// Apply `f` to the first element reached by following `path` from the
    /// root by local name.
    fn edit(doc: &mut FiscalDocument, path: &[&str], f: impl FnOnce(&mut XmlElement)) {
        let xml = doc.xml_mut().unwrap();
        let mut indices = Vec::new();
        let mut current: &XmlElement = &*xml;
        for name in path {
            let i = current
                .children
                .iter()
                .position(|n| matches!(n, XmlNode::Element(e) if e.local_name() == *name))
                .unwrap();
            indices.push(i);
            current = current.element_at(&[i]).unwrap();
        }
        f(xml.element_at_mut(&indices).unwrap());
    }

    fn set_text(doc: &mut FiscalDocument, path: &[&str], value: &str) {
        edit(doc, path, |e| {
            *e = XmlElement::new(e.name.clone()).text(value);
        });
    }

    // ── Clean documents ──

    #[test]
    fn test_assembled_document_is_valid() {
        let doc = build(&input());
        let result = validate(&doc);
        assert!(result.is_ok(), "{:?}", result.errors());
        assert!(result.warnings().is_empty(), "{:?}", result.warnings());
    }

    #[test]
    fn test_declared_totals_matching_items_pass() {
        let mut i = input();
        let mut declared = Totals::default();
        declared.products = Decimal::new(2000, 2);
        declared.document = Decimal::new(2000, 2);
        // Explicit empty taxes keep all tax sums at zero.
        i.items[0].taxes = Some(TaxBreakdown::default());
        i.declared_totals = Some(declared);
        let result = validate(&build(&i));
        assert!(result.is_ok(), "{:?}", result.errors());
    }

    // ── Totals ──

    #[test]
    fn test_declared_products_total_diverging_from_items_fails() {
        let mut i = input();
        let mut declared = Totals::default();
        declared.products = Decimal::new(1900, 2);
        declared.document = Decimal::new(1900, 2);
        i.items[0].taxes = Some(TaxBreakdown::default());
        i.declared_totals = Some(declared);
        let result = validate(&build(&i));
        assert!(result.has_error(FindingKind::TotalsDivergence));
        let finding = result
            .errors()
            .iter()
            .find(|f| f.kind == FindingKind::TotalsDivergence)
            .unwrap();
        assert_eq!(finding.path, "/NFe/infNFe/total/ICMSTot/vProd");
    }

    #[test]
    fn test_one_cent_rounding_is_tolerated() {
        let mut doc = build(&input());
        set_text(&mut doc, &["infNFe", "total", "ICMSTot", "vICMS"], "3.61");
        let result = validate(&doc);
        assert!(!result.has_error(FindingKind::TotalsDivergence), "{:?}", result.errors());
    }

    #[test]
    fn test_document_value_must_follow_formula() {
        let mut doc = build(&input());
        set_text(&mut doc, &["infNFe", "total", "ICMSTot", "vNF"], "25.00");
        let result = validate(&doc);
        assert!(result
            .errors()
            .iter()
            .any(|f| f.path.ends_with("/vNF") && f.kind == FindingKind::TotalsDivergence));
    }

    #[test]
    fn test_payment_must_cover_document_value() {
        let mut doc = build(&input());
        set_text(&mut doc, &["infNFe", "pag", "detPag", "vPag"], "10.00");
        let result = validate(&doc);
        assert!(result
            .errors()
            .iter()
            .any(|f| f.path == "/NFe/infNFe/pag/detPag"));
    }

    #[test]
    fn test_item_value_must_match_quantity_times_unit() {
        let mut doc = build(&input());
        set_text(&mut doc, &["infNFe", "det", "prod", "vProd"], "21.00");
        let result = validate(&doc);
        assert!(result.has_error(FindingKind::ItemValueDivergence));
    }

    // ── Structure ──

    #[test]
    fn test_missing_element_is_reported() {
        let mut doc = build(&input());
        edit(&mut doc, &["infNFe", "ide"], |ide| {
            ide.children.retain(|n| match n {
                XmlNode::Element(e) => e.local_name() != "natOp",
                _ => true,
            });
        });
        let result = validate(&doc);
        assert!(result
            .errors()
            .iter()
            .any(|f| f.kind == FindingKind::MissingElement && f.path == "/NFe/infNFe/ide/natOp"));
    }

    #[test]
    fn test_out_of_order_element_is_reported() {
        let mut doc = build(&input());
        edit(&mut doc, &["infNFe"], |inf| {
            // Move `emit` after `dest`.
            let positions: Vec<usize> = inf
                .children
                .iter()
                .enumerate()
                .filter(|(_, n)| {
                    matches!(n, XmlNode::Element(e) if matches!(e.local_name(), "emit" | "dest"))
                })
                .map(|(i, _)| i)
                .collect();
            inf.children.swap(positions[0], positions[1]);
        });
        let result = validate(&doc);
        assert!(result.has_error(FindingKind::OutOfOrder));
    }

    #[test]
    fn test_unknown_element_is_reported() {
        let mut doc = build(&input());
        edit(&mut doc, &["infNFe", "ide"], |ide| {
            ide.push(XmlElement::new("xFoo").text("1"));
        });
        assert!(validate(&doc).has_error(FindingKind::UnexpectedElement));
    }

    // ── Fields ──

    #[test]
    fn test_invalid_tax_situation_code() {
        // The calculator refuses unknown codes, so inject through explicit taxes.
        let mut i = input();
        i.items[0].taxes = Some(TaxBreakdown {
            icms: Some(TaxLine::exempt("99")),
            pis: Some(TaxLine::exempt("08")),
            cofins: Some(TaxLine::exempt("08")),
            ..TaxBreakdown::default()
        });
        let result = validate(&build(&i));
        let finding = result
            .errors()
            .iter()
            .find(|f| f.kind == FindingKind::InvalidCode)
            .unwrap();
        assert!(finding.path.ends_with("/ICMS/ICMS99/CST"), "{}", finding.path);
    }

    #[test]
    fn test_tax_group_must_match_code() {
        let mut doc = build(&input());
        set_text(&mut doc, &["infNFe", "det", "imposto", "PIS", "PISAliq", "CST"], "08");
        let result = validate(&doc);
        assert!(result
            .errors()
            .iter()
            .any(|f| f.kind == FindingKind::InvalidCode && f.path.ends_with("/PIS/PISAliq")));
    }

    #[test]
    fn test_malformed_ncm() {
        let mut i = input();
        i.items[0].ncm = Some("6109".into());
        let result = validate(&build(&i));
        assert!(result
            .errors()
            .iter()
            .any(|f| f.kind == FindingKind::MalformedValue && f.path == "/NFe/infNFe/det[1]/prod/NCM"));
    }

    #[test]
    fn test_cnpj_with_bad_check_digits() {
        let mut doc = build(&input());
        set_text(&mut doc, &["infNFe", "emit", "CNPJ"], "11222333000182");
        let result = validate(&doc);
        assert!(result
            .errors()
            .iter()
            .any(|f| f.kind == FindingKind::MalformedIdentifier && f.path == "/NFe/infNFe/emit/CNPJ"));
    }

    #[test]
    fn test_header_must_agree_with_access_key() {
        let mut doc = build(&input());
        set_text(&mut doc, &["infNFe", "ide", "cDV"], "0");
        set_text(&mut doc, &["infNFe", "ide", "nNF"], "5");
        let result = validate(&doc);
        let paths: Vec<&str> = result.errors().iter().map(|f| f.path.as_str()).collect();
        assert!(paths.contains(&"/NFe/infNFe/ide/nNF"));
        // The builder's check digit for this key is not 0 unless by chance.
        if doc.access_key().check_digit() != 0 {
            assert!(paths.contains(&"/NFe/infNFe/ide/cDV"));
        }
    }

    #[test]
    fn test_interstate_cfop_on_internal_operation() {
        let mut i = input();
        i.items[0].cfop = Some("6102".into());
        let result = validate(&build(&i));
        assert!(result
            .errors()
            .iter()
            .any(|f| f.path == "/NFe/infNFe/det[1]/prod/CFOP"));
    }

    // ── Warnings ──

    #[test]
    fn test_missing_tax_detail_is_a_warning() {
        let mut i = input();
        i.items[0].taxes = Some(TaxBreakdown::default());
        let result = validate(&build(&i));
        assert!(result.is_ok(), "{:?}", result.errors());
        assert!(result.has_warning(FindingKind::MissingTaxDetail));
    }

    #[test]
    fn test_low_unit_price_is_a_warning() {
        let mut i = input();
        i.items = vec![item(1000, Decimal::new(5, 3))];
        let result = validate(&build(&i));
        assert!(result.is_ok(), "{:?}", result.errors());
        assert!(result.has_warning(FindingKind::LowUnitPrice));
    }

    #[test]
    fn test_large_item_count_threshold_is_configurable() {
        let mut i = input();
        i.items = vec![item(1, Decimal::from(5)); 3];
        let doc = build(&i);
        let strict = Validator::new(ValidatorConfig {
            large_item_count: 2,
            ..ValidatorConfig::default()
        });
        assert!(strict.validate(&doc).has_warning(FindingKind::LargeItemCount));
        assert!(!validate(&doc).has_warning(FindingKind::LargeItemCount));
    }
}
