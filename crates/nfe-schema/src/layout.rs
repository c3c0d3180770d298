//! # Layout Sequences
//!
//! The subset of the 4.00 layout the pipeline emits, expressed as ordered
//! slots. Each slot admits one or more alternative element names and an
//! occurrence rule. [`check_sequence`] reports elements that are missing,
//! unknown, duplicated, or out of order.

use nfe_core::XmlElement;

use crate::finding::{FindingKind, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurs {
    Required,
    Optional,
    /// One or more.
    Repeated,
    /// Zero or more.
    AnyNumber,
}

#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub names: &'static [&'static str],
    pub occurs: Occurs,
}

const fn req(names: &'static [&'static str]) -> Slot {
    Slot {
        names,
        occurs: Occurs::Required,
    }
}

const fn opt(names: &'static [&'static str]) -> Slot {
    Slot {
        names,
        occurs: Occurs::Optional,
    }
}

pub const NFE: &[Slot] = &[req(&["infNFe"]), opt(&["Signature"])];

pub const INF_NFE: &[Slot] = &[
    req(&["ide"]),
    req(&["emit"]),
    req(&["dest"]),
    Slot {
        names: &["det"],
        occurs: Occurs::Repeated,
    },
    req(&["total"]),
    req(&["transp"]),
    req(&["pag"]),
    opt(&["infAdic"]),
];

pub const IDE: &[Slot] = &[
    req(&["cUF"]),
    req(&["cNF"]),
    req(&["natOp"]),
    req(&["mod"]),
    req(&["serie"]),
    req(&["nNF"]),
    req(&["dhEmi"]),
    opt(&["dhSaiEnt"]),
    req(&["tpNF"]),
    req(&["idDest"]),
    req(&["cMunFG"]),
    req(&["tpImp"]),
    req(&["tpEmis"]),
    req(&["cDV"]),
    req(&["tpAmb"]),
    req(&["finNFe"]),
    req(&["indFinal"]),
    req(&["indPres"]),
    opt(&["indIntermed"]),
    req(&["procEmi"]),
    req(&["verProc"]),
];

pub const EMIT: &[Slot] = &[
    req(&["CNPJ", "CPF"]),
    req(&["xNome"]),
    opt(&["xFant"]),
    req(&["enderEmit"]),
    req(&["IE"]),
    opt(&["IEST"]),
    opt(&["IM"]),
    opt(&["CNAE"]),
    req(&["CRT"]),
];

pub const ADDRESS: &[Slot] = &[
    req(&["xLgr"]),
    req(&["nro"]),
    opt(&["xCpl"]),
    req(&["xBairro"]),
    req(&["cMun"]),
    req(&["xMun"]),
    req(&["UF"]),
    req(&["CEP"]),
    opt(&["cPais"]),
    opt(&["xPais"]),
    opt(&["fone"]),
];

pub const DEST: &[Slot] = &[
    req(&["CNPJ", "CPF", "idEstrangeiro"]),
    req(&["xNome"]),
    req(&["enderDest"]),
    req(&["indIEDest"]),
    opt(&["IE"]),
    opt(&["ISUF"]),
    opt(&["IM"]),
    opt(&["email"]),
];

pub const DET: &[Slot] = &[req(&["prod"]), req(&["imposto"]), opt(&["infAdProd"])];

pub const PROD: &[Slot] = &[
    req(&["cProd"]),
    req(&["cEAN"]),
    req(&["xProd"]),
    req(&["NCM"]),
    opt(&["CEST"]),
    opt(&["EXTIPI"]),
    req(&["CFOP"]),
    req(&["uCom"]),
    req(&["qCom"]),
    req(&["vUnCom"]),
    req(&["vProd"]),
    req(&["cEANTrib"]),
    req(&["uTrib"]),
    req(&["qTrib"]),
    req(&["vUnTrib"]),
    opt(&["vFrete"]),
    opt(&["vSeg"]),
    opt(&["vDesc"]),
    opt(&["vOutro"]),
    req(&["indTot"]),
    opt(&["xPed"]),
    opt(&["nItemPed"]),
];

pub const IMPOSTO: &[Slot] = &[
    opt(&["vTotTrib"]),
    req(&["ICMS"]),
    opt(&["IPI"]),
    opt(&["II"]),
    req(&["PIS"]),
    req(&["COFINS"]),
];

pub const ICMS_TOT: &[Slot] = &[
    req(&["vBC"]),
    req(&["vICMS"]),
    req(&["vICMSDeson"]),
    req(&["vFCP"]),
    req(&["vBCST"]),
    req(&["vST"]),
    req(&["vFCPST"]),
    req(&["vFCPSTRet"]),
    req(&["vProd"]),
    req(&["vFrete"]),
    req(&["vSeg"]),
    req(&["vDesc"]),
    req(&["vII"]),
    req(&["vIPI"]),
    req(&["vIPIDevol"]),
    req(&["vPIS"]),
    req(&["vCOFINS"]),
    req(&["vOutro"]),
    req(&["vNF"]),
    opt(&["vTotTrib"]),
];

pub const TOTAL: &[Slot] = &[req(&["ICMSTot"])];

pub const TRANSP: &[Slot] = &[
    req(&["modFrete"]),
    opt(&["transporta"]),
    opt(&["veicTransp"]),
    Slot {
        names: &["vol"],
        occurs: Occurs::AnyNumber,
    },
];

pub const PAG: &[Slot] = &[
    Slot {
        names: &["detPag"],
        occurs: Occurs::Repeated,
    },
    opt(&["vTroco"]),
];

pub const DET_PAG: &[Slot] = &[opt(&["indPag"]), req(&["tPag"]), req(&["vPag"])];

pub const INF_ADIC: &[Slot] = &[opt(&["infAdFisco"]), opt(&["infCpl"])];

/// Check the element children of `parent` against `slots`.
pub fn check_sequence(result: &mut ValidationResult, parent: &XmlElement, path: &str, slots: &[Slot]) {
    let mut counts = vec![0usize; slots.len()];
    let mut cursor = 0usize;

    for child in parent.child_elements() {
        let name = child.local_name();
        let child_path = format!("{path}/{name}");
        let Some(index) = slots.iter().position(|s| s.names.contains(&name)) else {
            result.error(
                FindingKind::UnexpectedElement,
                child_path,
                format!("element {name} is not allowed here"),
            );
            continue;
        };
        if index < cursor {
            result.error(
                FindingKind::OutOfOrder,
                child_path,
                format!("{name} must precede {}", slots[cursor].names.join("|")),
            );
            continue;
        }
        let repeatable = matches!(slots[index].occurs, Occurs::Repeated | Occurs::AnyNumber);
        if counts[index] > 0 && !repeatable {
            result.error(
                FindingKind::UnexpectedElement,
                child_path,
                format!("{name} may appear only once"),
            );
            continue;
        }
        counts[index] += 1;
        cursor = index;
    }

    for (slot, count) in slots.iter().zip(&counts) {
        if *count == 0 && matches!(slot.occurs, Occurs::Required | Occurs::Repeated) {
            result.error(
                FindingKind::MissingElement,
                format!("{path}/{}", slot.names.join("|")),
                "required element is absent",
            );
        }
    }
}
