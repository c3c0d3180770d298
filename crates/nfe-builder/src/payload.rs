//! # Authority Request Payloads
//!
//! The XML bodies placed inside the SOAP envelope, one per operation.
//! Cancellation events and void ranges are returned unsigned; the caller
//! signs them with the same enveloped algorithm as documents, passing the
//! `Id` from [`CancellationEvent::element_id`] or [`VoidRange::element_id`].
//!
//! | Operation        | Root           | Version |
//! |------------------|----------------|---------|
//! | Authorization    | `enviNFe`      | 4.00    |
//! | Receipt query    | `consReciNFe`  | 4.00    |
//! | Protocol query   | `consSitNFe`   | 4.00    |
//! | Cancellation     | `envEvento`    | 1.00    |
//! | Void range       | `inutNFe`      | 4.00    |
//! | Service status   | `consStatServ` | 4.00    |

use chrono::FixedOffset;

use nfe_core::access_key::MODEL_NFE;
use nfe_core::{AccessKey, Cnpj, Environment, Uf, XmlElement, NFE_NAMESPACE};
use nfe_state::{CancellationEvent, VoidRange, CANCELLATION_EVENT_TYPE};

use crate::document::LAYOUT_VERSION;

/// Version of the event layout.
pub const EVENT_VERSION: &str = "1.00";

/// Batch identifiers have at most 15 digits.
pub const MAX_BATCH_ID: u64 = 999_999_999_999_999;

fn root(name: &str, version: &str) -> XmlElement {
    XmlElement::new(name)
        .attr("xmlns", NFE_NAMESPACE)
        .attr("versao", version)
}

/// `enviNFe` carrying one signed document, synchronous processing requested.
pub fn authorization_batch(batch_id: u64, signed_nfe: &XmlElement) -> XmlElement {
    root("enviNFe", LAYOUT_VERSION)
        .leaf("idLote", (batch_id % (MAX_BATCH_ID + 1)).to_string())
        .leaf("indSinc", "1")
        .child(signed_nfe.clone())
}

/// `consReciNFe` for an asynchronous receipt.
pub fn receipt_query(environment: Environment, receipt: &str) -> XmlElement {
    root("consReciNFe", LAYOUT_VERSION)
        .leaf("tpAmb", environment.code().to_string())
        .leaf("nRec", receipt)
}

/// `consSitNFe` for the current situation of a document.
pub fn protocol_query(environment: Environment, key: &AccessKey) -> XmlElement {
    root("consSitNFe", LAYOUT_VERSION)
        .leaf("tpAmb", environment.code().to_string())
        .leaf("xServ", "CONSULTAR")
        .leaf("chNFe", key.as_str())
}

/// `consStatServ` for the authority serving `uf`.
pub fn status_query(environment: Environment, uf: Uf) -> XmlElement {
    root("consStatServ", LAYOUT_VERSION)
        .leaf("tpAmb", environment.code().to_string())
        .leaf("cUF", format!("{:02}", uf.ibge_code()))
        .leaf("xServ", "STATUS")
}

/// `envEvento` with one unsigned cancellation `evento`.
///
/// The signature belongs inside `evento`, after `infEvento`.
pub fn cancellation_event(
    batch_id: u64,
    event: &CancellationEvent,
    issuer: &Cnpj,
    environment: Environment,
    offset: FixedOffset,
) -> XmlElement {
    let detail = XmlElement::new("detEvento")
        .attr("versao", EVENT_VERSION)
        .leaf("descEvento", "Cancelamento")
        .leaf("nProt", event.authorization_protocol.as_str())
        .leaf("xJust", event.justification.as_str());

    let info = XmlElement::new("infEvento")
        .attr("Id", event.element_id())
        .leaf("cOrgao", event.uf_code())
        .leaf("tpAmb", environment.code().to_string())
        .leaf("CNPJ", issuer.as_str())
        .leaf("chNFe", event.access_key.as_str())
        .leaf("dhEvento", event.issued_at.to_local_rfc3339(offset))
        .leaf("tpEvento", CANCELLATION_EVENT_TYPE)
        .leaf("nSeqEvento", event.sequence.to_string())
        .leaf("verEvento", EVENT_VERSION)
        .child(detail);

    root("envEvento", EVENT_VERSION)
        .leaf("idLote", (batch_id % (MAX_BATCH_ID + 1)).to_string())
        .child(XmlElement::new("evento").attr("versao", EVENT_VERSION).child(info))
}

/// `inutNFe` for a range of unused numbers. The signature goes inside
/// `inutNFe`, after `infInut`.
pub fn void_range_request(range: &VoidRange) -> XmlElement {
    let info = XmlElement::new("infInut")
        .attr("Id", range.element_id())
        .leaf("tpAmb", range.environment.code().to_string())
        .leaf("xServ", "INUTILIZAR")
        .leaf("cUF", format!("{:02}", range.uf.ibge_code()))
        .leaf("ano", range.short_year())
        .leaf("CNPJ", range.issuer.as_str())
        .leaf("mod", MODEL_NFE)
        .leaf("serie", range.series.get().to_string())
        .leaf("nNFIni", range.first.get().to_string())
        .leaf("nNFFin", range.last.get().to_string())
        .leaf("xJust", range.justification.as_str());
    root("inutNFe", LAYOUT_VERSION).child(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfe_core::{DocumentNumber, Series};
    use nfe_state::test_support::{sample_content, ISSUER_CNPJ};
    use nfe_state::Justification;

    fn justification() -> Justification {
        Justification::new("Pedido cancelado pelo cliente").unwrap()
    }

    fn names(e: &XmlElement) -> Vec<&str> {
        e.child_elements().map(|c| c.local_name()).collect()
    }

    #[test]
    fn batch_wraps_document() {
        let nfe = XmlElement::new("NFe").attr("xmlns", NFE_NAMESPACE);
        let batch = authorization_batch(42, &nfe);
        assert_eq!(names(&batch), ["idLote", "indSinc", "NFe"]);
        assert_eq!(batch.child_text("idLote").unwrap(), "42");
        assert_eq!(batch.attribute("versao"), Some("4.00"));
    }

    #[test]
    fn cancellation_event_layout() {
        let content = sample_content(4);
        let event = CancellationEvent::new(
            content.access_key.clone(),
            "135240000000001".into(),
            1,
            justification(),
        )
        .unwrap();
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let env = cancellation_event(7, &event, &content.issuer.cnpj, content.environment, offset);

        let info = env.path(&["evento", "infEvento"]).unwrap();
        assert_eq!(info.attribute("Id"), Some(event.element_id().as_str()));
        assert_eq!(
            names(info),
            [
                "cOrgao", "tpAmb", "CNPJ", "chNFe", "dhEvento", "tpEvento", "nSeqEvento",
                "verEvento", "detEvento"
            ]
        );
        assert_eq!(info.child_text("tpEvento").unwrap(), "110111");
        assert_eq!(info.child_text("cOrgao").unwrap(), "35");
        let det = info.find_child("detEvento").unwrap();
        assert_eq!(det.child_text("nProt").unwrap(), "135240000000001");
        assert_eq!(det.child_text("descEvento").unwrap(), "Cancelamento");
    }

    #[test]
    fn void_range_layout() {
        let range = VoidRange::new(
            Cnpj::parse(ISSUER_CNPJ).unwrap(),
            Uf::SP,
            2024,
            Environment::Homologation,
            Series::new(1).unwrap(),
            DocumentNumber::new(10).unwrap(),
            DocumentNumber::new(12).unwrap(),
            justification(),
        )
        .unwrap();
        let req = void_range_request(&range);
        let info = req.find_child("infInut").unwrap();
        assert_eq!(info.attribute("Id"), Some(range.element_id().as_str()));
        assert_eq!(info.child_text("ano").unwrap(), "24");
        assert_eq!(info.child_text("nNFIni").unwrap(), "10");
        assert_eq!(info.child_text("nNFFin").unwrap(), "12");
        assert_eq!(info.child_text("xServ").unwrap(), "INUTILIZAR");
    }

    #[test]
    fn queries() {
        let key = sample_content(4).access_key;
        let q = protocol_query(Environment::Production, &key);
        assert_eq!(q.child_text("tpAmb").unwrap(), "1");
        assert_eq!(q.child_text("chNFe").unwrap(), key.as_str());

        let s = status_query(Environment::Homologation, Uf::MS);
        assert_eq!(s.child_text("cUF").unwrap(), "50");
        assert_eq!(s.child_text("xServ").unwrap(), "STATUS");

        let r = receipt_query(Environment::Homologation, "351000000000001");
        assert_eq!(r.child_text("nRec").unwrap(), "351000000000001");
    }
}
