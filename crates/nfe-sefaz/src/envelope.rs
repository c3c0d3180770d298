//! # SOAP 1.2 Envelope
//!
//! Requests carry the payload inside `nfeDadosMsg`, in the namespace of the
//! service definition, with a `nfeCabecMsg` header naming the state and the
//! data version. Responses carry the result inside `nfeResultMsg`.
//!
//! The payload is serialized as-is. A signed document is never re-rendered
//! between signing and sending.

use nfe_builder::LAYOUT_VERSION;
use nfe_core::{TransmissionResult, Uf, XmlElement};

use crate::endpoint::Service;
use crate::error::TransportError;

pub const SOAP12_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";

/// The request envelope for `payload`.
pub fn envelope(service: Service, uf: Uf, payload: &XmlElement) -> XmlElement {
    let namespace = service.namespace();
    let header = XmlElement::new("nfeCabecMsg")
        .attr("xmlns", namespace.as_str())
        .leaf("cUF", format!("{:02}", uf.ibge_code()))
        .leaf("versaoDados", LAYOUT_VERSION);
    let body = XmlElement::new("nfeDadosMsg")
        .attr("xmlns", namespace)
        .child(payload.clone());

    XmlElement::new("soap12:Envelope")
        .attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
        .attr("xmlns:xsd", "http://www.w3.org/2001/XMLSchema")
        .attr("xmlns:soap12", SOAP12_NAMESPACE)
        .child(XmlElement::new("soap12:Header").child(header))
        .child(XmlElement::new("soap12:Body").child(body))
}

/// `Content-Type` with the SOAP action for `service`.
pub fn content_type(service: Service) -> String {
    format!(
        "application/soap+xml; charset=utf-8; action=\"{}/{}\"",
        service.namespace(),
        service.method()
    )
}

/// Reason text of a SOAP fault, if `body` is one.
pub fn fault_reason(body: &str) -> Option<String> {
    let doc = XmlElement::parse(body).ok()?;
    let fault = doc.find_descendant("Fault")?;
    let reason = fault
        .find_descendant("Reason")
        .and_then(|r| r.find_descendant("Text"))
        .or_else(|| fault.find_descendant("faultstring"))
        .map(|e| e.text_content().trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "unspecified fault".to_string());
    Some(reason)
}

/// Normalize a successful HTTP response into a [`TransmissionResult`].
///
/// For batch operations the per-document status inside `protNFe/infProt`,
/// `retEvento/infEvento` or `retInutNFe/infInut` takes precedence over the
/// batch status, which only says whether the batch was processed.
///
/// A protocol query is the opposite: `retConsSitNFe/cStat` is the current
/// situation of the document (101 once cancelled) while the embedded
/// `infProt` still carries the original authorization. The nested status
/// is used only when the top level has none.
pub fn parse_response(
    service: Service,
    endpoint: &str,
    body: &str,
) -> Result<TransmissionResult, TransportError> {
    let malformed = |reason: String| TransportError::MalformedResponse {
        endpoint: endpoint.to_string(),
        reason,
    };
    let doc = XmlElement::parse(body).map_err(|e| malformed(e.to_string()))?;
    if let Some(reason) = fault_reason(body) {
        return Err(TransportError::SoapFault {
            endpoint: endpoint.to_string(),
            reason,
        });
    }

    let result = doc
        .find_descendant("nfeResultMsg")
        .or_else(|| doc.find_descendant("Body"))
        .and_then(|wrapper| wrapper.child_elements().next())
        .ok_or_else(|| malformed("no result message in body".into()))?;

    let info = ["infProt", "infEvento", "infInut"]
        .iter()
        .filter_map(|name| result.find_descendant(name))
        .find(|info| info.find_child("cStat").is_some())
        .unwrap_or(result);
    let status_source = if service == Service::Query && result.find_child("cStat").is_some() {
        result
    } else {
        info
    };

    let status = status_source
        .child_text("cStat")
        .ok_or_else(|| malformed(format!("{} has no cStat", result.local_name())))?;
    let status_code = status
        .trim()
        .parse::<u16>()
        .map_err(|_| malformed(format!("cStat {status:?} is not numeric")))?;

    let text = |e: &XmlElement, name: &str| {
        e.child_text(name)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    };

    Ok(TransmissionResult {
        status_code,
        motive: text(status_source, "xMotivo").unwrap_or_default(),
        protocol: text(info, "nProt"),
        access_key: text(info, "chNFe"),
        received_at: text(info, "dhRecbto").or_else(|| text(result, "dhRecbto")),
        receipt: result
            .find_descendant("nRec")
            .map(|e| e.text_content().trim().to_string()),
        raw_response: body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfe_core::NFE_NAMESPACE;

    fn wrap(result: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body><nfeResultMsg xmlns="http://www.portalfiscal.inf.br/nfe/wsdl/NFeAutorizacao4">{result}</nfeResultMsg></soap:Body></soap:Envelope>"#
        )
    }

    #[test]
    fn test_envelope_layout() {
        let payload = XmlElement::new("consStatServ")
            .attr("xmlns", NFE_NAMESPACE)
            .leaf("tpAmb", "2");
        let env = envelope(Service::Status, Uf::SP, &payload);
        let header = env.path(&["Header", "nfeCabecMsg"]).unwrap();
        assert_eq!(header.child_text("cUF").unwrap(), "35");
        assert_eq!(header.child_text("versaoDados").unwrap(), "4.00");
        let body = env.path(&["Body", "nfeDadosMsg"]).unwrap();
        assert_eq!(
            body.attribute("xmlns"),
            Some("http://www.portalfiscal.inf.br/nfe/wsdl/NFeStatusServico4")
        );
        assert_eq!(body.find_child("consStatServ"), Some(&payload));
    }

    #[test]
    fn test_content_type_carries_action() {
        assert_eq!(
            content_type(Service::Authorize),
            "application/soap+xml; charset=utf-8; \
             action=\"http://www.portalfiscal.inf.br/nfe/wsdl/NFeAutorizacao4/nfeAutorizacaoLote\""
        );
    }

    #[test]
    fn test_synchronous_authorization_uses_protocol_status() {
        let body = wrap(
            "<retEnviNFe versao=\"4.00\"><tpAmb>2</tpAmb><cStat>104</cStat>\
             <xMotivo>Lote processado</xMotivo><dhRecbto>2024-03-15T10:30:05-03:00</dhRecbto>\
             <protNFe versao=\"4.00\"><infProt><tpAmb>2</tpAmb>\
             <chNFe>35240311222333000181550010000000041123456780</chNFe>\
             <dhRecbto>2024-03-15T10:30:06-03:00</dhRecbto><nProt>135240000000001</nProt>\
             <cStat>100</cStat><xMotivo>Autorizado o uso da NF-e</xMotivo></infProt></protNFe>\
             </retEnviNFe>",
        );
        let r = parse_response(Service::Authorize, "http://sefaz", &body).unwrap();
        assert_eq!(r.status_code, 100);
        assert_eq!(r.motive, "Autorizado o uso da NF-e");
        assert_eq!(r.protocol.as_deref(), Some("135240000000001"));
        assert_eq!(r.received_at.as_deref(), Some("2024-03-15T10:30:06-03:00"));
        assert_eq!(r.raw_response, body);
    }

    #[test]
    fn test_batch_level_rejection() {
        let body = wrap(
            "<retEnviNFe versao=\"4.00\"><cStat>225</cStat>\
             <xMotivo>Rejeicao: Falha no Schema XML</xMotivo></retEnviNFe>",
        );
        let r = parse_response(Service::Authorize, "http://sefaz", &body).unwrap();
        assert_eq!(r.status_code, 225);
        assert!(r.protocol.is_none());
    }

    #[test]
    fn test_asynchronous_acknowledgement_carries_receipt() {
        let body = wrap(
            "<retEnviNFe versao=\"4.00\"><cStat>103</cStat><xMotivo>Lote recebido</xMotivo>\
             <infRec><nRec>351000000000001</nRec><tMed>1</tMed></infRec></retEnviNFe>",
        );
        let r = parse_response(Service::Authorize, "http://sefaz", &body).unwrap();
        assert_eq!(r.status_code, 103);
        assert_eq!(r.receipt.as_deref(), Some("351000000000001"));
    }

    #[test]
    fn test_event_result() {
        let body = wrap(
            "<retEnvEvento versao=\"1.00\"><cStat>128</cStat><xMotivo>Lote de Evento Processado</xMotivo>\
             <retEvento versao=\"1.00\"><infEvento><cStat>135</cStat>\
             <xMotivo>Evento registrado e vinculado a NF-e</xMotivo><nProt>135240000000099</nProt>\
             </infEvento></retEvento></retEnvEvento>",
        );
        let r = parse_response(Service::Authorize, "http://sefaz", &body).unwrap();
        assert_eq!(r.status_code, 135);
        assert!(r.cancellation_accepted());
        assert_eq!(r.protocol.as_deref(), Some("135240000000099"));
    }

    #[test]
    fn test_query_of_cancelled_document_uses_situation_status() {
        let body = wrap(
            "<retConsSitNFe versao=\"4.00\"><tpAmb>2</tpAmb><cStat>101</cStat>\
             <xMotivo>Cancelamento de NF-e homologado</xMotivo><cUF>35</cUF>\
             <chNFe>35240311222333000181550010000000041123456780</chNFe>\
             <protNFe versao=\"4.00\"><infProt><cStat>100</cStat>\
             <xMotivo>Autorizado o uso da NF-e</xMotivo><nProt>135240000000001</nProt>\
             </infProt></protNFe></retConsSitNFe>",
        );
        let r = parse_response(Service::Query, "http://sefaz", &body).unwrap();
        assert_eq!(r.status_code, 101);
        assert_eq!(r.motive, "Cancelamento de NF-e homologado");
        assert_eq!(r.query_outcome(), nfe_core::QueryOutcome::Cancelled);
        assert_eq!(r.protocol.as_deref(), Some("135240000000001"));

        // The same body read as an authorization answer keeps the protocol status.
        let r = parse_response(Service::Authorize, "http://sefaz", &body).unwrap();
        assert_eq!(r.status_code, 100);
    }

    #[test]
    fn test_query_without_top_level_status_falls_back_to_protocol() {
        let body = wrap(
            "<retConsSitNFe versao=\"4.00\"><protNFe versao=\"4.00\"><infProt>\
             <cStat>100</cStat><xMotivo>Autorizado o uso da NF-e</xMotivo>\
             </infProt></protNFe></retConsSitNFe>",
        );
        let r = parse_response(Service::Query, "http://sefaz", &body).unwrap();
        assert_eq!(r.status_code, 100);
        assert_eq!(r.motive, "Autorizado o uso da NF-e");
    }

    #[test]
    fn test_soap_fault() {
        let body = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body><soap:Fault><soap:Code><soap:Value>soap:Receiver</soap:Value></soap:Code><soap:Reason><soap:Text xml:lang="en">Server was unable to process request.</soap:Text></soap:Reason></soap:Fault></soap:Body></soap:Envelope>"#;
        let err = parse_response(Service::Authorize, "http://sefaz", body).unwrap_err();
        match err {
            TransportError::SoapFault { reason, .. } => {
                assert_eq!(reason, "Server was unable to process request.")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            parse_response(Service::Status, "http://sefaz", "<html><body>Service Unavailable</body></html>"),
            Err(TransportError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_response(Service::Status, "http://sefaz", "not xml at all <"),
            Err(TransportError::MalformedResponse { .. })
        ));
    }
}
