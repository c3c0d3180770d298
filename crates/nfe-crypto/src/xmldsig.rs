//! # XML-DSig — Enveloped Signatures
//!
//! Signs the element carrying an `Id` attribute (`infNFe`, `infEvento`,
//! `infInut`) and appends the `Signature` block as the last child of that
//! element's parent, after all business content.
//!
//! ## Algorithm
//!
//! 1. Locate the element whose `Id` equals the requested identifier.
//! 2. Apply the enveloped-signature transform and exclusive
//!    canonicalization to it, with the namespaces inherited from its
//!    ancestors.
//! 3. `DigestValue` = base64(SHA-256(canonical bytes)).
//! 4. Build `SignedInfo` referencing `#Id` with both transforms declared.
//! 5. Canonicalize `SignedInfo` in the scope it will have inside
//!    `<Signature xmlns="http://www.w3.org/2000/09/xmldsig#">` and sign the
//!    bytes with RSA-SHA256.
//! 6. Emit `SignatureValue` and `KeyInfo/X509Data/X509Certificate`.
//!
//! ## Security Invariant
//!
//! Verification recomputes the digest from the tree, never trusting the
//! embedded `DigestValue` alone, and checks the `SignatureValue` against the
//! embedded certificate's public key over the re-canonicalized `SignedInfo`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use nfe_core::canonical::{ENVELOPED_SIGNATURE_TRANSFORM, EXC_C14N_ALGORITHM};
use nfe_core::xml::XMLDSIG_NAMESPACE;
use nfe_core::{CanonicalXml, XmlElement, XmlNode};
use nfe_state::{DocumentState, FiscalDocument, LifecycleError, TransitionEvidence};

use crate::certificate::{verify_sha256, Certificate, CertificateError, CertificateStore};
use crate::digest::sha256_base64;

/// `SignatureMethod` algorithm.
pub const RSA_SHA256_ALGORITHM: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

/// `DigestMethod` algorithm.
pub const SHA256_DIGEST_ALGORITHM: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

// ─── Errors ──────────────────────────────────────────────────────────

/// Signing failures. All are fatal: they indicate a certificate or
/// document-structure defect.
#[derive(Error, Debug)]
pub enum SignError {
    /// No valid certificate is loaded.
    #[error("no valid signing certificate: {0}")]
    NoCertificate(#[source] CertificateError),

    /// No element carries the expected `Id`.
    #[error("no element with Id {id:?} to sign")]
    MissingSignableId {
        /// The identifier looked for.
        id: String,
    },

    /// The document is not a `Draft`.
    #[error("document cannot be signed: {0}")]
    InvalidState(#[from] LifecycleError),

    /// A signature block is already present next to the element.
    #[error("element {id:?} is already signed")]
    AlreadySigned {
        /// The identifier of the signed element.
        id: String,
    },

    /// The private-key operation failed.
    #[error("signature computation failed: {0}")]
    Crypto(String),
}

/// Verification failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("no XML-DSig Signature element found")]
    NoSignature,

    #[error("malformed signature: {0}")]
    Malformed(String),

    /// Reference URI does not resolve to an element.
    #[error("reference {0:?} does not resolve")]
    UnresolvedReference(String),

    /// Recomputed digest differs from `DigestValue`.
    #[error("digest mismatch: embedded {embedded}, computed {computed}")]
    DigestMismatch {
        /// `DigestValue` in the document.
        embedded: String,
        /// Digest recomputed from the referenced element.
        computed: String,
    },

    /// `SignatureValue` does not verify under the embedded certificate.
    #[error("signature value does not verify")]
    BadSignatureValue,

    #[error("embedded certificate unusable: {0}")]
    Certificate(String),
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    /// `Id` of the signed element.
    pub reference_id: String,
    /// `DigestValue`, base64.
    pub digest_value: String,
    /// Signer certificate, DER.
    pub certificate_der: Vec<u8>,
}

// ─── Signing ─────────────────────────────────────────────────────────

/// Sign the element of `root` whose `Id` is `id` and append the
/// `Signature` block to its parent.
pub fn sign_enveloped(root: &mut XmlElement, id: &str, cert: &Certificate) -> Result<(), SignError> {
    let path = root.locate_by_id(id).ok_or_else(|| SignError::MissingSignableId {
        id: id.to_string(),
    })?;
    let parent_path = parent_of(&path);

    let digest_value = {
        let parent = root.element_at(parent_path).ok_or_else(|| SignError::MissingSignableId {
            id: id.to_string(),
        })?;
        if parent.child_elements().any(is_signature_element) {
            return Err(SignError::AlreadySigned { id: id.to_string() });
        }
        let target = root.element_at(&path).ok_or_else(|| SignError::MissingSignableId {
            id: id.to_string(),
        })?;
        let scope = root.namespaces_in_scope(&path);
        sha256_base64(&CanonicalXml::exclusive_enveloped(target, &scope))
    };

    let signed_info = signed_info(id, &digest_value);
    let dsig_scope = [(String::new(), XMLDSIG_NAMESPACE.to_string())];
    let canonical_signed_info = CanonicalXml::exclusive(&signed_info, &dsig_scope);
    let signature_value = cert
        .sign_sha256(canonical_signed_info.as_bytes())
        .map_err(|e| SignError::Crypto(e.to_string()))?;
    let certificate = cert
        .certificate_base64()
        .map_err(|e| SignError::Crypto(e.to_string()))?;

    let signature = XmlElement::new("Signature")
        .attr("xmlns", XMLDSIG_NAMESPACE)
        .child(signed_info)
        .leaf("SignatureValue", STANDARD.encode(signature_value))
        .child(
            XmlElement::new("KeyInfo")
                .child(XmlElement::new("X509Data").leaf("X509Certificate", certificate)),
        );

    root.element_at_mut(parent_path)
        .ok_or_else(|| SignError::MissingSignableId { id: id.to_string() })?
        .push(signature);
    tracing::debug!(id, digest = %digest_value, "enveloped signature appended");
    Ok(())
}

/// Sign a `Draft` fiscal document with the store's current certificate
/// (DRAFT → SIGNED).
///
/// State is checked before the certificate, and the certificate before any
/// tree mutation.
pub fn sign_document(doc: &mut FiscalDocument, store: &CertificateStore) -> Result<(), SignError> {
    if doc.state() != DocumentState::Draft {
        return Err(SignError::InvalidState(LifecycleError::InvalidTransition {
            from: doc.state().to_string(),
            to: DocumentState::Signed.to_string(),
        }));
    }
    let cert = store.current().map_err(SignError::NoCertificate)?;
    let id = doc.access_key().element_id();
    sign_enveloped(doc.xml_mut()?, &id, &cert)?;
    doc.mark_signed(TransitionEvidence {
        reason: format!("enveloped signature by {}", cert.subject()),
        actor: Some("signer".to_string()),
    })?;
    tracing::info!(access_key = %doc.access_key(), "document signed");
    Ok(())
}

fn signed_info(id: &str, digest_value: &str) -> XmlElement {
    XmlElement::new("SignedInfo")
        .child(XmlElement::new("CanonicalizationMethod").attr("Algorithm", EXC_C14N_ALGORITHM))
        .child(XmlElement::new("SignatureMethod").attr("Algorithm", RSA_SHA256_ALGORITHM))
        .child(
            XmlElement::new("Reference")
                .attr("URI", format!("#{id}"))
                .child(
                    XmlElement::new("Transforms")
                        .child(
                            XmlElement::new("Transform")
                                .attr("Algorithm", ENVELOPED_SIGNATURE_TRANSFORM),
                        )
                        .child(XmlElement::new("Transform").attr("Algorithm", EXC_C14N_ALGORITHM)),
                )
                .child(XmlElement::new("DigestMethod").attr("Algorithm", SHA256_DIGEST_ALGORITHM))
                .leaf("DigestValue", digest_value),
        )
}

fn parent_of(path: &[usize]) -> &[usize] {
    match path.split_last() {
        Some((_, parent)) => parent,
        None => path,
    }
}

fn is_signature_element(e: &XmlElement) -> bool {
    e.local_name() == "Signature"
}

// ─── Verification ────────────────────────────────────────────────────

/// Verify the first enveloped signature found in `root`.
pub fn verify_enveloped(root: &XmlElement) -> Result<VerifiedSignature, VerifyError> {
    let sig_path = root
        .locate(&|e| is_signature_element(e))
        .ok_or(VerifyError::NoSignature)?;
    let signature = root.element_at(&sig_path).ok_or(VerifyError::NoSignature)?;
    if namespace_of(root, &sig_path, signature).as_deref() != Some(XMLDSIG_NAMESPACE) {
        return Err(VerifyError::NoSignature);
    }

    let (si_index, signed_info) = signature
        .children
        .iter()
        .enumerate()
        .find_map(|(i, n)| match n {
            XmlNode::Element(e) if e.local_name() == "SignedInfo" => Some((i, e)),
            _ => None,
        })
        .ok_or_else(|| malformed("missing SignedInfo"))?;

    require_algorithm(signed_info, &["CanonicalizationMethod"], EXC_C14N_ALGORITHM)?;
    require_algorithm(signed_info, &["SignatureMethod"], RSA_SHA256_ALGORITHM)?;
    require_algorithm(signed_info, &["Reference", "DigestMethod"], SHA256_DIGEST_ALGORITHM)?;

    let reference = signed_info
        .find_child("Reference")
        .ok_or_else(|| malformed("missing Reference"))?;
    let uri = reference
        .attribute("URI")
        .ok_or_else(|| malformed("Reference without URI"))?;
    let id = uri
        .strip_prefix('#')
        .ok_or_else(|| VerifyError::UnresolvedReference(uri.to_string()))?;
    let embedded = reference
        .child_text("DigestValue")
        .map(|s| strip_whitespace(&s))
        .ok_or_else(|| malformed("missing DigestValue"))?;

    let target_path = root
        .locate_by_id(id)
        .ok_or_else(|| VerifyError::UnresolvedReference(uri.to_string()))?;
    let target = root
        .element_at(&target_path)
        .ok_or_else(|| VerifyError::UnresolvedReference(uri.to_string()))?;
    let computed = sha256_base64(&CanonicalXml::exclusive_enveloped(
        target,
        &root.namespaces_in_scope(&target_path),
    ));
    if computed != embedded {
        return Err(VerifyError::DigestMismatch { embedded, computed });
    }

    let mut si_path = sig_path.clone();
    si_path.push(si_index);
    let canonical_signed_info =
        CanonicalXml::exclusive(signed_info, &root.namespaces_in_scope(&si_path));

    let signature_value = decode_child(signature, &["SignatureValue"])?;
    let certificate_der = decode_child(signature, &["KeyInfo", "X509Data", "X509Certificate"])?;
    let valid = verify_sha256(
        &certificate_der,
        canonical_signed_info.as_bytes(),
        &signature_value,
    )
    .map_err(|e| VerifyError::Certificate(e.to_string()))?;
    if !valid {
        return Err(VerifyError::BadSignatureValue);
    }

    Ok(VerifiedSignature {
        reference_id: id.to_string(),
        digest_value: embedded,
        certificate_der,
    })
}

fn malformed(msg: &str) -> VerifyError {
    VerifyError::Malformed(msg.to_string())
}

fn require_algorithm(parent: &XmlElement, path: &[&str], expected: &str) -> Result<(), VerifyError> {
    let found = parent
        .path(path)
        .and_then(|e| e.attribute("Algorithm"))
        .ok_or_else(|| VerifyError::Malformed(format!("missing {}", path.join("/"))))?;
    if found != expected {
        return Err(VerifyError::Malformed(format!(
            "unsupported {} algorithm {found}",
            path.join("/")
        )));
    }
    Ok(())
}

fn decode_child(parent: &XmlElement, path: &[&str]) -> Result<Vec<u8>, VerifyError> {
    let text = parent
        .path(path)
        .map(XmlElement::text_content)
        .ok_or_else(|| VerifyError::Malformed(format!("missing {}", path.join("/"))))?;
    STANDARD
        .decode(strip_whitespace(&text))
        .map_err(|e| VerifyError::Malformed(format!("{}: {e}", path.join("/"))))
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Namespace URI bound to the element's prefix at `path`.
fn namespace_of(root: &XmlElement, path: &[usize], element: &XmlElement) -> Option<String> {
    let prefix = element.prefix().unwrap_or("");
    element
        .namespace_declarations()
        .find(|(p, _)| *p == prefix)
        .map(|(_, u)| u.to_string())
        .or_else(|| {
            root.namespaces_in_scope(path)
                .into_iter()
                .find(|(p, _)| p == prefix)
                .map(|(_, u)| u)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_certificate, write_pkcs12, TEST_PASSWORD};
    use nfe_core::NFE_NAMESPACE;
    use nfe_state::test_support::sample_content;
    use proptest::prelude::*;
    use std::sync::{Arc, OnceLock};

    fn cert() -> Arc<Certificate> {
        static CERT: OnceLock<Arc<Certificate>> = OnceLock::new();
        Arc::clone(CERT.get_or_init(sample_certificate))
    }

    fn nfe(id: &str, product: &str) -> XmlElement {
        XmlElement::new("NFe").attr("xmlns", NFE_NAMESPACE).child(
            XmlElement::new("infNFe")
                .attr("versao", "4.00")
                .attr("Id", id)
                .child(XmlElement::new("ide").leaf("cUF", "35").leaf("nNF", "4"))
                .child(
                    XmlElement::new("det")
                        .attr("nItem", "1")
                        .child(XmlElement::new("prod").leaf("xProd", product)),
                ),
        )
    }

    fn draft() -> FiscalDocument {
        let content = sample_content(4);
        let id = content.access_key.element_id();
        FiscalDocument::new_draft(content, nfe(&id, "Camiseta"))
    }

    #[test]
    fn signature_is_last_child_of_root_and_verifies() {
        let mut root = nfe("NFe1", "Camiseta");
        sign_enveloped(&mut root, "NFe1", &cert()).unwrap();

        let last = root.child_elements().last().unwrap();
        assert_eq!(last.name, "Signature");
        assert_eq!(last.attribute("xmlns"), Some(XMLDSIG_NAMESPACE));
        let reference = last.path(&["SignedInfo", "Reference"]).unwrap();
        assert_eq!(reference.attribute("URI"), Some("#NFe1"));

        let verified = verify_enveloped(&root).unwrap();
        assert_eq!(verified.reference_id, "NFe1");
        assert_eq!(verified.certificate_der, cert().certificate_der().unwrap());
    }

    #[test]
    fn verification_survives_serialization_round_trip() {
        let mut root = nfe("NFe1", "Camiseta");
        sign_enveloped(&mut root, "NFe1", &cert()).unwrap();
        let reparsed = XmlElement::parse(&root.to_document()).unwrap();
        assert!(verify_enveloped(&reparsed).is_ok());
    }

    #[test]
    fn mutation_inside_signed_subtree_breaks_digest() {
        let mut root = nfe("NFe1", "Camiseta");
        sign_enveloped(&mut root, "NFe1", &cert()).unwrap();
        let tampered = root.to_xml().replace("Camiseta", "Camisetb");
        let tampered = XmlElement::parse(&tampered).unwrap();
        assert!(matches!(
            verify_enveloped(&tampered),
            Err(VerifyError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn forged_digest_fails_signature_check() {
        let mut root = nfe("NFe1", "Camiseta");
        sign_enveloped(&mut root, "NFe1", &cert()).unwrap();
        // Re-sign content with a different key but keep the original
        // certificate: the digest matches, the signature does not.
        let mut other = nfe("NFe1", "Camiseta");
        sign_enveloped(&mut other, "NFe1", &sample_certificate()).unwrap();
        let original_cert = root
            .path(&["Signature", "KeyInfo", "X509Data", "X509Certificate"])
            .unwrap()
            .text_content();
        let forged = other.to_xml().replace(
            &other
                .path(&["Signature", "KeyInfo", "X509Data", "X509Certificate"])
                .unwrap()
                .text_content(),
            &original_cert,
        );
        let forged = XmlElement::parse(&forged).unwrap();
        assert_eq!(verify_enveloped(&forged), Err(VerifyError::BadSignatureValue));
    }

    #[test]
    fn missing_id_is_reported() {
        let mut root = nfe("NFe1", "Camiseta");
        let err = sign_enveloped(&mut root, "NFe999", &cert()).unwrap_err();
        assert!(matches!(err, SignError::MissingSignableId { id } if id == "NFe999"));
    }

    #[test]
    fn second_signature_refused() {
        let mut root = nfe("NFe1", "Camiseta");
        sign_enveloped(&mut root, "NFe1", &cert()).unwrap();
        assert!(matches!(
            sign_enveloped(&mut root, "NFe1", &cert()),
            Err(SignError::AlreadySigned { .. })
        ));
    }

    #[test]
    fn root_with_id_gets_signature_inside() {
        let mut root = XmlElement::new("inutNFe")
            .attr("xmlns", NFE_NAMESPACE)
            .attr("Id", "ID1")
            .leaf("xServ", "INUTILIZAR");
        sign_enveloped(&mut root, "ID1", &cert()).unwrap();
        assert_eq!(root.child_elements().last().unwrap().name, "Signature");
        assert!(verify_enveloped(&root).is_ok());
    }

    #[test]
    fn unsigned_document_has_no_signature() {
        assert_eq!(
            verify_enveloped(&nfe("NFe1", "x")),
            Err(VerifyError::NoSignature)
        );
    }

    // ── Document signing ─────────────────────────────────────────────

    #[test]
    fn sign_document_moves_draft_to_signed() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = crate::test_support::loaded_store(dir.path());
        let mut doc = draft();
        sign_document(&mut doc, &store).unwrap();
        assert_eq!(doc.state(), DocumentState::Signed);
        assert!(verify_enveloped(doc.xml()).is_ok());
    }

    #[test]
    fn wrong_password_then_sign_fails_with_no_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pkcs12(dir.path(), "X", -1, 30);
        let store = CertificateStore::new();
        assert_eq!(
            store.load(&path, "senha-errada").unwrap_err(),
            CertificateError::WrongPassword
        );
        let mut doc = draft();
        let err = sign_document(&mut doc, &store).unwrap_err();
        assert!(matches!(err, SignError::NoCertificate(CertificateError::NotLoaded)));
        assert_eq!(doc.state(), DocumentState::Draft);
        assert!(verify_enveloped(doc.xml()).is_err());
    }

    #[test]
    fn expired_certificate_cannot_sign() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pkcs12(dir.path(), "X", -30, 10);
        let store = CertificateStore::new();
        store.load(&path, TEST_PASSWORD).unwrap();
        let err = sign_document(&mut draft(), &store).unwrap_err();
        assert!(matches!(
            err,
            SignError::NoCertificate(CertificateError::Expired { .. })
        ));
    }

    #[test]
    fn signing_non_draft_fails_before_certificate_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = crate::test_support::loaded_store(dir.path());
        let mut doc = draft();
        sign_document(&mut doc, &store).unwrap();
        // An empty store would report NoCertificate if consulted.
        let empty = CertificateStore::new();
        assert!(matches!(
            sign_document(&mut doc, &empty),
            Err(SignError::InvalidState(LifecycleError::InvalidTransition { .. }))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn any_byte_change_in_signed_text_is_detected(
            product in "[A-Za-z0-9 ]{1,40}",
            replacement in "[A-Za-z0-9]",
        ) {
            let mut root = nfe("NFe1", &product);
            sign_enveloped(&mut root, "NFe1", &cert()).unwrap();
            prop_assert!(verify_enveloped(&root).is_ok());

            let mut changed = product.clone();
            let original = changed.remove(0);
            prop_assume!(replacement.chars().next() != Some(original));
            changed.insert_str(0, &replacement);

            let mut tampered = root.clone();
            let prod_path = tampered
                .locate(&|e| e.local_name() == "xProd")
                .unwrap();
            let prod = tampered.element_at_mut(&prod_path).unwrap();
            prod.children = vec![XmlNode::Text(changed)];
            let is_digest_mismatch = matches!(
                verify_enveloped(&tampered),
                Err(VerifyError::DigestMismatch { .. })
            );
            prop_assert!(is_digest_mismatch);
        }
    }
}
