//! # SHA-256 Digest Computation
//!
//! Computes SHA-256 digests exclusively from `CanonicalXml`, so every
//! `DigestValue` in a signature flows through exclusive canonicalization.
//!
//! ## Security Invariant
//!
//! `sha256_digest(data: &CanonicalXml)` makes it a compile error to digest
//! serializer output directly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use nfe_core::CanonicalXml;
use sha2::{Digest, Sha256};

/// SHA-256 over canonical bytes.
pub fn sha256_digest(data: &CanonicalXml) -> [u8; 32] {
    let hash = Sha256::digest(data.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hash);
    bytes
}

/// SHA-256 over canonical bytes, base64 encoded as in `DigestValue`.
pub fn sha256_base64(data: &CanonicalXml) -> String {
    STANDARD.encode(sha256_digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfe_core::XmlElement;

    #[test]
    fn digest_of_known_input() {
        let el = XmlElement::new("a").text("b");
        let c14n = CanonicalXml::exclusive(&el, &[]);
        assert_eq!(c14n.as_str(), "<a>b</a>");
        // echo -n '<a>b</a>' | sha256sum
        assert_eq!(
            hex::encode(sha256_digest(&c14n)),
            "f1bcf55ede4b89962b411213bcbd1918f3e1659d786c1aff20fd5bd89fbcae70"
        );
    }

    #[test]
    fn base64_is_44_chars() {
        let el = XmlElement::new("infNFe").attr("Id", "NFe1");
        let b64 = sha256_base64(&CanonicalXml::exclusive(&el, &[]));
        assert_eq!(b64.len(), 44);
        assert!(b64.ends_with('='));
    }

    #[test]
    fn equal_canonical_forms_share_digest() {
        let a = XmlElement::parse("<r b=\"2\" a=\"1\"><c/></r>").unwrap();
        let b = XmlElement::parse("<r a=\"1\" b=\"2\"><c></c></r>").unwrap();
        assert_eq!(
            sha256_digest(&CanonicalXml::exclusive(&a, &[])),
            sha256_digest(&CanonicalXml::exclusive(&b, &[]))
        );
    }
}
