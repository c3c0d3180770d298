//! # nfe-crypto — Certificates and XML Signatures
//!
//! Provides the cryptographic building blocks of the issuance pipeline:
//!
//! - **Certificate Store** (`certificate.rs`): loads an A1 PKCS#12 bundle,
//!   caches the parsed key and certificate, and re-checks the validity
//!   window on every use.
//! - **SHA-256** digests computed from `CanonicalXml` only (`digest.rs`).
//! - **XML-DSig** enveloped signatures with exclusive canonicalization and
//!   RSA-SHA256, plus the matching verifier (`xmldsig.rs`).
//!
//! ## Crate Policy
//!
//! - Depends only on `nfe-core` and `nfe-state` internally.
//! - No mocking of cryptographic operations in tests: fixtures are real
//!   RSA keys and self-signed X.509 certificates generated with OpenSSL.
//! - Key material never appears in `Debug` output or logs.

pub mod certificate;
pub mod digest;
pub mod xmldsig;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use certificate::{Certificate, CertificateError, CertificateStore};
pub use digest::{sha256_base64, sha256_digest};
pub use xmldsig::{
    sign_document, sign_enveloped, verify_enveloped, SignError, VerifiedSignature, VerifyError,
};
