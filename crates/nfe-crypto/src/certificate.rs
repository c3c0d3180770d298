//! # Certificate Store — PKCS#12 Signing Certificates
//!
//! Loads an A1 certificate bundle (PKCS#12) and exposes the private key and
//! leaf certificate to the signer and the transport client.
//!
//! ## Caching
//!
//! The store keeps the last successfully loaded certificate keyed by the
//! bundle path and a SHA-256 fingerprint of the passphrase. Loading the same
//! source again returns the cached value without touching the file. Loading
//! a different source replaces the cache; a failed load clears it, so a bad
//! configuration never leaves the previous certificate in service.
//!
//! ## Validity
//!
//! The validity window is checked on every [`CertificateStore::current`]
//! call, since time advances while the cache does not.
//!
//! ## Concurrency
//!
//! Single writer, many readers: a `parking_lot::RwLock` guards an
//! `Option<Arc<..>>`. Readers clone the `Arc` and release the lock before
//! using the certificate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::sign::{Signer, Verifier};
use openssl::x509::{X509NameRef, X509};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

// ─── Errors ──────────────────────────────────────────────────────────

/// Certificate loading and validity failures.
///
/// Fatal to signing and to mutual TLS; recovered by operator action, never
/// retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    /// The bundle could not be read or is not PKCS#12.
    #[error("certificate bundle unreadable: {0}")]
    Unreadable(String),

    /// The passphrase does not open the bundle.
    #[error("wrong certificate passphrase")]
    WrongPassword,

    /// The bundle opened but lacks the private key or the leaf certificate.
    #[error("certificate bundle has no {0}")]
    MissingKeyOrCert(&'static str),

    /// `now` is after `notAfter`.
    #[error("certificate expired at {not_after}")]
    Expired {
        /// End of the validity window.
        not_after: DateTime<Utc>,
    },

    /// `now` is before `notBefore`.
    #[error("certificate not valid before {not_before}")]
    NotYetValid {
        /// Start of the validity window.
        not_before: DateTime<Utc>,
    },

    /// Nothing has been loaded, or the last load failed.
    #[error("no certificate loaded")]
    NotLoaded,

    /// OpenSSL failure while using the key or certificate.
    #[error("certificate operation failed: {0}")]
    Crypto(String),
}

fn crypto(e: openssl::error::ErrorStack) -> CertificateError {
    CertificateError::Crypto(e.to_string())
}

// ─── Certificate ─────────────────────────────────────────────────────

/// A signing certificate: private key, leaf certificate and any chain
/// certificates carried by the bundle. Read-only after load.
pub struct Certificate {
    key: PKey<Private>,
    cert: X509,
    chain: Vec<X509>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    subject: String,
    issuer: String,
    serial: String,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("serial", &self.serial)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl Certificate {
    /// Open a DER-encoded PKCS#12 bundle.
    pub fn from_pkcs12_der(der: &[u8], password: &str) -> Result<Self, CertificateError> {
        let bundle = Pkcs12::from_der(der)
            .map_err(|e| CertificateError::Unreadable(format!("not a PKCS#12 bundle: {e}")))?;
        let parsed = bundle.parse2(password).map_err(classify_parse_error)?;
        let key = parsed
            .pkey
            .ok_or(CertificateError::MissingKeyOrCert("private key"))?;
        let cert = parsed
            .cert
            .ok_or(CertificateError::MissingKeyOrCert("certificate"))?;
        let chain = parsed
            .ca
            .map(|stack| stack.into_iter().collect())
            .unwrap_or_default();
        Self::from_parts(key, cert, chain)
    }

    fn from_parts(
        key: PKey<Private>,
        cert: X509,
        chain: Vec<X509>,
    ) -> Result<Self, CertificateError> {
        let not_before = asn1_to_utc(cert.not_before())?;
        let not_after = asn1_to_utc(cert.not_after())?;
        let subject = name_to_string(cert.subject_name());
        let issuer = name_to_string(cert.issuer_name());
        let serial = cert
            .serial_number()
            .to_bn()
            .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))
            .map_err(crypto)?;
        Ok(Self {
            key,
            cert,
            chain,
            not_before,
            not_after,
            subject,
            issuer,
            serial,
        })
    }

    /// Check `now` against `[notBefore, notAfter]`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), CertificateError> {
        if now < self.not_before {
            return Err(CertificateError::NotYetValid {
                not_before: self.not_before,
            });
        }
        if now > self.not_after {
            return Err(CertificateError::Expired {
                not_after: self.not_after,
            });
        }
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serial number in hex.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Whole days until `notAfter`, negative once expired.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.not_after - now).num_days()
    }

    /// Company tax ID from an ICP-Brasil subject CN (`NAME:14DIGITS`).
    pub fn holder_cnpj(&self) -> Option<String> {
        let cn = self
            .cert
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()?
            .data()
            .as_utf8()
            .ok()?
            .to_string();
        let digits = cn.rsplit(':').next()?;
        (digits.len() == 14 && digits.bytes().all(|b| b.is_ascii_digit()))
            .then(|| digits.to_string())
    }

    /// Leaf certificate, DER.
    pub fn certificate_der(&self) -> Result<Vec<u8>, CertificateError> {
        self.cert.to_der().map_err(crypto)
    }

    /// Leaf certificate, base64 DER as in `X509Certificate`.
    pub fn certificate_base64(&self) -> Result<String, CertificateError> {
        Ok(STANDARD.encode(self.certificate_der()?))
    }

    /// SHA-256 fingerprint of the leaf certificate, hex.
    pub fn thumbprint(&self) -> Result<String, CertificateError> {
        Ok(hex::encode(Sha256::digest(self.certificate_der()?)))
    }

    /// RSA-SHA256 (PKCS#1 v1.5) signature over `data`.
    pub fn sign_sha256(&self, data: &[u8]) -> Result<Vec<u8>, CertificateError> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key).map_err(crypto)?;
        signer.update(data).map_err(crypto)?;
        signer.sign_to_vec().map_err(crypto)
    }

    /// PEM bundle (PKCS#8 key, leaf, chain) for a TLS client identity.
    /// The buffer is zeroed on drop.
    pub fn identity_pem(&self) -> Result<Zeroizing<Vec<u8>>, CertificateError> {
        let mut pem = Zeroizing::new(self.key.private_key_to_pem_pkcs8().map_err(crypto)?);
        pem.extend_from_slice(&self.cert.to_pem().map_err(crypto)?);
        for ca in &self.chain {
            pem.extend_from_slice(&ca.to_pem().map_err(crypto)?);
        }
        Ok(pem)
    }
}

/// Verify an RSA-SHA256 signature against a DER certificate's public key.
pub fn verify_sha256(cert_der: &[u8], data: &[u8], signature: &[u8]) -> Result<bool, CertificateError> {
    let cert = X509::from_der(cert_der).map_err(crypto)?;
    let key = cert.public_key().map_err(crypto)?;
    let mut verifier = Verifier::new(MessageDigest::sha256(), &key).map_err(crypto)?;
    verifier.update(data).map_err(crypto)?;
    verifier.verify(signature).map_err(crypto)
}

/// OpenSSL reports a bad passphrase as a MAC verification or decryption
/// failure. Anything else (unsupported legacy cipher, broken ASN.1 inside
/// the bundle) means the file itself cannot be used.
fn classify_parse_error(e: openssl::error::ErrorStack) -> CertificateError {
    let text = e.to_string().to_ascii_lowercase();
    if text.contains("unsupported") {
        CertificateError::Unreadable(format!("unsupported bundle encryption: {e}"))
    } else if ["mac verify", "bad decrypt", "decrypt error"]
        .iter()
        .any(|needle| text.contains(needle))
    {
        CertificateError::WrongPassword
    } else {
        CertificateError::Unreadable(format!("corrupt PKCS#12 bundle: {e}"))
    }
}

fn asn1_to_utc(t: &Asn1TimeRef) -> Result<DateTime<Utc>, CertificateError> {
    let epoch = Asn1Time::from_unix(0).map_err(crypto)?;
    let diff = epoch.diff(t).map_err(crypto)?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| CertificateError::Crypto(format!("certificate time out of range: {t}")))
}

fn name_to_string(name: &X509NameRef) -> String {
    name.entries()
        .filter_map(|entry| {
            let field = entry.object().nid().short_name().ok()?;
            let value = entry.data().as_utf8().ok()?;
            Some(format!("{field}={value}"))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ─── Store ───────────────────────────────────────────────────────────

struct Loaded {
    path: PathBuf,
    password_fingerprint: [u8; 32],
    certificate: Arc<Certificate>,
}

/// Process-wide holder of the signing certificate.
///
/// Construct once and share by `Arc`; see the module docs for the caching
/// and concurrency rules.
#[derive(Default)]
pub struct CertificateStore {
    slot: RwLock<Option<Loaded>>,
}

impl std::fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.slot.read();
        f.debug_struct("CertificateStore")
            .field("path", &guard.as_ref().map(|l| l.path.clone()))
            .finish()
    }
}

impl CertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the bundle at `path`, or return the cached certificate when
    /// `path` and `password` match the last successful load.
    pub fn load(&self, path: &Path, password: &str) -> Result<Arc<Certificate>, CertificateError> {
        let fingerprint = fingerprint(password);
        if let Some(loaded) = self.slot.read().as_ref() {
            if loaded.path == path && loaded.password_fingerprint == fingerprint {
                return Ok(Arc::clone(&loaded.certificate));
            }
        }

        let mut slot = self.slot.write();
        // Another writer may have loaded the same source meanwhile.
        if let Some(loaded) = slot.as_ref() {
            if loaded.path == path && loaded.password_fingerprint == fingerprint {
                return Ok(Arc::clone(&loaded.certificate));
            }
        }
        *slot = None;

        let der = Zeroizing::new(std::fs::read(path).map_err(|e| {
            CertificateError::Unreadable(format!("{}: {e}", path.display()))
        })?);
        let certificate = Arc::new(Certificate::from_pkcs12_der(&der, password)?);
        tracing::info!(
            subject = certificate.subject(),
            not_after = %certificate.not_after(),
            path = %path.display(),
            "signing certificate loaded"
        );
        *slot = Some(Loaded {
            path: path.to_path_buf(),
            password_fingerprint: fingerprint,
            certificate: Arc::clone(&certificate),
        });
        Ok(certificate)
    }

    /// The cached certificate, validated against the current time.
    pub fn current(&self) -> Result<Arc<Certificate>, CertificateError> {
        self.current_at(Utc::now())
    }

    /// The cached certificate, validated against `now`.
    pub fn current_at(&self, now: DateTime<Utc>) -> Result<Arc<Certificate>, CertificateError> {
        let certificate = self
            .slot
            .read()
            .as_ref()
            .map(|l| Arc::clone(&l.certificate))
            .ok_or(CertificateError::NotLoaded)?;
        certificate.validate(now)?;
        Ok(certificate)
    }

    /// Drop the cached certificate. The next `current` fails until a new
    /// `load` succeeds.
    pub fn invalidate(&self) {
        if self.slot.write().take().is_some() {
            tracing::info!("signing certificate invalidated");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.read().is_some()
    }
}

fn fingerprint(password: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(password.as_bytes()));
    out
}
