//! Self-signed PKCS#12 fixtures for tests.
//!
//! Compiled for this crate's tests and, through the `test-support` feature,
//! for dependent crates' tests. Panics on failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509NameBuilder};

use crate::certificate::{Certificate, CertificateStore};

/// Passphrase used by [`write_pkcs12`].
pub const TEST_PASSWORD: &str = "nfe-test-1234";

/// Subject CN in the ICP-Brasil `NAME:CNPJ` form.
pub const TEST_SUBJECT: &str = "EMPRESA TESTE LTDA:11222333000181";

/// A DER PKCS#12 bundle with a fresh RSA-2048 key and a self-signed
/// certificate valid from `now + not_before_days` for `valid_days`.
pub fn generate_pkcs12(cn: &str, password: &str, not_before_days: i64, valid_days: i64) -> Vec<u8> {
    let rsa = Rsa::generate(2048).expect("rsa keygen");
    let pkey = PKey::from_rsa(rsa).expect("pkey");

    let mut name = X509NameBuilder::new().expect("name builder");
    name.append_entry_by_nid(Nid::COMMONNAME, cn).expect("cn");
    name.append_entry_by_text("O", "ICP-Brasil").expect("o");
    let name = name.build();

    let now = Utc::now().timestamp();
    let not_before = Asn1Time::from_unix(now + not_before_days * 86_400).expect("not before");
    let not_after =
        Asn1Time::from_unix(now + (not_before_days + valid_days) * 86_400).expect("not after");

    let mut builder = X509Builder::new().expect("x509 builder");
    builder.set_version(2).expect("version");
    let serial = BigNum::from_u32(rand_serial())
        .and_then(|bn| bn.to_asn1_integer())
        .expect("serial");
    builder.set_serial_number(&serial).expect("serial");
    builder.set_subject_name(&name).expect("subject");
    builder.set_issuer_name(&name).expect("issuer");
    builder.set_pubkey(&pkey).expect("pubkey");
    builder.set_not_before(&not_before).expect("not before");
    builder.set_not_after(&not_after).expect("not after");
    builder.sign(&pkey, MessageDigest::sha256()).expect("self-sign");
    let cert = builder.build();

    Pkcs12::builder()
        .name("nfe")
        .pkey(&pkey)
        .cert(&cert)
        .build2(password)
        .and_then(|p12| p12.to_der())
        .expect("pkcs12")
}

/// Write a bundle protected by [`TEST_PASSWORD`] into `dir`.
pub fn write_pkcs12(dir: &Path, cn: &str, not_before_days: i64, valid_days: i64) -> PathBuf {
    let der = generate_pkcs12(cn, TEST_PASSWORD, not_before_days, valid_days);
    let path = dir.join("certificate.pfx");
    std::fs::write(&path, der).expect("write pfx");
    path
}

/// A currently valid certificate.
pub fn sample_certificate() -> Arc<Certificate> {
    let der = generate_pkcs12(TEST_SUBJECT, TEST_PASSWORD, -1, 365);
    Arc::new(Certificate::from_pkcs12_der(&der, TEST_PASSWORD).expect("open pkcs12"))
}

/// A store with a currently valid certificate loaded from `dir`.
pub fn loaded_store(dir: &Path) -> (Arc<CertificateStore>, PathBuf) {
    let path = write_pkcs12(dir, TEST_SUBJECT, -1, 365);
    let store = Arc::new(CertificateStore::new());
    store.load(&path, TEST_PASSWORD).expect("load pkcs12");
    (store, path)
}

fn rand_serial() -> u32 {
    let nanos = Utc::now().timestamp_subsec_nanos();
    nanos.max(1)
}
