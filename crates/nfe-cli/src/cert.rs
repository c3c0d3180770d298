//! # Certificate Subcommand
//!
//! Loads the configured PKCS#12 bundle and prints what the signer and the
//! TLS client will present. Nothing is sent anywhere.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};

use nfe_crypto::{Certificate, CertificateStore};

#[derive(Args, Debug)]
pub struct CertArgs {
    #[command(subcommand)]
    pub command: CertCommand,
}

#[derive(Subcommand, Debug)]
pub enum CertCommand {
    /// Show subject, validity and fingerprint of the configured
    /// certificate. Exits non-zero when it is not currently valid.
    Info,
}

pub fn run_cert(args: &CertArgs, config: &Path) -> Result<u8> {
    match args.command {
        CertCommand::Info => run_info(config),
    }
}

fn run_info(config: &Path) -> Result<u8> {
    let config = crate::load_config(config)?;
    let store = CertificateStore::new();
    let certificate = store
        .load(&config.certificate.path, &config.certificate.password)
        .with_context(|| format!("loading {}", config.certificate.path.display()))?;
    print_info(&certificate)?;

    let now = Utc::now();
    match certificate.validate(now) {
        Ok(()) => {
            println!("  Valid:       yes ({} days remaining)", certificate.days_remaining(now));
            if let Some(cnpj) = certificate.holder_cnpj() {
                if cnpj != config.issuer.cnpj.as_str() {
                    tracing::warn!(holder = %cnpj, issuer = config.issuer.cnpj.as_str(), "certificate holder differs from issuer");
                }
            }
            Ok(0)
        }
        Err(e) => {
            println!("  Valid:       no ({e})");
            Ok(1)
        }
    }
}

fn print_info(certificate: &Certificate) -> Result<()> {
    println!("Certificate");
    println!("  Subject:     {}", certificate.subject());
    println!("  Issuer:      {}", certificate.issuer());
    println!("  Serial:      {}", certificate.serial());
    println!("  Not before:  {}", certificate.not_before().to_rfc3339());
    println!("  Not after:   {}", certificate.not_after().to_rfc3339());
    if let Some(cnpj) = certificate.holder_cnpj() {
        println!("  Holder CNPJ: {cnpj}");
    }
    println!("  SHA-256:     {}", certificate.thumbprint()?);
    Ok(())
}
