//! # Pipeline Configuration
//!
//! One YAML file describes an issuing installation:
//!
//! ```yaml
//! environment: homologation
//! series: 1
//! issuer: { cnpj: "11222333000181", name: "...", ... }
//! certificate:
//!   path: /etc/nfe/certificado.pfx
//!   password: ""            # or NFE_CERT_PASSWORD
//! storage:
//!   artifact_root: /var/lib/nfe/xml
//!   sequence_dir: /var/lib/nfe/sequence
//!   database_url: sqlite:///var/lib/nfe/lifecycle.db
//! transport: { timeout_ms: 30000, max_retries: 3 }
//! builder: { operation_nature: Venda }
//! ```
//!
//! The certificate passphrase is never logged. `Debug` redacts it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use nfe_builder::BuilderConfig;
use nfe_core::{Environment, Issuer, SequenceKey, Series};
use nfe_schema::ValidatorConfig;
use nfe_sefaz::TransportConfig;

use crate::error::PipelineError;

/// Environment variable overriding `certificate.password`.
pub const PASSWORD_ENV: &str = "NFE_CERT_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub environment: Environment,
    /// Series used when the caller names none.
    #[serde(default = "default_series")]
    pub series: Series,
    /// Issuer profile applied to every document.
    pub issuer: Issuer,
    pub certificate: CertificateConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub builder: BuilderConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
}

fn default_series() -> Series {
    Series::new(1).unwrap_or_else(|_| unreachable!("1 is a valid series"))
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// PKCS#12 bundle.
    pub path: PathBuf,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for CertificateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateConfig")
            .field("path", &self.path)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub artifact_root: PathBuf,
    pub sequence_dir: PathBuf,
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("xml"),
            sequence_dir: PathBuf::from("sequence"),
            database_url: "sqlite://nfe-lifecycle.db".into(),
        }
    }
}

impl PipelineConfig {
    /// Parse YAML and apply the environment override.
    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        let mut config: Self =
            serde_yaml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.certificate.password = password;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.builder.validate()?;
        if self.certificate.path.as_os_str().is_empty() {
            return Err(PipelineError::Config("certificate.path is empty".into()));
        }
        if self.transport.timeout_ms == 0 {
            return Err(PipelineError::Config("transport.timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn sequence_key(&self, series: Option<Series>) -> SequenceKey {
        SequenceKey::new(series.unwrap_or(self.series), self.environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
environment: homologation
issuer:
  cnpj: "11.222.333/0001-81"
  name: EMPRESA TESTE LTDA
  state_registration: "110042490114"
  tax_regime: 3
  address:
    street: Rua Teste
    number: "100"
    district: Centro
    city_code: "3550308"
    city: Sao Paulo
    uf: SP
    postal_code: "01001000"
certificate:
  path: /etc/nfe/cert.pfx
  password: secret-pass
transport:
  timeout_ms: 10000
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config: PipelineConfig = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(config.environment, Environment::Homologation);
        assert_eq!(config.series.get(), 1);
        assert_eq!(config.issuer.cnpj.as_str(), "11222333000181");
        assert_eq!(config.transport.timeout_ms, 10_000);
        assert_eq!(config.transport.max_retries, 3);
        assert_eq!(config.builder.operation_nature, "Venda");
        assert_eq!(config.storage.sequence_dir, PathBuf::from("sequence"));
        config.validate().unwrap();
    }

    #[test]
    fn test_debug_redacts_password() {
        let config: PipelineConfig = serde_yaml::from_str(YAML).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-pass"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_invalid_builder_defaults_rejected() {
        let mut config: PipelineConfig = serde_yaml::from_str(YAML).unwrap();
        config.builder.utc_offset = "not an offset".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shipped_example_parses() {
        let text = include_str!("../../../config/nfe.example.yaml");
        let config: PipelineConfig = serde_yaml::from_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(config.storage.database_url, "sqlite:///var/lib/nfe/lifecycle.db");
        assert_eq!(config.transport.base_delay_ms, 200);
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        assert!(matches!(
            PipelineConfig::from_yaml("environment: [unclosed"),
            Err(PipelineError::Config(_))
        ));
    }
}
