//! Transport configuration.
//!
//! Defaults follow the authority's guidance: a 30 s budget per submission,
//! three retries with 200 ms doubling backoff.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::endpoint::{EndpointOverride, EndpointTable};
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Overall budget for one operation, retries and receipt polling
    /// included.
    pub timeout_ms: u64,
    /// Budget for a single HTTP exchange.
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay; doubles each retry.
    pub base_delay_ms: u64,
    /// Pause between receipt queries for an asynchronous batch.
    pub receipt_poll_interval_ms: u64,
    /// Extra trusted roots (PEM bundle), e.g. the ICP-Brasil chain.
    pub ca_bundle: Option<PathBuf>,
    /// Route every service to `{base_url}/{wsdl}` instead of the table.
    pub base_url: Option<String>,
    pub endpoints: Vec<EndpointOverride>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            request_timeout_ms: 15_000,
            connect_timeout_ms: 10_000,
            max_retries: 3,
            base_delay_ms: 200,
            receipt_poll_interval_ms: 1_000,
            ca_bundle: None,
            base_url: None,
            endpoints: Vec::new(),
        }
    }
}

impl TransportConfig {
    /// Every service routed to one local server with short timeouts, for
    /// tests against a stubbed authority.
    pub fn local_mock(base_url: &str) -> Self {
        Self {
            timeout_ms: 5_000,
            request_timeout_ms: 2_000,
            connect_timeout_ms: 1_000,
            base_delay_ms: 10,
            receipt_poll_interval_ms: 10,
            base_url: Some(base_url.to_string()),
            ..Self::default()
        }
    }

    /// The endpoint table this configuration describes.
    pub fn endpoint_table(&self) -> Result<EndpointTable, TransportError> {
        let mut table = EndpointTable::builtin();
        if let Some(base) = &self.base_url {
            table = table.with_base(base)?;
        }
        for entry in &self.endpoints {
            table = table.with_override(entry)?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Service;
    use nfe_core::{Environment, Uf};

    #[test]
    fn test_defaults() {
        let c = TransportConfig::default();
        assert_eq!(c.timeout_ms, 30_000);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.base_delay_ms, 200);
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
timeout_ms: 10000
endpoints:
  - uf: SP
    environment: homologation
    service: status
    url: "https://sefaz.test/status"
"#;
        let c: TransportConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.timeout_ms, 10_000);
        assert_eq!(c.max_retries, 3);
        let table = c.endpoint_table().unwrap();
        let url = table
            .resolve(Uf::SP, Environment::Homologation, Service::Status)
            .unwrap();
        assert_eq!(url.as_str(), "https://sefaz.test/status");
    }

    #[test]
    fn test_invalid_override_is_a_setup_error() {
        let c = TransportConfig {
            base_url: Some("not a url".into()),
            ..TransportConfig::default()
        };
        assert!(matches!(c.endpoint_table(), Err(TransportError::Setup(_))));
    }
}
