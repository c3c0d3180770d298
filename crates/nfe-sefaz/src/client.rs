//! # Authority Client
//!
//! One `SefazClient` per certificate. It holds a connection pool presenting
//! the certificate for mutual TLS and is `Send + Sync`; clone it or share
//! it behind an `Arc` across concurrent issuances. Rebuild it when the
//! certificate store is reloaded.
//!
//! Every public operation runs under the overall budget from
//! [`TransportConfig::timeout_ms`]. Retries and receipt polling count
//! against the same budget; when it elapses the call fails with
//! [`TransportError::Timeout`].

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use url::Url;
use zeroize::Zeroizing;

use nfe_builder::payload;
use nfe_core::{AccessKey, AuthorizationOutcome, Environment, TransmissionResult, Uf, XmlElement};
use nfe_crypto::Certificate;

use crate::config::TransportConfig;
use crate::endpoint::{EndpointTable, Service};
use crate::envelope::{content_type, envelope, fault_reason, parse_response};
use crate::error::{classify, TransportError};
use crate::retry::{retry_send, RetryPolicy};

/// Receipt status meaning "batch still being processed".
const RECEIPT_IN_PROCESS: u16 = 105;

#[derive(Debug, Clone)]
pub struct SefazClient {
    http: reqwest::Client,
    endpoints: EndpointTable,
    config: TransportConfig,
}

impl SefazClient {
    /// Build a client presenting `certificate` as its TLS identity.
    pub fn new(config: TransportConfig, certificate: &Certificate) -> Result<Self, TransportError> {
        let pem = certificate.identity_pem()?;
        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| TransportError::Setup(format!("client identity: {e}")))?;

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms));
        if let Some(path) = &config.ca_bundle {
            for root in load_roots(path)? {
                builder = builder.add_root_certificate(root);
            }
        }
        let http = builder
            .build()
            .map_err(|e| TransportError::Setup(format!("HTTP client: {e}")))?;

        let endpoints = config.endpoint_table()?;
        tracing::debug!(
            subject = certificate.subject(),
            timeout_ms = config.timeout_ms,
            max_retries = config.max_retries,
            "authority client ready"
        );
        Ok(Self {
            http,
            endpoints,
            config,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// The URL that `service` resolves to for `uf`.
    pub fn endpoint(&self, uf: Uf, environment: Environment, service: Service) -> Result<Url, TransportError> {
        self.endpoints.resolve(uf, environment, service)
    }

    // ─── Operations ──────────────────────────────────────────────────

    /// Submit one signed `NFe`. An asynchronous acknowledgement is
    /// followed by receipt queries until a final answer or the budget ends.
    pub async fn authorize(
        &self,
        uf: Uf,
        environment: Environment,
        batch_id: u64,
        signed_nfe: &XmlElement,
    ) -> Result<TransmissionResult, TransportError> {
        self.within_budget(async {
            let batch = payload::authorization_batch(batch_id, signed_nfe);
            let first = self.call(Service::Authorize, uf, environment, &batch).await?;
            if first.authorization_outcome() != AuthorizationOutcome::PendingReceipt {
                return Ok(first);
            }
            let Some(receipt) = first.receipt.clone() else {
                return Ok(first);
            };
            tracing::info!(receipt = %receipt, c_stat = first.status_code, "batch queued, polling receipt");
            self.poll_receipt(uf, environment, &receipt).await
        })
        .await
    }

    /// Result of an asynchronous batch.
    pub async fn query_receipt(
        &self,
        uf: Uf,
        environment: Environment,
        receipt: &str,
    ) -> Result<TransmissionResult, TransportError> {
        self.within_budget(async {
            let request = payload::receipt_query(environment, receipt);
            self.call(Service::ReceiptQuery, uf, environment, &request).await
        })
        .await
    }

    /// Current situation of a document at the authority of its state.
    pub async fn query_protocol(
        &self,
        environment: Environment,
        key: &AccessKey,
    ) -> Result<TransmissionResult, TransportError> {
        let uf = key_uf(key)?;
        self.within_budget(async {
            let request = payload::protocol_query(environment, key);
            self.call(Service::Query, uf, environment, &request).await
        })
        .await
    }

    /// Send a signed `envEvento`.
    pub async fn send_event(
        &self,
        uf: Uf,
        environment: Environment,
        signed_event: &XmlElement,
    ) -> Result<TransmissionResult, TransportError> {
        self.within_budget(self.call(Service::Event, uf, environment, signed_event))
            .await
    }

    /// Send a signed `inutNFe`.
    pub async fn void_range(
        &self,
        uf: Uf,
        environment: Environment,
        signed_request: &XmlElement,
    ) -> Result<TransmissionResult, TransportError> {
        self.within_budget(self.call(Service::VoidRange, uf, environment, signed_request))
            .await
    }

    /// Service availability for `uf`.
    pub async fn status(&self, uf: Uf, environment: Environment) -> Result<TransmissionResult, TransportError> {
        self.within_budget(async {
            let request = payload::status_query(environment, uf);
            self.call(Service::Status, uf, environment, &request).await
        })
        .await
    }

    // ─── Internals ───────────────────────────────────────────────────

    async fn within_budget<T>(
        &self,
        fut: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        let budget = Duration::from_millis(self.config.timeout_ms);
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(budget_ms = self.config.timeout_ms, "authority call budget exhausted");
                Err(TransportError::Timeout {
                    budget_ms: self.config.timeout_ms,
                })
            }
        }
    }

    async fn poll_receipt(
        &self,
        uf: Uf,
        environment: Environment,
        receipt: &str,
    ) -> Result<TransmissionResult, TransportError> {
        let interval = Duration::from_millis(self.config.receipt_poll_interval_ms);
        let request = payload::receipt_query(environment, receipt);
        loop {
            tokio::time::sleep(interval).await;
            let result = self
                .call(Service::ReceiptQuery, uf, environment, &request)
                .await?;
            if result.status_code != RECEIPT_IN_PROCESS {
                return Ok(result);
            }
            tracing::debug!(receipt, "batch still in process");
        }
    }

    /// One operation with retries, no budget.
    async fn call(
        &self,
        service: Service,
        uf: Uf,
        environment: Environment,
        payload: &XmlElement,
    ) -> Result<TransmissionResult, TransportError> {
        let url = self.endpoints.resolve(uf, environment, service)?;
        let body = envelope(service, uf, payload).to_document();
        let content_type = content_type(service);
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            base_delay: Duration::from_millis(self.config.base_delay_ms),
        };

        let started = Instant::now();
        tracing::debug!(operation = service.as_str(), endpoint = %url, %uf, %environment, "calling authority");
        let result = retry_send(policy, service, || self.exchange(service, &url, &content_type, &body)).await;
        metrics::histogram!("nfe_submission_duration_seconds", "operation" => service.as_str())
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(r) => tracing::info!(
                operation = service.as_str(),
                c_stat = r.status_code,
                motive = %r.motive,
                "authority answered"
            ),
            Err(e) => tracing::warn!(operation = service.as_str(), error_kind = e.kind(), "authority call failed: {e}"),
        }
        result
    }

    /// A single HTTP exchange.
    async fn exchange(
        &self,
        service: Service,
        url: &Url,
        content_type: &str,
        body: &str,
    ) -> Result<TransmissionResult, TransportError> {
        let endpoint = url.as_str();
        let response = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, content_type)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| classify(endpoint, e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify(endpoint, e))?;
        if !status.is_success() {
            if let Some(reason) = fault_reason(&text) {
                return Err(TransportError::SoapFault {
                    endpoint: endpoint.to_string(),
                    reason,
                });
            }
            return Err(TransportError::HttpStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }
        parse_response(service, endpoint, &text)
    }
}

fn key_uf(key: &AccessKey) -> Result<Uf, TransportError> {
    key.uf_code()
        .parse::<u8>()
        .ok()
        .and_then(|code| Uf::from_ibge_code(code).ok())
        .ok_or_else(|| TransportError::Setup(format!("access key {key} has an unknown state code")))
}

/// Certificates from a PEM bundle.
fn load_roots(path: &std::path::Path) -> Result<Vec<reqwest::Certificate>, TransportError> {
    let bytes = Zeroizing::new(
        std::fs::read(path)
            .map_err(|e| TransportError::Setup(format!("CA bundle {}: {e}", path.display())))?,
    );
    let text = String::from_utf8_lossy(&bytes);
    const END: &str = "-----END CERTIFICATE-----";
    text.split_inclusive(END)
        .filter(|block| block.contains("-----BEGIN CERTIFICATE-----"))
        .map(|block| {
            reqwest::Certificate::from_pem(block.trim().as_bytes())
                .map_err(|e| TransportError::Setup(format!("CA bundle {}: {e}", path.display())))
        })
        .collect()
}
