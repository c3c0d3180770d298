//! Transport error types.
//!
//! An answer from the authority, whatever its status code, is never an
//! error here. These variants cover failing to obtain an answer.

use nfe_core::{Environment, Uf};
use nfe_crypto::CertificateError;
use thiserror::Error;

use crate::endpoint::Service;

#[derive(Debug, Error)]
pub enum TransportError {
    /// No endpoint is known for the state.
    #[error("no {service} endpoint for {uf} in {environment}")]
    UnsupportedJurisdiction {
        uf: Uf,
        environment: Environment,
        service: Service,
    },

    /// The overall budget for one submission elapsed.
    #[error("authority call exceeded its {budget_ms} ms budget")]
    Timeout { budget_ms: u64 },

    /// Connect, reset or per-request timeout.
    #[error("connection to {endpoint} failed: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The TLS handshake was refused, typically an untrusted or expired
    /// client certificate.
    #[error("TLS handshake with {endpoint} rejected: {message}")]
    Tls { endpoint: String, message: String },

    /// Non-2xx answer without a SOAP fault.
    #[error("authority {endpoint} returned HTTP {status}: {body}")]
    HttpStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The request was refused at the SOAP layer.
    #[error("authority {endpoint} returned a SOAP fault: {reason}")]
    SoapFault { endpoint: String, reason: String },

    /// The body is not a recognizable result message.
    #[error("unreadable response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    /// The client identity could not be produced from the certificate.
    #[error("client certificate: {0}")]
    Certificate(#[from] CertificateError),

    /// Client construction or configuration failed.
    #[error("transport setup failed: {0}")]
    Setup(String),
}

impl TransportError {
    /// Failures worth another attempt: connection trouble, server-side
    /// errors, throttling, and an exhausted budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Whether the authority may still hold an answer for the request.
    /// Retryable failures and unreadable bodies leave the outcome open; a
    /// TLS rejection, a 4xx answer, a SOAP fault or a missing endpoint mean
    /// the request was refused or never sent.
    pub fn outcome_unknown(&self) -> bool {
        self.is_retryable() || matches!(self, Self::MalformedResponse { .. })
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedJurisdiction { .. } => "unsupported_jurisdiction",
            Self::Timeout { .. } => "timeout",
            Self::Connection { .. } => "connection",
            Self::Tls { .. } => "tls",
            Self::HttpStatus { .. } => "http_status",
            Self::SoapFault { .. } => "soap_fault",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Certificate(_) => "certificate",
            Self::Setup(_) => "setup",
        }
    }
}

/// Classify a `reqwest` failure. Handshake failures caused by the
/// certificate are terminal; everything else at this layer is a connection
/// problem.
pub(crate) fn classify(endpoint: &str, source: reqwest::Error) -> TransportError {
    if let Some(message) = tls_rejection(&source) {
        return TransportError::Tls {
            endpoint: endpoint.to_string(),
            message,
        };
    }
    TransportError::Connection {
        endpoint: endpoint.to_string(),
        source,
    }
}

fn tls_rejection(error: &reqwest::Error) -> Option<String> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = current {
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("handshake") {
            return Some(e.to_string());
        }
        current = e.source();
    }
    None
}
