//! # nfe-sefaz — Authority Transport
//!
//! Talks to the state tax authorities' SOAP 1.2 web services over mutual
//! TLS. The client presents the loaded certificate, wraps each payload in
//! the mandated envelope, retries transient failures with backoff and
//! normalizes every answer into a [`TransmissionResult`].
//!
//! ## Design
//!
//! - **Endpoints** (`endpoint.rs`): a static table keyed by state,
//!   environment and service, with a base-URL redirect and per-entry
//!   overrides from configuration.
//! - **Envelope** (`envelope.rs`): request wrapping and response parsing.
//! - **Retry** (`retry.rs`): exponential backoff for retryable failures
//!   only. The overall budget lives in the client.
//! - **Client** (`client.rs`): one explicit, injectable value per
//!   certificate. There is no process-wide client.
//!
//! ## Crate Policy
//!
//! - A rejection from the authority is a normal result, never an error.
//!   [`TransportError`] means no usable answer was obtained.
//! - Payloads are serialized exactly as given. Signing happens upstream.
//!
//! [`TransmissionResult`]: nfe_core::TransmissionResult

pub mod client;
pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub(crate) mod retry;

pub use client::SefazClient;
pub use config::TransportConfig;
pub use endpoint::{Authority, EndpointOverride, EndpointTable, Service};
pub use error::TransportError;
