//! # Transmission Result — Normalized Authority Response
//!
//! Every answer from the tax authority, success or not, becomes a
//! `TransmissionResult`. A non-success status is a business outcome and is
//! carried as data; only failures to obtain an answer are errors.
//!
//! ## Status classification
//!
//! | Operation        | Success            | Other                                |
//! |------------------|--------------------|--------------------------------------|
//! | authorization    | 100                | 301-303 denied, anything else rejected; 103/105 pending receipt |
//! | cancellation     | 135, 136, 155      | rejected                              |
//! | void range       | 102                | rejected                              |
//! | query            | 100 authorized     | 101/135/136/155 cancelled, 106/562 not found |
//! | status service   | 107                | offline                               |

use serde::{Deserialize, Serialize};

/// Authorization granted.
pub const STATUS_AUTHORIZED: u16 = 100;
/// Void range accepted.
pub const STATUS_VOID_ACCEPTED: u16 = 102;
/// Service in operation.
pub const STATUS_SERVICE_ONLINE: u16 = 107;

const DENIED: [u16; 3] = [301, 302, 303];
const PENDING_RECEIPT: [u16; 2] = [103, 105];
/// Cancellation event registered (plain, late, or out of deadline).
pub const CANCEL_ACCEPTED: [u16; 3] = [135, 136, 155];
const QUERY_CANCELLED: [u16; 4] = [101, 135, 136, 155];
const QUERY_NOT_FOUND: [u16; 2] = [106, 562];

/// Normalized response of one authority call. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionResult {
    /// `cStat`.
    pub status_code: u16,
    /// `xMotivo`.
    pub motive: String,
    /// `nProt`, present on authorization and accepted events.
    pub protocol: Option<String>,
    /// `chNFe` echoed by the authority.
    pub access_key: Option<String>,
    /// `dhRecbto` as sent by the authority.
    pub received_at: Option<String>,
    /// `nRec`, present on asynchronous acknowledgements.
    pub receipt: Option<String>,
    /// Response body exactly as received.
    pub raw_response: String,
}

/// Classification of an authorization response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationOutcome {
    Authorized,
    /// Batch received; the result must be fetched with the receipt.
    PendingReceipt,
    /// Denied use (irregular issuer or recipient).
    Denied,
    Rejected,
}

impl AuthorizationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorized => "authorized",
            Self::PendingReceipt => "pending_receipt",
            Self::Denied => "denied",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for AuthorizationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a protocol query response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryOutcome {
    Authorized,
    Cancelled,
    NotFound,
    Other(u16),
}

impl TransmissionResult {
    pub fn authorization_outcome(&self) -> AuthorizationOutcome {
        match self.status_code {
            STATUS_AUTHORIZED => AuthorizationOutcome::Authorized,
            c if PENDING_RECEIPT.contains(&c) => AuthorizationOutcome::PendingReceipt,
            c if DENIED.contains(&c) => AuthorizationOutcome::Denied,
            _ => AuthorizationOutcome::Rejected,
        }
    }

    pub fn cancellation_accepted(&self) -> bool {
        CANCEL_ACCEPTED.contains(&self.status_code)
    }

    pub fn void_range_accepted(&self) -> bool {
        self.status_code == STATUS_VOID_ACCEPTED
    }

    pub fn query_outcome(&self) -> QueryOutcome {
        match self.status_code {
            STATUS_AUTHORIZED => QueryOutcome::Authorized,
            c if QUERY_CANCELLED.contains(&c) => QueryOutcome::Cancelled,
            c if QUERY_NOT_FOUND.contains(&c) => QueryOutcome::NotFound,
            c => QueryOutcome::Other(c),
        }
    }

    pub fn service_online(&self) -> bool {
        self.status_code == STATUS_SERVICE_ONLINE
    }
}

impl std::fmt::Display for TransmissionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.status_code, self.motive)?;
        if let Some(p) = &self.protocol {
            write!(f, " (protocol {p})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(code: u16) -> TransmissionResult {
        TransmissionResult {
            status_code: code,
            motive: "motivo".into(),
            protocol: None,
            access_key: None,
            received_at: None,
            receipt: None,
            raw_response: String::new(),
        }
    }

    #[test]
    fn authorization_classes() {
        assert_eq!(result(100).authorization_outcome(), AuthorizationOutcome::Authorized);
        assert_eq!(result(103).authorization_outcome(), AuthorizationOutcome::PendingReceipt);
        assert_eq!(result(105).authorization_outcome(), AuthorizationOutcome::PendingReceipt);
        for c in [301, 302, 303] {
            assert_eq!(result(c).authorization_outcome(), AuthorizationOutcome::Denied);
        }
        for c in [102, 110, 204, 539, 656, 999] {
            assert_eq!(result(c).authorization_outcome(), AuthorizationOutcome::Rejected);
        }
    }

    #[test]
    fn event_classes() {
        assert!(result(135).cancellation_accepted());
        assert!(result(155).cancellation_accepted());
        assert!(!result(573).cancellation_accepted());
        assert!(result(102).void_range_accepted());
        assert!(!result(100).void_range_accepted());
        assert!(result(107).service_online());
        assert!(!result(108).service_online());
    }

    #[test]
    fn query_classes() {
        assert_eq!(result(100).query_outcome(), QueryOutcome::Authorized);
        assert_eq!(result(101).query_outcome(), QueryOutcome::Cancelled);
        assert_eq!(result(562).query_outcome(), QueryOutcome::NotFound);
        assert_eq!(result(217).query_outcome(), QueryOutcome::Other(217));
    }

    #[test]
    fn display_includes_protocol() {
        let mut r = result(100);
        r.motive = "Autorizado o uso da NF-e".into();
        r.protocol = Some("135240000000001".into());
        assert_eq!(r.to_string(), "[100] Autorizado o uso da NF-e (protocol 135240000000001)");
    }
}
