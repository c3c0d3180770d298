//! # Fiscal Document Lifecycle State Machine
//!
//! ## States
//!
//! ```text
//! Draft ──▶ Signed ──▶ Submitted ──▶ Authorized ──▶ Cancelled (terminal)
//!                        │    ▲            (event or void range)
//!                        │    │
//!                        │    └── FailedPendingRetry
//!                        ▼
//!                     Rejected (terminal)
//! ```
//!
//! `Submitted → FailedPendingRetry` is taken when the transport exhausts its
//! retry budget or the overall timeout elapses; the document keeps its
//! signature and may be resubmitted. No other transitions are legal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use nfe_core::{
    AccessKey, AuthorizationOutcome, DocumentNumber, Environment, Issuer, LineItem, Recipient,
    Series, Timestamp, Totals, TransmissionResult, XmlElement,
};

use crate::event::{CancellationEvent, VoidRange};

// ─── Document State ──────────────────────────────────────────────────

/// The lifecycle state of a fiscal document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentState {
    /// Built, not yet signed. The only editable state.
    Draft,
    /// Enveloped signature embedded.
    Signed,
    /// Handed to the transport client.
    Submitted,
    /// The authority granted its use.
    Authorized,
    /// The authority refused it (terminal).
    Rejected,
    /// Cancelled after authorization (terminal).
    Cancelled,
    /// Transport failed without an authority answer; may be resubmitted.
    FailedPendingRetry,
}

impl DocumentState {
    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition_to(self, to: DocumentState) -> bool {
        use DocumentState::*;
        matches!(
            (self, to),
            (Draft, Signed)
                | (Signed, Submitted)
                | (FailedPendingRetry, Submitted)
                | (Submitted, Authorized)
                | (Submitted, Rejected)
                | (Submitted, FailedPendingRetry)
                | (Authorized, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Signed => "SIGNED",
            Self::Submitted => "SUBMITTED",
            Self::Authorized => "AUTHORIZED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
            Self::FailedPendingRetry => "FAILED_PENDING_RETRY",
        }
    }
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentState {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "DRAFT" => Self::Draft,
            "SIGNED" => Self::Signed,
            "SUBMITTED" => Self::Submitted,
            "AUTHORIZED" => Self::Authorized,
            "REJECTED" => Self::Rejected,
            "CANCELLED" => Self::Cancelled,
            "FAILED_PENDING_RETRY" => Self::FailedPendingRetry,
            other => return Err(LifecycleError::UnknownState(other.to_string())),
        })
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors that can occur during document lifecycle transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Attempted transition is not valid from the current state.
    #[error("invalid document transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Document is in a terminal state.
    #[error("document is in terminal state {state}")]
    TerminalState {
        /// The terminal state.
        state: String,
    },

    /// Content or XML edit attempted outside `Draft`.
    #[error("document is {state} and can no longer be edited")]
    NotEditable {
        /// The current state.
        state: String,
    },

    /// An authorization response that does not settle the document
    /// (batch received, result pending).
    #[error("authority status {status_code} does not settle the document")]
    UnresolvedOutcome {
        /// `cStat` of the response.
        status_code: u16,
    },

    /// A cancellation event or void range that does not refer to this
    /// document.
    #[error("event does not apply to this document: {reason}")]
    EventMismatch {
        /// Why the event does not apply.
        reason: String,
    },

    /// The authority did not accept the cancelling event.
    #[error("event not accepted by the authority: [{status_code}] {motive}")]
    EventNotAccepted {
        /// `cStat` of the event response.
        status_code: u16,
        /// `xMotivo` of the event response.
        motive: String,
    },

    /// Persisted state name not recognized.
    #[error("unknown document state {0:?}")]
    UnknownState(String),

    /// A persisted snapshot could not be turned back into a document.
    #[error("corrupt document snapshot: {0}")]
    CorruptSnapshot(String),
}

// ─── Transition Evidence ─────────────────────────────────────────────

/// Evidence for a document lifecycle transition.
#[derive(Debug, Clone)]
pub struct TransitionEvidence {
    /// Reason for the transition.
    pub reason: String,
    /// Component or operator that initiated the transition.
    pub actor: Option<String>,
}

impl TransitionEvidence {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            actor: None,
        }
    }
}

/// Record of a document state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before the transition.
    pub from_state: DocumentState,
    /// State after the transition.
    pub to_state: DocumentState,
    /// When the transition occurred (UTC).
    pub timestamp: Timestamp,
    /// Reason for the transition.
    pub reason: String,
}

// ─── Fiscal Document ─────────────────────────────────────────────────

/// Business content of a fiscal document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub access_key: AccessKey,
    pub series: Series,
    pub number: DocumentNumber,
    pub environment: Environment,
    pub issuer: Issuer,
    pub recipient: Recipient,
    /// Items in document order.
    pub items: Vec<LineItem>,
    pub totals: Totals,
    /// Free-text operation nature (`natOp`).
    pub operation_nature: String,
    /// Emission instant.
    pub issued_at: Timestamp,
    /// Free-text notes (`infCpl`).
    pub notes: Option<String>,
}

/// Persisted form of a [`FiscalDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub content: DocumentContent,
    /// Serialized XML tree, declaration included.
    pub xml: String,
    pub state: DocumentState,
    pub created_at: Timestamp,
    pub transitions: Vec<TransitionRecord>,
    pub transmission: Option<TransmissionResult>,
    pub cancellation: Option<TransmissionResult>,
}

/// The aggregate root: content, its XML tree, lifecycle state and history.
#[derive(Debug, Clone)]
pub struct FiscalDocument {
    content: DocumentContent,
    xml: XmlElement,
    state: DocumentState,
    created_at: Timestamp,
    transitions: Vec<TransitionRecord>,
    transmission: Option<TransmissionResult>,
    cancellation: Option<TransmissionResult>,
}

impl FiscalDocument {
    /// Create a document in `Draft` from its content and XML tree.
    pub fn new_draft(content: DocumentContent, xml: XmlElement) -> Self {
        Self {
            content,
            xml,
            state: DocumentState::Draft,
            created_at: Timestamp::now(),
            transitions: Vec::new(),
            transmission: None,
            cancellation: None,
        }
    }

    /// Rebuild a document from its persisted form.
    pub fn restore(snapshot: DocumentSnapshot) -> Result<Self, LifecycleError> {
        let xml = XmlElement::parse(&snapshot.xml)
            .map_err(|e| LifecycleError::CorruptSnapshot(e.to_string()))?;
        // Resubmission sends the re-serialized tree, so it must reproduce
        // the stored bytes exactly.
        if xml.to_document() != snapshot.xml {
            return Err(LifecycleError::CorruptSnapshot(
                "stored XML does not re-serialize to the same bytes".into(),
            ));
        }
        if let Some(last) = snapshot.transitions.last() {
            if last.to_state != snapshot.state {
                return Err(LifecycleError::CorruptSnapshot(format!(
                    "state {} disagrees with last transition to {}",
                    snapshot.state, last.to_state
                )));
            }
        }
        Ok(Self {
            content: snapshot.content,
            xml,
            state: snapshot.state,
            created_at: snapshot.created_at,
            transitions: snapshot.transitions,
            transmission: snapshot.transmission,
            cancellation: snapshot.cancellation,
        })
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            content: self.content.clone(),
            xml: self.to_xml_document(),
            state: self.state,
            created_at: self.created_at,
            transitions: self.transitions.clone(),
            transmission: self.transmission.clone(),
            cancellation: self.cancellation.clone(),
        }
    }

    pub fn content(&self) -> &DocumentContent {
        &self.content
    }

    pub fn access_key(&self) -> &AccessKey {
        &self.content.access_key
    }

    pub fn xml(&self) -> &XmlElement {
        &self.xml
    }

    /// Serialized document with XML declaration; these are the bytes that
    /// are archived and transmitted.
    pub fn to_xml_document(&self) -> String {
        self.xml.to_document()
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Ordered log of all state transitions.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Authorization response attached at `Submitted → Authorized | Rejected`.
    pub fn transmission(&self) -> Option<&TransmissionResult> {
        self.transmission.as_ref()
    }

    /// Response that cancelled the document, if any.
    pub fn cancellation(&self) -> Option<&TransmissionResult> {
        self.cancellation.as_ref()
    }

    /// Authorization protocol number (`nProt`).
    pub fn authorization_protocol(&self) -> Option<&str> {
        match self.state {
            DocumentState::Authorized | DocumentState::Cancelled => {
                self.transmission.as_ref()?.protocol.as_deref()
            }
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Mutable content; only while `Draft`.
    pub fn content_mut(&mut self) -> Result<&mut DocumentContent, LifecycleError> {
        self.require_editable()?;
        Ok(&mut self.content)
    }

    /// Mutable XML tree; only while `Draft`.
    pub fn xml_mut(&mut self) -> Result<&mut XmlElement, LifecycleError> {
        self.require_editable()?;
        Ok(&mut self.xml)
    }

    /// Signature embedded (DRAFT → SIGNED).
    pub fn mark_signed(&mut self, evidence: TransitionEvidence) -> Result<(), LifecycleError> {
        self.require_state(&[DocumentState::Draft], DocumentState::Signed)?;
        self.do_transition(DocumentState::Signed, &evidence.reason);
        Ok(())
    }

    /// Handed to the transport (SIGNED or FAILED_PENDING_RETRY → SUBMITTED).
    pub fn mark_submitted(&mut self, evidence: TransitionEvidence) -> Result<(), LifecycleError> {
        self.require_state(
            &[DocumentState::Signed, DocumentState::FailedPendingRetry],
            DocumentState::Submitted,
        )?;
        self.do_transition(DocumentState::Submitted, &evidence.reason);
        Ok(())
    }

    /// Transport gave up without an authority answer
    /// (SUBMITTED → FAILED_PENDING_RETRY).
    pub fn mark_failed_pending_retry(
        &mut self,
        evidence: TransitionEvidence,
    ) -> Result<(), LifecycleError> {
        self.require_state(&[DocumentState::Submitted], DocumentState::FailedPendingRetry)?;
        self.do_transition(DocumentState::FailedPendingRetry, &evidence.reason);
        Ok(())
    }

    /// The submission was refused before the authority produced a status:
    /// TLS rejection, a 4xx answer or a SOAP fault (SUBMITTED → REJECTED).
    /// No transmission result is attached.
    pub fn mark_refused(&mut self, evidence: TransitionEvidence) -> Result<(), LifecycleError> {
        self.require_state(&[DocumentState::Submitted], DocumentState::Rejected)?;
        self.do_transition(DocumentState::Rejected, &evidence.reason);
        Ok(())
    }

    /// Attach the authority's authorization answer
    /// (SUBMITTED → AUTHORIZED or REJECTED).
    ///
    /// Denials and rejections are ordinary outcomes and land in `Rejected`.
    /// A pending-receipt acknowledgement settles nothing and is refused.
    pub fn apply_transmission(
        &mut self,
        result: TransmissionResult,
    ) -> Result<DocumentState, LifecycleError> {
        let target = match result.authorization_outcome() {
            AuthorizationOutcome::Authorized => DocumentState::Authorized,
            AuthorizationOutcome::Denied | AuthorizationOutcome::Rejected => {
                DocumentState::Rejected
            }
            AuthorizationOutcome::PendingReceipt => {
                return Err(LifecycleError::UnresolvedOutcome {
                    status_code: result.status_code,
                })
            }
        };
        self.require_state(&[DocumentState::Submitted], target)?;
        let reason = format!("{}: {}", result.authorization_outcome(), result);
        self.transmission = Some(result);
        self.do_transition(target, &reason);
        Ok(target)
    }

    /// Cancel through an accepted cancellation event
    /// (AUTHORIZED → CANCELLED).
    pub fn cancel(
        &mut self,
        event: &CancellationEvent,
        result: TransmissionResult,
    ) -> Result<(), LifecycleError> {
        self.require_state(&[DocumentState::Authorized], DocumentState::Cancelled)?;
        if event.access_key != self.content.access_key {
            return Err(LifecycleError::EventMismatch {
                reason: format!(
                    "event targets {} but document is {}",
                    event.access_key, self.content.access_key
                ),
            });
        }
        if !result.cancellation_accepted() {
            return Err(LifecycleError::EventNotAccepted {
                status_code: result.status_code,
                motive: result.motive,
            });
        }
        let reason = format!("cancellation event accepted: {result}");
        self.cancellation = Some(result);
        self.do_transition(DocumentState::Cancelled, &reason);
        Ok(())
    }

    /// Cancel through an accepted void range covering this document
    /// (AUTHORIZED → CANCELLED).
    pub fn void(&mut self, range: &VoidRange, result: TransmissionResult) -> Result<(), LifecycleError> {
        self.require_state(&[DocumentState::Authorized], DocumentState::Cancelled)?;
        let c = &self.content;
        if !range.covers(c.environment, c.series, c.number) || range.issuer != c.issuer.cnpj {
            return Err(LifecycleError::EventMismatch {
                reason: format!(
                    "range {} does not cover series {} number {} ({})",
                    range.element_id(),
                    c.series,
                    c.number,
                    c.environment
                ),
            });
        }
        if !result.void_range_accepted() {
            return Err(LifecycleError::EventNotAccepted {
                status_code: result.status_code,
                motive: result.motive,
            });
        }
        let reason = format!("void range {} accepted: {result}", range.element_id());
        self.cancellation = Some(result);
        self.do_transition(DocumentState::Cancelled, &reason);
        Ok(())
    }

    fn require_editable(&self) -> Result<(), LifecycleError> {
        if self.state != DocumentState::Draft {
            return Err(LifecycleError::NotEditable {
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Validate that the document is in one of the expected states.
    fn require_state(
        &self,
        expected: &[DocumentState],
        target: DocumentState,
    ) -> Result<(), LifecycleError> {
        if self.state.is_terminal() {
            return Err(LifecycleError::TerminalState {
                state: self.state.to_string(),
            });
        }
        if !expected.contains(&self.state) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        Ok(())
    }

    /// Record a state transition.
    fn do_transition(&mut self, to: DocumentState, reason: &str) {
        debug_assert!(self.state.can_transition_to(to));
        self.transitions.push(TransitionRecord {
            from_state: self.state,
            to_state: to,
            timestamp: Timestamp::now(),
            reason: reason.to_string(),
        });
        self.state = to;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Justification;
    use crate::test_support::sample_content;
    use nfe_core::Uf;

    fn evidence(reason: &str) -> TransitionEvidence {
        TransitionEvidence {
            reason: reason.to_string(),
            actor: Some("test".to_string()),
        }
    }

    fn content(number: u32) -> DocumentContent {
        sample_content(number)
    }

    fn make_draft() -> FiscalDocument {
        FiscalDocument::new_draft(content(4), XmlElement::new("NFe"))
    }

    fn response(code: u16) -> TransmissionResult {
        TransmissionResult {
            status_code: code,
            motive: format!("status {code}"),
            protocol: Some("135240000000001".into()),
            access_key: None,
            received_at: None,
            receipt: None,
            raw_response: "<retEnviNFe/>".into(),
        }
    }

    fn make_authorized() -> FiscalDocument {
        let mut doc = make_draft();
        doc.mark_signed(evidence("signed")).unwrap();
        doc.mark_submitted(evidence("sent")).unwrap();
        doc.apply_transmission(response(100)).unwrap();
        doc
    }

    fn justification() -> Justification {
        Justification::new("Erro na emissao do documento").unwrap()
    }

    // ── Happy-path lifecycle tests ───────────────────────────────────

    #[test]
    fn test_new_draft() {
        let doc = make_draft();
        assert_eq!(doc.state(), DocumentState::Draft);
        assert!(doc.transitions().is_empty());
        assert!(doc.transmission().is_none());
        assert!(!doc.is_terminal());
    }

    #[test]
    fn test_sign_submit_authorize() {
        let doc = make_authorized();
        assert_eq!(doc.state(), DocumentState::Authorized);
        assert_eq!(doc.transitions().len(), 3);
        assert_eq!(doc.authorization_protocol(), Some("135240000000001"));
    }

    #[test]
    fn test_rejection_is_a_state_not_an_error() {
        let mut doc = make_draft();
        doc.mark_signed(evidence("signed")).unwrap();
        doc.mark_submitted(evidence("sent")).unwrap();
        let state = doc.apply_transmission(response(539)).unwrap();
        assert_eq!(state, DocumentState::Rejected);
        assert!(doc.is_terminal());
        assert_eq!(doc.transmission().unwrap().status_code, 539);
        assert_eq!(doc.authorization_protocol(), None);
    }

    #[test]
    fn test_denial_lands_in_rejected() {
        let mut doc = make_draft();
        doc.mark_signed(evidence("signed")).unwrap();
        doc.mark_submitted(evidence("sent")).unwrap();
        assert_eq!(doc.apply_transmission(response(302)).unwrap(), DocumentState::Rejected);
        assert!(doc.transitions()[2].reason.starts_with("denied"));
    }

    #[test]
    fn test_failed_pending_retry_can_resubmit() {
        let mut doc = make_draft();
        doc.mark_signed(evidence("signed")).unwrap();
        doc.mark_submitted(evidence("sent")).unwrap();
        doc.mark_failed_pending_retry(evidence("timeout")).unwrap();
        assert_eq!(doc.state(), DocumentState::FailedPendingRetry);
        assert!(!doc.is_terminal());
        doc.mark_submitted(evidence("resent")).unwrap();
        doc.apply_transmission(response(100)).unwrap();
        assert_eq!(doc.state(), DocumentState::Authorized);
    }

    #[test]
    fn test_refused_submission_is_terminal_without_result() {
        let mut doc = make_draft();
        doc.mark_signed(evidence("signed")).unwrap();
        doc.mark_submitted(evidence("sent")).unwrap();
        doc.mark_refused(evidence("http_status: HTTP 403")).unwrap();
        assert_eq!(doc.state(), DocumentState::Rejected);
        assert!(doc.is_terminal());
        assert!(doc.transmission().is_none());
        assert_eq!(doc.transitions()[2].reason, "http_status: HTTP 403");
        assert!(doc.mark_submitted(evidence("again")).is_err());
    }

    #[test]
    fn test_refusal_requires_submission() {
        let mut doc = make_draft();
        doc.mark_signed(evidence("signed")).unwrap();
        assert!(doc.mark_refused(evidence("refused")).is_err());
    }

    #[test]
    fn test_cancel_with_accepted_event() {
        let mut doc = make_authorized();
        let event = CancellationEvent::new(
            doc.access_key().clone(),
            "135240000000001".into(),
            1,
            justification(),
        )
        .unwrap();
        doc.cancel(&event, response(135)).unwrap();
        assert_eq!(doc.state(), DocumentState::Cancelled);
        assert!(doc.is_terminal());
        assert_eq!(doc.cancellation().unwrap().status_code, 135);
        assert_eq!(doc.authorization_protocol(), Some("135240000000001"));
    }

    #[test]
    fn test_void_range_cancels_covered_document() {
        let mut doc = make_authorized();
        let c = doc.content().clone();
        let range = VoidRange::new(
            c.issuer.cnpj.clone(),
            Uf::SP,
            2024,
            c.environment,
            c.series,
            DocumentNumber::new(1).unwrap(),
            DocumentNumber::new(10).unwrap(),
            justification(),
        )
        .unwrap();
        doc.void(&range, response(102)).unwrap();
        assert_eq!(doc.state(), DocumentState::Cancelled);
    }

    // ── Invalid transition tests ─────────────────────────────────────

    #[test]
    fn test_cannot_submit_draft() {
        let mut doc = make_draft();
        let err = doc.mark_submitted(evidence("sent")).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn test_cannot_sign_twice() {
        let mut doc = make_draft();
        doc.mark_signed(evidence("signed")).unwrap();
        assert!(doc.mark_signed(evidence("again")).is_err());
    }

    #[test]
    fn test_signed_document_is_immutable() {
        let mut doc = make_draft();
        doc.xml_mut().unwrap().set_attr("versao", "4.00");
        doc.mark_signed(evidence("signed")).unwrap();
        assert!(matches!(doc.xml_mut(), Err(LifecycleError::NotEditable { .. })));
        assert!(doc.content_mut().is_err());
    }

    #[test]
    fn test_pending_receipt_does_not_settle() {
        let mut doc = make_draft();
        doc.mark_signed(evidence("signed")).unwrap();
        doc.mark_submitted(evidence("sent")).unwrap();
        let err = doc.apply_transmission(response(103)).unwrap_err();
        assert_eq!(err, LifecycleError::UnresolvedOutcome { status_code: 103 });
        assert_eq!(doc.state(), DocumentState::Submitted);
    }

    #[test]
    fn test_terminal_states_refuse_transitions() {
        let mut doc = make_draft();
        doc.mark_signed(evidence("signed")).unwrap();
        doc.mark_submitted(evidence("sent")).unwrap();
        doc.apply_transmission(response(204)).unwrap();
        let err = doc.mark_submitted(evidence("again")).unwrap_err();
        assert!(matches!(err, LifecycleError::TerminalState { .. }));
    }

    #[test]
    fn test_cancel_rejected_event_keeps_authorized() {
        let mut doc = make_authorized();
        let event = CancellationEvent::new(
            doc.access_key().clone(),
            "135240000000001".into(),
            1,
            justification(),
        )
        .unwrap();
        let err = doc.cancel(&event, response(573)).unwrap_err();
        assert!(matches!(err, LifecycleError::EventNotAccepted { status_code: 573, .. }));
        assert_eq!(doc.state(), DocumentState::Authorized);
    }

    #[test]
    fn test_cancel_event_for_other_document() {
        let mut doc = make_authorized();
        let other = content(5).access_key;
        let event =
            CancellationEvent::new(other, "135240000000001".into(), 1, justification()).unwrap();
        assert!(matches!(
            doc.cancel(&event, response(135)),
            Err(LifecycleError::EventMismatch { .. })
        ));
    }

    #[test]
    fn test_void_range_not_covering_document() {
        let mut doc = make_authorized();
        let c = doc.content().clone();
        let range = VoidRange::new(
            c.issuer.cnpj.clone(),
            Uf::SP,
            2024,
            c.environment,
            c.series,
            DocumentNumber::new(10).unwrap(),
            DocumentNumber::new(20).unwrap(),
            justification(),
        )
        .unwrap();
        assert!(doc.void(&range, response(102)).is_err());
    }

    // ── State table ──────────────────────────────────────────────────

    #[test]
    fn test_transition_table_is_closed() {
        use DocumentState::*;
        let all = [Draft, Signed, Submitted, Authorized, Rejected, Cancelled, FailedPendingRetry];
        let legal = all
            .iter()
            .flat_map(|a| all.iter().map(move |b| (*a, *b)))
            .filter(|(a, b)| a.can_transition_to(*b))
            .count();
        assert_eq!(legal, 7);
        for s in all {
            assert_eq!(s.as_str().parse::<DocumentState>().unwrap(), s);
        }
    }

    #[test]
    fn test_transition_record_serializes() {
        let doc = make_authorized();
        let json = serde_json::to_string(&doc.transitions()[0]).unwrap();
        assert!(json.contains("\"from_state\":\"Draft\""));
    }

    // ── Persistence ──────────────────────────────────────────────────

    #[test]
    fn test_snapshot_restores_state_and_history() {
        let doc = make_authorized();
        let json = serde_json::to_string(&doc.snapshot()).unwrap();
        let back: DocumentSnapshot = serde_json::from_str(&json).unwrap();
        let restored = FiscalDocument::restore(back).unwrap();
        assert_eq!(restored.state(), DocumentState::Authorized);
        assert_eq!(restored.transitions(), doc.transitions());
        assert_eq!(restored.authorization_protocol(), Some("135240000000001"));
        assert_eq!(restored.to_xml_document(), doc.to_xml_document());
    }

    #[test]
    fn test_snapshot_with_reformatted_xml_is_refused() {
        let mut snap = make_authorized().snapshot();
        snap.xml = snap.xml.replacen("><", ">\n  <", 1);
        assert!(matches!(
            FiscalDocument::restore(snap),
            Err(LifecycleError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_snapshot_with_inconsistent_state_is_refused() {
        let mut snap = make_authorized().snapshot();
        snap.state = DocumentState::Draft;
        assert!(matches!(
            FiscalDocument::restore(snap),
            Err(LifecycleError::CorruptSnapshot(_))
        ));
    }
}
