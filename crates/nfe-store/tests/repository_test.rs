//! Lifecycle repository against an in-memory SQLite database.

use nfe_core::{DocumentNumber, Environment, SequenceKey, Series, TransmissionResult, XmlElement, NFE_NAMESPACE};
use nfe_state::test_support::sample_content;
use nfe_state::{
    CancellationEvent, DocumentState, FiscalDocument, Justification, TransitionEvidence, VoidRange,
};
use nfe_store::repository;

fn draft(number: u32) -> FiscalDocument {
    let content = sample_content(number);
    let xml = XmlElement::new("NFe").attr("xmlns", NFE_NAMESPACE).child(
        XmlElement::new("infNFe")
            .attr("Id", content.access_key.element_id())
            .leaf("nNF", number.to_string()),
    );
    FiscalDocument::new_draft(content, xml)
}

fn answer(status_code: u16, protocol: Option<&str>) -> TransmissionResult {
    TransmissionResult {
        status_code,
        motive: format!("status {status_code}"),
        protocol: protocol.map(str::to_string),
        access_key: None,
        received_at: None,
        receipt: None,
        raw_response: "<retEnviNFe/>".into(),
    }
}

fn submitted(number: u32) -> FiscalDocument {
    let mut doc = draft(number);
    doc.mark_signed(TransitionEvidence::new("signed")).unwrap();
    doc.mark_submitted(TransitionEvidence::new("sent")).unwrap();
    doc
}

fn key() -> SequenceKey {
    SequenceKey::new(Series::new(1).unwrap(), Environment::Homologation)
}

// ── Documents ────────────────────────────────────────────────────────

#[tokio::test]
async fn saved_document_is_found_by_access_key() {
    let pool = repository::connect("sqlite::memory:").await.unwrap();
    let mut doc = submitted(4);
    doc.apply_transmission(answer(100, Some("135240000000001"))).unwrap();
    repository::save_document(&pool, &doc).await.unwrap();

    let record = repository::find_by_access_key(&pool, doc.access_key())
        .await
        .unwrap()
        .expect("record");
    assert_eq!(record.state, DocumentState::Authorized);
    assert_eq!(record.number, 4);
    assert_eq!(record.series, 1);
    assert_eq!(record.environment, Environment::Homologation);
    assert_eq!(record.status_code, Some(100));
    assert_eq!(record.protocol.as_deref(), Some("135240000000001"));

    let restored = record.to_document().unwrap();
    assert_eq!(restored.state(), DocumentState::Authorized);
    assert_eq!(restored.xml(), doc.xml());
    assert_eq!(restored.transmission(), doc.transmission());
}

#[tokio::test]
async fn unknown_access_key_is_none() {
    let pool = repository::connect("sqlite::memory:").await.unwrap();
    let doc = draft(1);
    assert!(repository::find_by_access_key(&pool, doc.access_key())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn saving_twice_appends_only_new_transitions() {
    let pool = repository::connect("sqlite::memory:").await.unwrap();
    let mut doc = draft(5);
    doc.mark_signed(TransitionEvidence::new("signed")).unwrap();
    repository::save_document(&pool, &doc).await.unwrap();

    doc.mark_submitted(TransitionEvidence::new("sent")).unwrap();
    doc.apply_transmission(answer(204, None)).unwrap();
    repository::save_document(&pool, &doc).await.unwrap();

    let transitions = repository::list_transitions(&pool, doc.access_key()).await.unwrap();
    let path: Vec<_> = transitions.iter().map(|t| (t.from_state, t.to_state)).collect();
    assert_eq!(
        path,
        vec![
            (DocumentState::Draft, DocumentState::Signed),
            (DocumentState::Signed, DocumentState::Submitted),
            (DocumentState::Submitted, DocumentState::Rejected),
        ]
    );
    assert_eq!(transitions[0].reason, "signed");

    let record = repository::find_by_access_key(&pool, doc.access_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, DocumentState::Rejected);
    assert_eq!(record.status_code, Some(204));
    assert!(record.protocol.is_none());
}

#[tokio::test]
async fn number_range_query_is_inclusive_and_ordered() {
    let pool = repository::connect("sqlite::memory:").await.unwrap();
    for n in [7, 3, 5, 4, 9] {
        repository::save_document(&pool, &submitted(n)).await.unwrap();
    }

    let found = repository::find_by_number_range(
        &pool,
        key(),
        DocumentNumber::new(4).unwrap(),
        DocumentNumber::new(7).unwrap(),
    )
    .await
    .unwrap();
    let numbers: Vec<u32> = found.iter().map(|r| r.number).collect();
    assert_eq!(numbers, vec![4, 5, 7]);

    let other_env = SequenceKey::new(Series::new(1).unwrap(), Environment::Production);
    let none = repository::find_by_number_range(
        &pool,
        other_env,
        DocumentNumber::new(1).unwrap(),
        DocumentNumber::new(100).unwrap(),
    )
    .await
    .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn documents_by_state() {
    let pool = repository::connect("sqlite::memory:").await.unwrap();
    let mut failed = submitted(1);
    failed
        .mark_failed_pending_retry(TransitionEvidence::new("timeout"))
        .unwrap();
    repository::save_document(&pool, &failed).await.unwrap();
    repository::save_document(&pool, &submitted(2)).await.unwrap();

    let pending = repository::find_by_state(&pool, DocumentState::FailedPendingRetry)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].number, 1);
}

#[tokio::test]
async fn file_database_persists_across_pools() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("lifecycle.db").display());
    let doc = submitted(11);
    {
        let pool = repository::connect(&url).await.unwrap();
        repository::save_document(&pool, &doc).await.unwrap();
        pool.close().await;
    }
    let pool = repository::connect(&url).await.unwrap();
    let record = repository::find_by_access_key(&pool, doc.access_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, DocumentState::Submitted);
}

// ── Void ranges ──────────────────────────────────────────────────────

#[tokio::test]
async fn void_range_answer_is_recorded() {
    let pool = repository::connect("sqlite::memory:").await.unwrap();
    let content = sample_content(1);
    let range = VoidRange::new(
        content.issuer.cnpj.clone(),
        nfe_core::Uf::SP,
        2024,
        Environment::Homologation,
        Series::new(1).unwrap(),
        DocumentNumber::new(10).unwrap(),
        DocumentNumber::new(12).unwrap(),
        Justification::new("Falha no sistema de numeracao").unwrap(),
    )
    .unwrap();

    repository::record_void_range(&pool, &range, &answer(241, None))
        .await
        .unwrap();
    repository::record_void_range(&pool, &range, &answer(102, Some("135240000000050")))
        .await
        .unwrap();

    let ranges = repository::list_void_ranges(&pool, key()).await.unwrap();
    assert_eq!(ranges.len(), 1);
    assert!(ranges[0].accepted());
    assert_eq!((ranges[0].first, ranges[0].last), (10, 12));
    assert_eq!(ranges[0].protocol.as_deref(), Some("135240000000050"));
    assert_eq!(ranges[0].element_id, range.element_id());
}

// ── Events ───────────────────────────────────────────────────────────

#[tokio::test]
async fn refused_and_accepted_cancellations_are_both_kept() {
    let pool = repository::connect("sqlite::memory:").await.unwrap();
    let mut doc = submitted(8);
    doc.apply_transmission(answer(100, Some("135240000000008"))).unwrap();
    repository::save_document(&pool, &doc).await.unwrap();

    let event = CancellationEvent::new(
        doc.access_key().clone(),
        "135240000000008".into(),
        1,
        Justification::new("Erro de digitacao no pedido").unwrap(),
    )
    .unwrap();
    repository::record_cancellation(&pool, &event, &answer(573, None))
        .await
        .unwrap();
    repository::record_cancellation(&pool, &event, &answer(135, Some("135240000000099")))
        .await
        .unwrap();

    let events = repository::list_events(&pool, doc.access_key()).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].status_code, 573);
    assert_eq!(events[0].motive, "status 573");
    assert!(!events[0].accepted());
    assert_eq!(events[0].protocol, None);
    assert_eq!(events[0].event_type, "110111");
    assert_eq!(events[0].justification, "Erro de digitacao no pedido");
    assert!(events[1].accepted());
    assert_eq!(events[1].sequence, 1);
    assert_eq!(events[1].protocol.as_deref(), Some("135240000000099"));
}
