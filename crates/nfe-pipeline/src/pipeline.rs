//! # Issuance Pipeline
//!
//! One [`Pipeline`] per issuing installation. Every operation is a
//! short-lived unit of work and may run concurrently with others; the
//! only shared mutable resources are the sequence counter (file lock),
//! the certificate cache (read-mostly) and the transport client cache.
//!
//! ## Issuance
//!
//! ```text
//! certificate check → endpoint check → allocate → build → validate → sign
//!   → pending/ + record (SIGNED) → record (SUBMITTED) → authorize
//!   → sent/ (AUTHORIZED) | failed/ (REJECTED | FAILED_PENDING_RETRY)
//! ```
//!
//! The signed artifact is durable before the transport is called, and the
//! lifecycle record is written before any operation returns.
//!
//! A transport failure whose effect at the authority is unknown (no
//! answer, a server-side HTTP error, an unreadable body) leaves the
//! document in `FailedPendingRetry`. Any other failure, such as a 4xx
//! answer, ends it in `Rejected`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Datelike;
use metrics::{counter, histogram};
use parking_lot::Mutex;
use sqlx::SqlitePool;

use nfe_builder::{payload, BusinessInput, DocumentBuilder, StandardTaxCalculator, TaxCalculator};
use nfe_core::transmission::{AuthorizationOutcome, QueryOutcome};
use nfe_core::{AccessKey, DocumentNumber, Series, SequenceKey, Timestamp, TransmissionResult, Uf};
use nfe_crypto::{sign_document, sign_enveloped, Certificate, CertificateError, CertificateStore, SignError};
use nfe_schema::{Finding, Validator};
use nfe_sefaz::{SefazClient, Service};
use nfe_state::{
    CancellationEvent, DocumentState, EventError, FiscalDocument, Justification, LifecycleError,
    TransitionEvidence, VoidRange,
};
use nfe_store::repository::{self, DocumentRecord};
use nfe_store::{
    Artifact, ArtifactKind, ArtifactLocation, ArtifactStore, FileSequenceAllocator, SequenceAllocator,
};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

// ─── Outcomes ────────────────────────────────────────────────────────

/// What happened to one issued document. Rejections land here, not in
/// the error path.
#[derive(Debug, Clone)]
pub struct IssueOutcome {
    pub access_key: AccessKey,
    pub number: DocumentNumber,
    pub state: DocumentState,
    /// The authority's last answer.
    pub result: TransmissionResult,
    /// Validation warnings that did not block signing.
    pub warnings: Vec<Finding>,
    /// Where the signed XML ended up.
    pub artifact: Artifact,
}

/// Answer to a cancellation request.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub access_key: AccessKey,
    pub accepted: bool,
    pub result: TransmissionResult,
    pub artifact: Artifact,
}

/// Answer to a void range request.
#[derive(Debug, Clone)]
pub struct VoidOutcome {
    pub range: VoidRange,
    pub accepted: bool,
    pub result: TransmissionResult,
    /// Authorized documents cancelled because the range covered them.
    pub voided: Vec<AccessKey>,
    pub artifact: Artifact,
}

// ─── Pipeline ────────────────────────────────────────────────────────

pub struct Pipeline {
    config: PipelineConfig,
    certificates: Arc<CertificateStore>,
    sequences: Arc<dyn SequenceAllocator>,
    builder: DocumentBuilder,
    taxes: Arc<dyn TaxCalculator>,
    validator: Validator,
    artifacts: ArtifactStore,
    db: SqlitePool,
    batch_ids: AtomicU64,
    /// Client built for the certificate with this thumbprint.
    transport: Mutex<Option<(String, SefazClient)>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("environment", &self.config.environment)
            .field("series", &self.config.series)
            .field("artifacts", &self.artifacts.root())
            .field("certificate_loaded", &self.certificates.is_loaded())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Open storage and load the configured certificate.
    ///
    /// A certificate that fails to load does not prevent opening: reads
    /// and queries of stored records still work, and every signing
    /// operation fails with [`SignError::NoCertificate`] until
    /// [`reload_certificate`](Self::reload_certificate) succeeds.
    pub async fn open(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let certificates = Arc::new(CertificateStore::new());
        if let Err(e) = certificates.load(&config.certificate.path, &config.certificate.password) {
            tracing::warn!(
                path = %config.certificate.path.display(),
                error = %e,
                "signing certificate not loaded"
            );
        }
        let sequences: Arc<dyn SequenceAllocator> =
            Arc::new(FileSequenceAllocator::open(&config.storage.sequence_dir)?);
        let builder = DocumentBuilder::new(config.builder.clone())?;
        let taxes: Arc<dyn TaxCalculator> = Arc::new(StandardTaxCalculator::for_issuer(&config.issuer));
        let validator = Validator::new(config.validator.clone());
        let artifacts = ArtifactStore::open(&config.storage.artifact_root)?;
        let db = repository::connect(&config.storage.database_url).await?;

        tracing::info!(
            environment = %config.environment,
            series = %config.series,
            issuer = config.issuer.cnpj.as_str(),
            "pipeline ready"
        );
        Ok(Self {
            config,
            certificates,
            sequences,
            builder,
            taxes,
            validator,
            artifacts,
            db,
            batch_ids: AtomicU64::new(seed_batch_id()),
            transport: Mutex::new(None),
        })
    }

    /// Replace the tax computation adapter.
    pub fn with_tax_calculator(mut self, taxes: Arc<dyn TaxCalculator>) -> Self {
        self.taxes = taxes;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn certificates(&self) -> &CertificateStore {
        &self.certificates
    }

    pub fn sequences(&self) -> &dyn SequenceAllocator {
        self.sequences.as_ref()
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn database(&self) -> &SqlitePool {
        &self.db
    }

    /// Drop the cached certificate and load it again from the configured
    /// path, e.g. after the file or passphrase changed.
    pub fn reload_certificate(&self) -> Result<Arc<Certificate>, CertificateError> {
        self.certificates.invalidate();
        *self.transport.lock() = None;
        self.certificates
            .load(&self.config.certificate.path, &self.config.certificate.password)
    }

    // ─── Issuance ────────────────────────────────────────────────────

    /// Issue one document in `series` (the configured series when `None`).
    ///
    /// Returns an outcome for every authority answer, authorization or
    /// rejection. Errors mean no answer was obtained; a document that got
    /// as far as the transport is then recorded as `FailedPendingRetry`, or
    /// `Rejected` when the transport failure is terminal.
    pub async fn issue(&self, input: BusinessInput, series: Option<Series>) -> Result<IssueOutcome, PipelineError> {
        let started = Instant::now();
        let result = self.issue_document(input, series).await;

        let outcome = match &result {
            Ok(o) => match o.state {
                DocumentState::Authorized => "authorized",
                DocumentState::Rejected => "rejected",
                _ => "pending",
            },
            Err(PipelineError::Validation(_)) => "invalid",
            Err(PipelineError::Transport(_)) => "failed",
            Err(e) => e.kind(),
        };
        counter!("nfe_documents_issued_total", "outcome" => outcome).increment(1);
        histogram!("nfe_submission_duration_seconds", "operation" => "issue")
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn issue_document(
        &self,
        mut input: BusinessInput,
        series: Option<Series>,
    ) -> Result<IssueOutcome, PipelineError> {
        if input.issuer.is_none() {
            input.issuer = Some(self.config.issuer.clone());
        }
        // Nothing is allocated or written without a usable certificate and a
        // known endpoint for the issuer.
        self.certificates.current().map_err(SignError::NoCertificate)?;
        let client = self.transport()?;
        let uf = input.issuer.as_ref().map_or(self.config.issuer.address.uf, |i| i.address.uf);
        client.endpoint(uf, self.config.environment, Service::Authorize)?;

        let key = self.config.sequence_key(series);
        let items = self.builder.compute_items(&input, self.taxes.as_ref())?;
        let number = self.allocate(key).await?;
        let mut doc = self.builder.build(&input, key, number, items)?;

        let warnings = match self.validator.validate(&doc).into_result() {
            Ok(warnings) => warnings,
            Err(e) => {
                tracing::warn!(
                    access_key = %doc.access_key(),
                    series = %key.series,
                    number = number.get(),
                    "document refused by validation, number left unused"
                );
                return Err(e.into());
            }
        };
        for finding in &warnings {
            tracing::info!(access_key = %doc.access_key(), finding = %finding, "validation warning");
        }

        sign_document(&mut doc, &self.certificates)?;
        let artifact = self
            .write_artifact(
                ArtifactKind::Document,
                number.get().to_string(),
                doc.to_xml_document().into_bytes(),
            )
            .await?;
        repository::save_document(&self.db, &doc).await?;

        let (result, artifact) = self.transmit(&client, &mut doc, artifact).await?;
        tracing::info!(
            access_key = %doc.access_key(),
            number = number.get(),
            state = %doc.state(),
            c_stat = result.status_code,
            "document issued"
        );
        Ok(IssueOutcome {
            access_key: doc.access_key().clone(),
            number,
            state: doc.state(),
            result,
            warnings,
            artifact,
        })
    }

    /// Send a document stuck in `FailedPendingRetry` again.
    ///
    /// The authority is asked first whether it already holds an
    /// authorization for the key; only if not is the stored signed XML
    /// submitted again. A key the authority reports as cancelled is not
    /// resent and fails with [`PipelineError::Diverged`].
    pub async fn resubmit(&self, key: &AccessKey) -> Result<IssueOutcome, PipelineError> {
        let mut doc = self.load(key).await?;
        if doc.state() != DocumentState::FailedPendingRetry {
            return Err(LifecycleError::InvalidTransition {
                from: doc.state().to_string(),
                to: DocumentState::Submitted.to_string(),
            }
            .into());
        }
        self.certificates.current().map_err(SignError::NoCertificate)?;
        let client = self.transport()?;
        let number = doc.content().number;
        let artifact = self.stored_document_artifact(&doc).await?;

        match client.query_protocol(doc.content().environment, key).await {
            Ok(found) if found.query_outcome() == QueryOutcome::Authorized => {
                tracing::info!(access_key = %key, "authorization already on file at the authority");
                doc.mark_submitted(TransitionEvidence::new("authorization found by protocol query"))?;
                doc.apply_transmission(found.clone())?;
                repository::save_document(&self.db, &doc).await?;
                let artifact = self.move_artifact(&artifact, ArtifactLocation::Sent).await?;
                return Ok(IssueOutcome {
                    access_key: key.clone(),
                    number,
                    state: doc.state(),
                    result: found,
                    warnings: Vec::new(),
                    artifact,
                });
            }
            Ok(found) if found.query_outcome() == QueryOutcome::Cancelled => {
                tracing::warn!(
                    access_key = %key,
                    c_stat = found.status_code,
                    "authority holds the document as cancelled, not resubmitting"
                );
                return Err(PipelineError::Diverged {
                    access_key: key.clone(),
                    status_code: found.status_code,
                    motive: found.motive,
                });
            }
            Ok(found) => {
                tracing::debug!(access_key = %key, c_stat = found.status_code, "no authorization on file");
            }
            Err(e) => {
                tracing::debug!(access_key = %key, error = %e, "protocol query failed, resubmitting");
            }
        }

        let artifact = self.move_artifact(&artifact, ArtifactLocation::Pending).await?;
        let (result, artifact) = self.transmit(&client, &mut doc, artifact).await?;
        Ok(IssueOutcome {
            access_key: key.clone(),
            number,
            state: doc.state(),
            result,
            warnings: Vec::new(),
            artifact,
        })
    }

    /// SIGNED or FAILED_PENDING_RETRY → SUBMITTED → outcome.
    async fn transmit(
        &self,
        client: &SefazClient,
        doc: &mut FiscalDocument,
        artifact: Artifact,
    ) -> Result<(TransmissionResult, Artifact), PipelineError> {
        let batch_id = self.next_batch_id();
        let uf = doc.content().issuer.address.uf;
        let environment = doc.content().environment;

        doc.mark_submitted(TransitionEvidence::new(format!("batch {batch_id} sent to {uf}")))?;
        repository::save_document(&self.db, doc).await?;

        match client.authorize(uf, environment, batch_id, doc.xml()).await {
            Ok(result) if result.authorization_outcome() == AuthorizationOutcome::PendingReceipt => {
                doc.mark_failed_pending_retry(TransitionEvidence::new(format!(
                    "no final answer within budget: {result}"
                )))?;
                repository::save_document(&self.db, doc).await?;
                let artifact = self.move_artifact(&artifact, ArtifactLocation::Failed).await?;
                Ok((result, artifact))
            }
            Ok(result) => {
                let state = doc.apply_transmission(result.clone())?;
                repository::save_document(&self.db, doc).await?;
                let to = if state == DocumentState::Authorized {
                    ArtifactLocation::Sent
                } else {
                    ArtifactLocation::Failed
                };
                let artifact = self.move_artifact(&artifact, to).await?;
                Ok((result, artifact))
            }
            Err(e) if !e.outcome_unknown() => {
                tracing::warn!(
                    access_key = %doc.access_key(),
                    kind = e.kind(),
                    error = %e,
                    "submission refused by transport, document rejected"
                );
                doc.mark_refused(TransitionEvidence::new(format!("{}: {e}", e.kind())))?;
                repository::save_document(&self.db, doc).await?;
                self.move_artifact(&artifact, ArtifactLocation::Failed).await?;
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(
                    access_key = %doc.access_key(),
                    kind = e.kind(),
                    error = %e,
                    "submission failed, document pending retry"
                );
                doc.mark_failed_pending_retry(TransitionEvidence::new(format!("{}: {e}", e.kind())))?;
                repository::save_document(&self.db, doc).await?;
                self.move_artifact(&artifact, ArtifactLocation::Failed).await?;
                Err(e.into())
            }
        }
    }

    // ─── Cancellation ────────────────────────────────────────────────

    /// Cancel an authorized document. A refused event is an outcome with
    /// `accepted == false`; the document stays `Authorized`. Every answer
    /// is kept in the event log.
    pub async fn cancel(&self, key: &AccessKey, reason: &str) -> Result<EventOutcome, PipelineError> {
        let started = Instant::now();
        let justification = Justification::new(reason)?;
        let mut doc = self.load(key).await?;
        if doc.state() != DocumentState::Authorized {
            return Err(LifecycleError::InvalidTransition {
                from: doc.state().to_string(),
                to: DocumentState::Cancelled.to_string(),
            }
            .into());
        }
        let protocol = doc
            .authorization_protocol()
            .ok_or(EventError::MissingProtocol)?
            .to_string();
        let event = CancellationEvent::new(key.clone(), protocol, 1, justification)?;

        let certificate = self.certificates.current().map_err(SignError::NoCertificate)?;
        let client = self.transport()?;
        let environment = doc.content().environment;
        let mut request = payload::cancellation_event(
            self.next_batch_id(),
            &event,
            &doc.content().issuer.cnpj,
            environment,
            self.builder.config().offset()?,
        );
        sign_enveloped(&mut request, &event.element_id(), &certificate)?;
        let artifact = self
            .write_artifact(
                ArtifactKind::Cancellation,
                doc.content().number.get().to_string(),
                request.to_document().into_bytes(),
            )
            .await?;

        let uf = doc.content().issuer.address.uf;
        let result = match client.send_event(uf, environment, &request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(access_key = %key, error = %e, "cancellation not delivered");
                self.move_artifact(&artifact, ArtifactLocation::Failed).await?;
                return Err(e.into());
            }
        };

        let accepted = result.cancellation_accepted();
        repository::record_cancellation(&self.db, &event, &result).await?;
        let artifact = if accepted {
            doc.cancel(&event, result.clone())?;
            repository::save_document(&self.db, &doc).await?;
            self.move_artifact(&artifact, ArtifactLocation::Sent).await?
        } else {
            self.move_artifact(&artifact, ArtifactLocation::Failed).await?
        };
        tracing::info!(access_key = %key, c_stat = result.status_code, accepted, "cancellation answered");
        histogram!("nfe_submission_duration_seconds", "operation" => "cancel")
            .record(started.elapsed().as_secs_f64());
        Ok(EventOutcome {
            access_key: key.clone(),
            accepted,
            result,
            artifact,
        })
    }

    // ─── Void Range ──────────────────────────────────────────────────

    /// Declare `first..=last` of `series` unusable.
    ///
    /// On acceptance the range is recorded, the counter is raised past
    /// `last`, and every authorized document in the range is cancelled.
    pub async fn void_range(
        &self,
        series: Option<Series>,
        first: DocumentNumber,
        last: DocumentNumber,
        reason: &str,
    ) -> Result<VoidOutcome, PipelineError> {
        let started = Instant::now();
        let key = self.config.sequence_key(series);
        let issuer = &self.config.issuer;
        let offset = self.builder.config().offset()?;
        let range = VoidRange::new(
            issuer.cnpj.clone(),
            issuer.address.uf,
            Timestamp::now().local_date(offset).year(),
            key.environment,
            key.series,
            first,
            last,
            Justification::new(reason)?,
        )?;

        let certificate = self.certificates.current().map_err(SignError::NoCertificate)?;
        let client = self.transport()?;
        let mut request = payload::void_range_request(&range);
        sign_enveloped(&mut request, &range.element_id(), &certificate)?;
        let artifact = self
            .write_artifact(
                ArtifactKind::VoidRange,
                format!("{}-{}", first.get(), last.get()),
                request.to_document().into_bytes(),
            )
            .await?;

        let result = match client.void_range(range.uf, range.environment, &request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(range = %range.element_id(), error = %e, "void range not delivered");
                self.move_artifact(&artifact, ArtifactLocation::Failed).await?;
                return Err(e.into());
            }
        };
        repository::record_void_range(&self.db, &range, &result).await?;

        let accepted = result.void_range_accepted();
        let mut voided = Vec::new();
        let artifact = if accepted {
            if let Some(after) = last.get().checked_add(1).and_then(|n| DocumentNumber::new(n).ok()) {
                let sequences = Arc::clone(&self.sequences);
                tokio::task::spawn_blocking(move || sequences.advance_to(key, after)).await??;
            }
            for record in repository::find_by_number_range(&self.db, key, first, last).await? {
                if record.state != DocumentState::Authorized {
                    continue;
                }
                let mut doc = record.to_document()?;
                doc.void(&range, result.clone())?;
                repository::save_document(&self.db, &doc).await?;
                voided.push(doc.access_key().clone());
            }
            self.move_artifact(&artifact, ArtifactLocation::Sent).await?
        } else {
            self.move_artifact(&artifact, ArtifactLocation::Failed).await?
        };
        tracing::info!(
            range = %range.element_id(),
            c_stat = result.status_code,
            accepted,
            voided = voided.len(),
            "void range answered"
        );
        histogram!("nfe_submission_duration_seconds", "operation" => "void_range")
            .record(started.elapsed().as_secs_f64());
        Ok(VoidOutcome {
            range,
            accepted,
            result,
            voided,
            artifact,
        })
    }

    // ─── Queries ─────────────────────────────────────────────────────

    /// Situation of a document at the authority.
    pub async fn query(&self, key: &AccessKey) -> Result<TransmissionResult, PipelineError> {
        let client = self.transport()?;
        let environment = match repository::find_by_access_key(&self.db, key).await? {
            Some(record) => record.environment,
            None => self.config.environment,
        };
        Ok(client.query_protocol(environment, key).await?)
    }

    /// Service status of the authority serving `uf` (the issuer's state
    /// when `None`).
    pub async fn status(&self, uf: Option<Uf>) -> Result<TransmissionResult, PipelineError> {
        let client = self.transport()?;
        let uf = uf.unwrap_or(self.config.issuer.address.uf);
        Ok(client.status(uf, self.config.environment).await?)
    }

    /// Local lifecycle record.
    pub async fn record(&self, key: &AccessKey) -> Result<Option<DocumentRecord>, PipelineError> {
        Ok(repository::find_by_access_key(&self.db, key).await?)
    }

    /// Local lifecycle records in `from..=to` of `series`.
    pub async fn records_in_range(
        &self,
        series: Option<Series>,
        from: DocumentNumber,
        to: DocumentNumber,
    ) -> Result<Vec<DocumentRecord>, PipelineError> {
        let key: SequenceKey = self.config.sequence_key(series);
        Ok(repository::find_by_number_range(&self.db, key, from, to).await?)
    }

    // ─── Internals ───────────────────────────────────────────────────

    async fn load(&self, key: &AccessKey) -> Result<FiscalDocument, PipelineError> {
        let record = repository::find_by_access_key(&self.db, key)
            .await?
            .ok_or_else(|| PipelineError::NotFound(key.to_string()))?;
        Ok(record.to_document()?)
    }

    /// The authority client for the current certificate, rebuilt when the
    /// certificate changes.
    fn transport(&self) -> Result<SefazClient, PipelineError> {
        let certificate = self.certificates.current()?;
        let thumbprint = certificate.thumbprint()?;
        let mut slot = self.transport.lock();
        if let Some((cached, client)) = slot.as_ref() {
            if *cached == thumbprint {
                return Ok(client.clone());
            }
        }
        let client = SefazClient::new(self.config.transport.clone(), &certificate)?;
        *slot = Some((thumbprint, client.clone()));
        Ok(client)
    }

    async fn allocate(&self, key: SequenceKey) -> Result<DocumentNumber, PipelineError> {
        let sequences = Arc::clone(&self.sequences);
        let number = tokio::task::spawn_blocking(move || sequences.next_number(key)).await??;
        Ok(number)
    }

    fn next_batch_id(&self) -> u64 {
        self.batch_ids.fetch_add(1, Ordering::Relaxed) % (payload::MAX_BATCH_ID + 1)
    }

    async fn write_artifact(
        &self,
        kind: ArtifactKind,
        label: String,
        bytes: Vec<u8>,
    ) -> Result<Artifact, PipelineError> {
        let store = self.artifacts.clone();
        let artifact =
            tokio::task::spawn_blocking(move || store.write_pending(kind, &label, &bytes)).await??;
        Ok(artifact)
    }

    async fn move_artifact(&self, artifact: &Artifact, to: ArtifactLocation) -> Result<Artifact, PipelineError> {
        let store = self.artifacts.clone();
        let artifact = artifact.clone();
        let moved = tokio::task::spawn_blocking(move || store.move_to(&artifact, to)).await??;
        Ok(moved)
    }

    /// The failed artifact holding exactly this document's signed bytes,
    /// or a fresh pending copy when none survives.
    async fn stored_document_artifact(&self, doc: &FiscalDocument) -> Result<Artifact, PipelineError> {
        let store = self.artifacts.clone();
        let prefix = format!(
            "{}_{}_",
            ArtifactKind::Document.prefix(),
            doc.content().number.get()
        );
        let bytes = doc.to_xml_document().into_bytes();
        let found = tokio::task::spawn_blocking({
            let bytes = bytes.clone();
            move || -> Result<Option<Artifact>, nfe_store::StoreError> {
                for name in store.list(ArtifactLocation::Failed)? {
                    if !name.starts_with(&prefix) {
                        continue;
                    }
                    let artifact = Artifact {
                        kind: ArtifactKind::Document,
                        location: ArtifactLocation::Failed,
                        path: store.dir(ArtifactLocation::Failed).join(&name),
                        file_name: name,
                    };
                    if store.read(&artifact)? == bytes {
                        return Ok(Some(artifact));
                    }
                }
                Ok(None)
            }
        })
        .await??;
        match found {
            Some(artifact) => Ok(artifact),
            None => {
                tracing::warn!(access_key = %doc.access_key(), "failed artifact missing, rewriting from record");
                let artifact = self
                    .write_artifact(ArtifactKind::Document, doc.content().number.get().to_string(), bytes)
                    .await?;
                self.move_artifact(&artifact, ArtifactLocation::Failed).await
            }
        }
    }
}

/// Batch ids only need to be unique per issuer for a while; seeding from
/// the clock keeps restarts from repeating recent ones.
fn seed_batch_id() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(1) % (payload::MAX_BATCH_ID + 1)
}
