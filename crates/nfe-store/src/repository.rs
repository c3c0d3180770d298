//! # Lifecycle Repository
//!
//! SQLite persistence for document lifecycle records. All functions take a
//! `&SqlitePool`.
//!
//! - `documents`: one row per access key. Query columns (state, number,
//!   protocol) plus the full [`DocumentSnapshot`] as JSON.
//! - `transitions`: append-only history, one row per state change.
//! - `void_ranges`: accepted and refused number voiding requests.
//! - `events`: every answer to a cancellation event, refusals included.
//!
//! Saving a document upserts its row and appends the transitions not yet
//! stored, in one transaction.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use nfe_core::{AccessKey, DocumentNumber, Environment, SequenceKey, Timestamp, TransmissionResult};
use nfe_state::{
    CancellationEvent, DocumentSnapshot, DocumentState, FiscalDocument, TransitionRecord, VoidRange,
    CANCELLATION_EVENT_TYPE,
};

use crate::error::StoreError;

/// Open (creating if missing) the database at `url` and apply migrations.
///
/// `sqlite::memory:` gives a private in-memory database held by a single
/// connection.
pub async fn connect(url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let in_memory = url.contains(":memory:");
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 4 })
        .idle_timeout(None)
        .max_lifetime(None)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(in_memory, "lifecycle database ready");
    Ok(pool)
}

// ─── Documents ───────────────────────────────────────────────────────

/// Stored view of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub access_key: String,
    pub series: u16,
    pub environment: Environment,
    pub number: u32,
    pub state: DocumentState,
    /// `cStat` of the latest authority answer.
    pub status_code: Option<u16>,
    pub motive: Option<String>,
    /// Authorization protocol (`nProt`).
    pub protocol: Option<String>,
    /// Asynchronous batch receipt (`nRec`), if one was issued.
    pub receipt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub snapshot: DocumentSnapshot,
}

impl DocumentRecord {
    /// Rebuild the aggregate.
    pub fn to_document(&self) -> Result<FiscalDocument, StoreError> {
        Ok(FiscalDocument::restore(self.snapshot.clone())?)
    }
}

/// Insert or update a document and append its new transitions.
pub async fn save_document(pool: &SqlitePool, doc: &FiscalDocument) -> Result<(), StoreError> {
    let snapshot = serde_json::to_string(&doc.snapshot())?;
    let content = doc.content();
    let key = content.access_key.as_str();
    let latest = doc.cancellation().or(doc.transmission());

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO documents (access_key, series, environment, number, state,
         status_code, motive, protocol, receipt, snapshot, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT (access_key) DO UPDATE SET
           state = excluded.state,
           status_code = excluded.status_code,
           motive = excluded.motive,
           protocol = excluded.protocol,
           receipt = excluded.receipt,
           snapshot = excluded.snapshot,
           updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(i64::from(content.series.get()))
    .bind(content.environment.as_str())
    .bind(i64::from(content.number.get()))
    .bind(doc.state().as_str())
    .bind(latest.map(|r| i64::from(r.status_code)))
    .bind(latest.map(|r| r.motive.as_str()))
    .bind(doc.authorization_protocol())
    .bind(doc.transmission().and_then(|r| r.receipt.as_deref()))
    .bind(&snapshot)
    .bind(*doc.created_at().as_datetime())
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transitions WHERE access_key = ?1")
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;
    let stored = usize::try_from(stored).unwrap_or(0);
    for (seq, t) in doc.transitions().iter().enumerate().skip(stored) {
        sqlx::query(
            "INSERT INTO transitions (access_key, seq, from_state, to_state, occurred_at, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(key)
        .bind(seq as i64)
        .bind(t.from_state.as_str())
        .bind(t.to_state.as_str())
        .bind(*t.timestamp.as_datetime())
        .bind(&t.reason)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::debug!(access_key = key, state = %doc.state(), "lifecycle record saved");
    Ok(())
}

const DOCUMENT_COLUMNS: &str = "access_key, series, environment, number, state, status_code,
     motive, protocol, receipt, snapshot, created_at, updated_at";

pub async fn find_by_access_key(pool: &SqlitePool, key: &AccessKey) -> Result<Option<DocumentRecord>, StoreError> {
    let row = sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE access_key = ?1"
    ))
    .bind(key.as_str())
    .fetch_optional(pool)
    .await?;
    row.map(DocumentRow::into_record).transpose()
}

/// Documents of one series and environment with `from <= number <= to`,
/// in number order.
pub async fn find_by_number_range(
    pool: &SqlitePool,
    key: SequenceKey,
    from: DocumentNumber,
    to: DocumentNumber,
) -> Result<Vec<DocumentRecord>, StoreError> {
    let rows = sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE series = ?1 AND environment = ?2 AND number BETWEEN ?3 AND ?4
         ORDER BY number"
    ))
    .bind(i64::from(key.series.get()))
    .bind(key.environment.as_str())
    .bind(i64::from(from.get()))
    .bind(i64::from(to.get()))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(DocumentRow::into_record).collect()
}

/// Documents currently in `state`, oldest first.
pub async fn find_by_state(pool: &SqlitePool, state: DocumentState) -> Result<Vec<DocumentRecord>, StoreError> {
    let rows = sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE state = ?1 ORDER BY created_at"
    ))
    .bind(state.as_str())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(DocumentRow::into_record).collect()
}

pub async fn list_transitions(pool: &SqlitePool, key: &AccessKey) -> Result<Vec<TransitionRecord>, StoreError> {
    let rows = sqlx::query_as::<_, TransitionRow>(
        "SELECT from_state, to_state, occurred_at, reason
         FROM transitions WHERE access_key = ?1 ORDER BY seq",
    )
    .bind(key.as_str())
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|row| row.into_record(key.as_str()))
        .collect()
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    access_key: String,
    series: i64,
    environment: String,
    number: i64,
    state: String,
    status_code: Option<i64>,
    motive: Option<String>,
    protocol: Option<String>,
    receipt: Option<String>,
    snapshot: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRow {
    fn into_record(self) -> Result<DocumentRecord, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: self.access_key.clone(),
            reason,
        };
        let series = u16::try_from(self.series).map_err(|e| corrupt(format!("series: {e}")))?;
        let number = u32::try_from(self.number).map_err(|e| corrupt(format!("number: {e}")))?;
        let environment =
            Environment::from_str(&self.environment).map_err(|e| corrupt(e.to_string()))?;
        let state = DocumentState::from_str(&self.state).map_err(|e| corrupt(e.to_string()))?;
        let status_code = self
            .status_code
            .map(u16::try_from)
            .transpose()
            .map_err(|e| corrupt(format!("status code: {e}")))?;
        let snapshot: DocumentSnapshot = serde_json::from_str(&self.snapshot)?;
        if snapshot.state != state {
            return Err(corrupt(format!(
                "row state {state} disagrees with snapshot state {}",
                snapshot.state
            )));
        }
        Ok(DocumentRecord {
            access_key: self.access_key,
            series,
            environment,
            number,
            state,
            status_code,
            motive: self.motive,
            protocol: self.protocol,
            receipt: self.receipt,
            created_at: self.created_at,
            updated_at: self.updated_at,
            snapshot,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransitionRow {
    from_state: String,
    to_state: String,
    occurred_at: DateTime<Utc>,
    reason: String,
}

impl TransitionRow {
    fn into_record(self, key: &str) -> Result<TransitionRecord, StoreError> {
        let state = |s: &str| {
            DocumentState::from_str(s).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
        };
        Ok(TransitionRecord {
            from_state: state(&self.from_state)?,
            to_state: state(&self.to_state)?,
            timestamp: Timestamp::from_utc(self.occurred_at),
            reason: self.reason,
        })
    }
}

// ─── Void ranges ─────────────────────────────────────────────────────

/// Stored void range request and the authority's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoidRangeRecord {
    pub element_id: String,
    pub series: u16,
    pub environment: Environment,
    pub first: u32,
    pub last: u32,
    pub status_code: u16,
    pub motive: String,
    pub protocol: Option<String>,
    pub justification: String,
    pub recorded_at: DateTime<Utc>,
}

impl VoidRangeRecord {
    pub fn accepted(&self) -> bool {
        self.status_code == nfe_core::transmission::STATUS_VOID_ACCEPTED
    }
}

/// Record a void range request with its answer. A repeated request for the
/// same range replaces the earlier answer.
pub async fn record_void_range(
    pool: &SqlitePool,
    range: &VoidRange,
    result: &TransmissionResult,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO void_ranges (element_id, series, environment, first_number, last_number,
         status_code, motive, protocol, justification, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT (element_id) DO UPDATE SET
           status_code = excluded.status_code,
           motive = excluded.motive,
           protocol = excluded.protocol,
           recorded_at = excluded.recorded_at",
    )
    .bind(range.element_id())
    .bind(i64::from(range.series.get()))
    .bind(range.environment.as_str())
    .bind(i64::from(range.first.get()))
    .bind(i64::from(range.last.get()))
    .bind(i64::from(result.status_code))
    .bind(&result.motive)
    .bind(result.protocol.as_deref())
    .bind(range.justification.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_void_ranges(pool: &SqlitePool, key: SequenceKey) -> Result<Vec<VoidRangeRecord>, StoreError> {
    let rows = sqlx::query_as::<_, VoidRangeRow>(
        "SELECT element_id, series, environment, first_number, last_number, status_code,
         motive, protocol, justification, recorded_at
         FROM void_ranges WHERE series = ?1 AND environment = ?2 ORDER BY first_number",
    )
    .bind(i64::from(key.series.get()))
    .bind(key.environment.as_str())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(VoidRangeRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct VoidRangeRow {
    element_id: String,
    series: i64,
    environment: String,
    first_number: i64,
    last_number: i64,
    status_code: i64,
    motive: String,
    protocol: Option<String>,
    justification: String,
    recorded_at: DateTime<Utc>,
}

impl VoidRangeRow {
    fn into_record(self) -> Result<VoidRangeRecord, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: self.element_id.clone(),
            reason,
        };
        Ok(VoidRangeRecord {
            series: u16::try_from(self.series).map_err(|e| corrupt(e.to_string()))?,
            environment: Environment::from_str(&self.environment).map_err(|e| corrupt(e.to_string()))?,
            first: u32::try_from(self.first_number).map_err(|e| corrupt(e.to_string()))?,
            last: u32::try_from(self.last_number).map_err(|e| corrupt(e.to_string()))?,
            status_code: u16::try_from(self.status_code).map_err(|e| corrupt(e.to_string()))?,
            element_id: self.element_id,
            motive: self.motive,
            protocol: self.protocol,
            justification: self.justification,
            recorded_at: self.recorded_at,
        })
    }
}

// ─── Events ──────────────────────────────────────────────────────────

/// Stored answer to one cancellation event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub access_key: String,
    /// `tpEvento`, `110111` for cancellation.
    pub event_type: String,
    pub sequence: u8,
    pub status_code: u16,
    pub motive: String,
    /// Event registration protocol, when accepted.
    pub protocol: Option<String>,
    pub justification: String,
    pub recorded_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn accepted(&self) -> bool {
        nfe_core::transmission::CANCEL_ACCEPTED.contains(&self.status_code)
    }
}

/// Append the authority's answer to a cancellation event.
pub async fn record_cancellation(
    pool: &SqlitePool,
    event: &CancellationEvent,
    result: &TransmissionResult,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO events (access_key, event_type, sequence, status_code, motive, protocol,
         justification, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(event.access_key.as_str())
    .bind(CANCELLATION_EVENT_TYPE)
    .bind(i64::from(event.sequence))
    .bind(i64::from(result.status_code))
    .bind(&result.motive)
    .bind(result.protocol.as_deref())
    .bind(event.justification.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Event answers for `key`, oldest first.
pub async fn list_events(pool: &SqlitePool, key: &AccessKey) -> Result<Vec<EventRecord>, StoreError> {
    let rows = sqlx::query_as::<_, EventRow>(
        "SELECT access_key, event_type, sequence, status_code, motive, protocol, justification,
         recorded_at FROM events WHERE access_key = ?1 ORDER BY id",
    )
    .bind(key.as_str())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(EventRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct EventRow {
    access_key: String,
    event_type: String,
    sequence: i64,
    status_code: i64,
    motive: String,
    protocol: Option<String>,
    justification: String,
    recorded_at: DateTime<Utc>,
}

impl EventRow {
    fn into_record(self) -> Result<EventRecord, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: self.access_key.clone(),
            reason,
        };
        Ok(EventRecord {
            sequence: u8::try_from(self.sequence).map_err(|e| corrupt(e.to_string()))?,
            status_code: u16::try_from(self.status_code).map_err(|e| corrupt(e.to_string()))?,
            access_key: self.access_key,
            event_type: self.event_type,
            motive: self.motive,
            protocol: self.protocol,
            justification: self.justification,
            recorded_at: self.recorded_at,
        })
    }
}
