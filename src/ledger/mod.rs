//! Order ledger gateway.
//!
//! The ledger is an external spreadsheet-like collaborator; this module
//! only defines the row schema, the [`LedgerGateway`] contract, and a
//! thin HTTP adapter ([`HttpLedger`]).  The ledger is the single source
//! of truth for an order's lifecycle — records are appended at
//! submission, updated by the orchestrator, and never deleted here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{Artifact, ArtifactKind, OrderStatus};
use crate::retry::Recoverable;

pub mod http;
#[cfg(test)]
pub mod memory;

pub use http::HttpLedger;

// ---------------------------------------------------------------------------
// OrderRecord
// ---------------------------------------------------------------------------

/// One ledger row.  Field order mirrors the ledger's insertion-order
/// columns: order id, timestamp, name, email, audio reference, column
/// choice, color choice, status, payment id, comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Publicly fetchable audio URL, when the intake layer stored one.
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Storage key of the uploaded audio; a public URL can be re-derived
    /// from it when `audio_url` is absent or expired.
    #[serde(default)]
    pub audio_key: Option<String>,
    #[serde(default)]
    pub columns: String,
    #[serde(default)]
    pub color: String,
    /// Free-form status text.  Writes always go through [`OrderStatus`];
    /// reads must tolerate anything.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub comments: String,
    /// 1-based row index in the underlying sheet, when the gateway knows
    /// it.  Used by the simple mark-processed fallback update.
    #[serde(default)]
    pub row: Option<u64>,
}

impl OrderRecord {
    /// A fresh `Pending` row, timestamped now.
    pub fn new(
        order_id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        audio_url: impl Into<String>,
        columns: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            timestamp: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            name: name.into(),
            email: email.into(),
            audio_url: Some(audio_url.into()),
            audio_key: None,
            columns: columns.into(),
            color: color.into(),
            status: OrderStatus::Pending.to_string(),
            payment_id: None,
            comments: String::new(),
            row: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactLinks
// ---------------------------------------------------------------------------

/// The artifact link set published to the ledger on delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLinks {
    pub transcript: Option<String>,
    pub document: Option<String>,
    pub document_pdf: Option<String>,
    pub quiz_document: Option<String>,
    pub quiz_pdf: Option<String>,
}

impl ArtifactLinks {
    /// Collect the links of every successfully uploaded artifact.
    pub fn from_artifacts(artifacts: &[Artifact]) -> Self {
        let mut links = Self::default();
        for artifact in artifacts.iter().filter(|a| a.uploaded) {
            let slot = match artifact.kind {
                ArtifactKind::Transcript => &mut links.transcript,
                ArtifactKind::Document => &mut links.document,
                ArtifactKind::DocumentPdf => &mut links.document_pdf,
                ArtifactKind::QuizDocument => &mut links.quiz_document,
                ArtifactKind::QuizPdf => &mut links.quiz_pdf,
            };
            *slot = artifact.url.clone();
        }
        links
    }
}

// ---------------------------------------------------------------------------
// LedgerError
// ---------------------------------------------------------------------------

/// Errors from the ledger gateway.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transport error or upstream 5xx.
    #[error("ledger request failed: {0}")]
    Http(String),

    /// The request did not complete within the configured timeout.
    #[error("ledger request timed out")]
    Timeout,

    /// The response could not be decoded as ledger rows.
    #[error("failed to decode ledger response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LedgerError::Timeout
        } else {
            LedgerError::Http(e.to_string())
        }
    }
}

impl Recoverable for LedgerError {
    fn is_recoverable(&self) -> bool {
        matches!(self, LedgerError::Http(_) | LedgerError::Timeout)
    }
}

// ---------------------------------------------------------------------------
// LedgerGateway trait
// ---------------------------------------------------------------------------

/// Read/append/update contract over the order ledger.
///
/// Implementors must be `Send + Sync` so they can be held behind an
/// `Arc<dyn LedgerGateway>`.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Append a new row.
    async fn append(&self, record: &OrderRecord) -> Result<(), LedgerError>;

    /// Primary lookup by order id.
    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<OrderRecord>, LedgerError>;

    /// All rows whose status denotes a not-yet-fulfilled order.
    async fn list_pending(&self) -> Result<Vec<OrderRecord>, LedgerError>;

    /// Last-resort direct read of every underlying row.
    async fn all_rows(&self) -> Result<Vec<OrderRecord>, LedgerError>;

    /// Rich update: status plus, optionally, the artifact link set.
    async fn update(
        &self,
        order_id: &str,
        status: &OrderStatus,
        links: Option<&ArtifactLinks>,
    ) -> Result<(), LedgerError>;

    /// Simple fallback update: mark the row at `row` (1-based) processed
    /// without links.
    async fn mark_processed(&self, row: u64) -> Result<(), LedgerError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
