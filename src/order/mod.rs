//! Order lifecycle status and artifact bookkeeping.
//!
//! [`OrderStatus`] drives the fulfillment state machine.  Writes to the
//! ledger always go through this closed enum; reads stay tolerant of the
//! free-form status strings humans (and older deployments) have left in
//! the ledger — see [`status_is_fulfilled`].
//!
//! [`Artifact`] tracks one produced output file from creation in the run's
//! temp directory through upload.

use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Product naming
// ---------------------------------------------------------------------------

/// Product name used for the rewritten document's artifact files.
pub const PRODUCT_NAME: &str = "LecturePress";

/// Product name used for the quiz counterpart's artifact files.
pub const QUIZ_PRODUCT_NAME: &str = "LectureQuiz";

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// States of an order's fulfillment lifecycle.
///
/// Transitions are monotonic except for `Error`, which is reachable from
/// any in-progress state:
///
/// ```text
/// Pending ──payment confirmed──▶ Paid
/// Paid ──fulfillment invoked───▶ Processing   (guarded by the order lock)
/// Processing ──all stages ok───▶ Delivered
/// Processing ──fatal stage err─▶ Error { stage, detail }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    /// Order submitted, payment not yet confirmed.
    Pending,

    /// Payment confirmed; fulfillment not yet started.
    Paid,

    /// A fulfillment run is in progress.
    Processing,

    /// All artifacts produced and the customer notified.
    Delivered,

    /// A stage failed fatally.  `stage` names the stage for operators;
    /// `detail` preserves the upstream message.
    Error { stage: String, detail: String },
}

impl OrderStatus {
    /// Error status for a named stage.
    pub fn error(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        OrderStatus::Error {
            stage: stage.into(),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "Pending"),
            OrderStatus::Paid => write!(f, "Paid"),
            OrderStatus::Processing => write!(f, "Processing"),
            OrderStatus::Delivered => write!(f, "Delivered"),
            OrderStatus::Error { stage, detail } => write!(f, "Error: {stage}: {detail}"),
        }
    }
}

/// Returns `true` when a ledger status string denotes a finished order.
///
/// The ledger's status column is free-form text; this guard matches
/// case-insensitive substrings rather than exact values so it tolerates
/// strings written by hand.  The legacy Spanish values written by earlier
/// deployments are accepted alongside the English ones.
pub fn status_is_fulfilled(status: &str) -> bool {
    let status = status.trim().to_lowercase();
    ["delivered", "processed", "entregado", "procesado"]
        .iter()
        .any(|done| status.contains(done))
}

// ---------------------------------------------------------------------------
// ArtifactKind
// ---------------------------------------------------------------------------

/// The five kinds of output file a fulfillment run can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Raw transcript text, backed up as-is.
    Transcript,
    /// The rewritten document in page-layout format.
    Document,
    /// Fixed-layout conversion of the document.
    DocumentPdf,
    /// The quiz document in page-layout format.
    QuizDocument,
    /// Fixed-layout conversion of the quiz document.
    QuizPdf,
}

impl ArtifactKind {
    /// File name for this artifact under the delivery naming convention:
    /// `"<product> - Nº<order_id>.<ext>"`, except the raw transcript which
    /// is just `"<order_id>.txt"`.
    pub fn file_name(&self, order_id: &str) -> String {
        match self {
            ArtifactKind::Transcript => format!("{order_id}.txt"),
            ArtifactKind::Document => format!("{PRODUCT_NAME} - Nº{order_id}.docx"),
            ArtifactKind::DocumentPdf => format!("{PRODUCT_NAME} - Nº{order_id}.pdf"),
            ArtifactKind::QuizDocument => format!("{QUIZ_PRODUCT_NAME} - Nº{order_id}.docx"),
            ArtifactKind::QuizPdf => format!("{QUIZ_PRODUCT_NAME} - Nº{order_id}.pdf"),
        }
    }

    /// Short machine label, used as the link key in ledger updates.
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Transcript => "transcript",
            ArtifactKind::Document => "document",
            ArtifactKind::DocumentPdf => "document_pdf",
            ArtifactKind::QuizDocument => "quiz_document",
            ArtifactKind::QuizPdf => "quiz_pdf",
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// One produced output file, tracked from the run's temp directory through
/// upload.  Never mutated after a successful upload.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    /// File name per [`ArtifactKind::file_name`].
    pub name: String,
    /// Location in the run's scoped temp directory.
    pub local_path: PathBuf,
    /// Public URL once uploaded.
    pub url: Option<String>,
    /// Whether the upload succeeded.  Uploads are best-effort; a `false`
    /// here never aborts the run.
    pub uploaded: bool,
}

impl Artifact {
    /// A freshly produced, not-yet-uploaded artifact.
    pub fn new(kind: ArtifactKind, order_id: &str, local_path: PathBuf) -> Self {
        Self {
            kind,
            name: kind.file_name(order_id),
            local_path,
            url: None,
            uploaded: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- OrderStatus::Display ---

    #[test]
    fn display_plain_states() {
        assert_eq!(OrderStatus::Pending.to_string(), "Pending");
        assert_eq!(OrderStatus::Paid.to_string(), "Paid");
        assert_eq!(OrderStatus::Processing.to_string(), "Processing");
        assert_eq!(OrderStatus::Delivered.to_string(), "Delivered");
    }

    #[test]
    fn display_error_carries_stage_and_detail() {
        let status = OrderStatus::error("transcribe", "upstream timed out");
        assert_eq!(status.to_string(), "Error: transcribe: upstream timed out");
    }

    // ---- status_is_fulfilled ---

    #[test]
    fn fulfilled_matches_delivered_and_processed() {
        assert!(status_is_fulfilled("Delivered"));
        assert!(status_is_fulfilled("processed"));
        assert!(status_is_fulfilled("  DELIVERED (manual) "));
    }

    #[test]
    fn fulfilled_accepts_legacy_spanish_values() {
        assert!(status_is_fulfilled("Entregado"));
        assert!(status_is_fulfilled("Procesado"));
        assert!(status_is_fulfilled("procesado a mano"));
    }

    #[test]
    fn fulfilled_rejects_in_progress_states() {
        assert!(!status_is_fulfilled("Pending"));
        assert!(!status_is_fulfilled("Paid"));
        assert!(!status_is_fulfilled("Processing"));
        assert!(!status_is_fulfilled("Error: transcribe: boom"));
        assert!(!status_is_fulfilled(""));
    }

    // ---- ArtifactKind::file_name ---

    #[test]
    fn transcript_is_named_by_order_id_only() {
        assert_eq!(ArtifactKind::Transcript.file_name("ab12"), "ab12.txt");
    }

    #[test]
    fn document_names_follow_the_product_convention() {
        assert_eq!(
            ArtifactKind::Document.file_name("ab12"),
            "LecturePress - Nºab12.docx"
        );
        assert_eq!(
            ArtifactKind::DocumentPdf.file_name("ab12"),
            "LecturePress - Nºab12.pdf"
        );
        assert_eq!(
            ArtifactKind::QuizDocument.file_name("ab12"),
            "LectureQuiz - Nºab12.docx"
        );
        assert_eq!(
            ArtifactKind::QuizPdf.file_name("ab12"),
            "LectureQuiz - Nºab12.pdf"
        );
    }

    // ---- Artifact ---

    #[test]
    fn new_artifact_starts_unuploaded() {
        let artifact = Artifact::new(ArtifactKind::Document, "ab12", PathBuf::from("/tmp/x.docx"));
        assert_eq!(artifact.name, "LecturePress - Nºab12.docx");
        assert!(artifact.url.is_none());
        assert!(!artifact.uploaded);
    }
}
