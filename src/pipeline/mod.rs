//! Order fulfillment pipeline.
//!
//! [`Orchestrator`](runner::Orchestrator) owns the stage sequence that
//! turns a paid order's audio into delivered artifacts:
//!
//! ```text
//! resolve order ─▶ resolve audio ─▶ transcribe ─▶ backup transcript
//!   ─▶ chunk + transform blocks ─▶ assemble ─▶ extract structure
//!   ─▶ generate quiz ─▶ render document + quiz ─▶ convert to PDF
//!   ─▶ upload artifacts ─▶ update ledger ─▶ notify customer
//! ```
//!
//! Every network call is wrapped by the retry executor; best-effort side
//! effects (transcript backup, image lookup, PDF conversion, uploads)
//! degrade instead of aborting.  A fatal stage failure writes
//! `Error: <stage>: <detail>` to the ledger and aborts the remaining
//! stages.

use thiserror::Error;

use crate::order::Artifact;

pub mod runner;

pub use runner::{Orchestrator, Services};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Pipeline stages, used to label errors for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Creating the run's scoped temp directory.
    Workspace,
    /// Resolving order metadata from the ledger.
    ResolveOrder,
    /// Resolving a fetchable audio reference.
    ResolveAudio,
    /// Speech-to-text.
    Transcribe,
    /// Chunked block transformation.
    Transform,
    /// Reassembling transformed blocks.
    Assemble,
    /// Heading/section extraction.
    Extract,
    /// Quiz generation.
    Quiz,
    /// Rendering the document and quiz to page layout.
    Render,
    /// Fixed-layout conversion.
    Convert,
    /// Artifact uploads.
    Upload,
    /// Final ledger update.
    UpdateLedger,
    /// Customer notification.
    Notify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Workspace => "workspace",
            Stage::ResolveOrder => "resolve-order",
            Stage::ResolveAudio => "resolve-audio",
            Stage::Transcribe => "transcribe",
            Stage::Transform => "transform",
            Stage::Assemble => "assemble",
            Stage::Extract => "extract",
            Stage::Quiz => "quiz",
            Stage::Render => "render",
            Stage::Convert => "convert",
            Stage::Upload => "upload",
            Stage::UpdateLedger => "update-ledger",
            Stage::Notify => "notify",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FulfillmentError
// ---------------------------------------------------------------------------

/// A fatal pipeline failure, labeled with the stage that raised it.
#[derive(Debug, Error)]
#[error("stage {stage} failed: {message}")]
pub struct FulfillmentError {
    pub stage: Stage,
    pub message: String,
}

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

/// How a fulfillment run ended without a fatal error.
#[derive(Debug)]
pub enum RunOutcome {
    /// All stages completed; the customer was notified.
    Delivered { artifacts: Vec<Artifact> },
    /// The idempotency guard found the order already fulfilled; no stage
    /// was executed.
    AlreadyFulfilled { status: String },
    /// Another run holds the order's lock; no stage was executed.
    LockHeld,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_labels_are_stable() {
        assert_eq!(Stage::ResolveAudio.as_str(), "resolve-audio");
        assert_eq!(Stage::Transcribe.as_str(), "transcribe");
        assert_eq!(Stage::UpdateLedger.as_str(), "update-ledger");
    }

    #[test]
    fn fulfillment_error_display_names_the_stage() {
        let err = FulfillmentError {
            stage: Stage::Transcribe,
            message: "upstream timed out".into(),
        };
        assert_eq!(err.to_string(), "stage transcribe failed: upstream timed out");
    }
}
