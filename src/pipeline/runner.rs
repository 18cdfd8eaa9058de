//! Pipeline orchestrator — drives one order's fulfillment run.
//!
//! [`Orchestrator`] owns the capability seams ([`Services`]) and the
//! state machine:
//!
//! | From | Trigger | To |
//! |---|---|---|
//! | Paid | fulfillment invoked | Processing |
//! | Processing | all stages succeed | Delivered |
//! | Processing | fatal stage error | Error: stage |
//! | Delivered / processed | fulfillment invoked again | no-op |
//!
//! Before doing any work the run acquires the per-order lock and checks
//! the idempotency guard; a completed order returns immediately without
//! side effects.  Scoped temp storage is a [`tempfile::TempDir`] and is
//! released on every exit path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::generate::TextGenerator;
use crate::ledger::{ArtifactLinks, LedgerGateway, OrderRecord};
use crate::lock::OrderLock;
use crate::mail::Mailer;
use crate::order::{
    status_is_fulfilled, Artifact, ArtifactKind, OrderStatus, PRODUCT_NAME, QUIZ_PRODUCT_NAME,
};
use crate::quiz::QuizBuilder;
use crate::render::{DocumentRenderer, PdfConverter, RenderOptions};
use crate::retry::{with_retry, RetryPolicy};
use crate::rewrite::BlockRewriter;
use crate::storage::ObjectStore;
use crate::structure::{attach_images, extract_sections, ImageFinder};
use crate::text;
use crate::transcribe::Transcriber;

use super::{FulfillmentError, RunOutcome, Stage};

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// The capability seams a fulfillment run drives.
///
/// Built once at startup from configuration — one concrete adapter per
/// capability — and shared across runs.
pub struct Services {
    pub ledger: Arc<dyn LedgerGateway>,
    pub storage: Arc<dyn ObjectStore>,
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn TextGenerator>,
    pub image_finder: Arc<dyn ImageFinder>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub converter: Arc<dyn PdfConverter>,
    pub mailer: Arc<dyn Mailer>,
    pub lock: Arc<OrderLock>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences the fulfillment stages for single orders.
///
/// Distinct orders may run concurrently; within a run the stages are
/// strictly sequential with suspension only at external-call boundaries.
pub struct Orchestrator {
    services: Services,
    config: AppConfig,
}

impl Orchestrator {
    pub fn new(services: Services, config: AppConfig) -> Self {
        Self { services, config }
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Run the full pipeline for `order_id`.
    ///
    /// Acquires the per-order lock for the duration of the run and
    /// releases it on every exit path.
    pub async fn fulfill(&self, order_id: &str) -> Result<RunOutcome, FulfillmentError> {
        let ttl = Duration::from_secs(self.config.lock.ttl_secs);

        if !self.services.lock.acquire(order_id, ttl).await {
            log::info!("order {order_id}: lock held by another run — skipping");
            return Ok(RunOutcome::LockHeld);
        }

        let result = self.run_stages(order_id).await;
        self.services.lock.release(order_id).await;
        result
    }

    /// Fulfill every pending order from the ledger, sequentially.
    /// Returns the number of orders delivered.
    pub async fn fulfill_pending(&self) -> usize {
        let policy = self.config.retry.policy();

        let pending = match with_retry(&policy, "ledger pending scan", || {
            self.services.ledger.list_pending()
        })
        .await
        {
            Ok(pending) => pending,
            Err(e) => {
                log::error!("could not list pending orders: {e}");
                return 0;
            }
        };

        log::info!("{} pending order(s) to fulfill", pending.len());

        let mut delivered = 0;
        for record in pending {
            match self.fulfill(&record.order_id).await {
                Ok(RunOutcome::Delivered { .. }) => delivered += 1,
                Ok(outcome) => log::info!("order {}: {outcome:?}", record.order_id),
                Err(e) => log::error!("order {}: {e}", record.order_id),
            }
        }
        delivered
    }

    // -----------------------------------------------------------------------
    // Stage sequence
    // -----------------------------------------------------------------------

    async fn run_stages(&self, order_id: &str) -> Result<RunOutcome, FulfillmentError> {
        let policy = self.config.retry.policy();

        // ── 1. Resolve order metadata ────────────────────────────────────
        let Some(record) = self.resolve_order(order_id, &policy).await else {
            // No ledger row means nowhere to write an error status.
            log::error!("order {order_id}: no ledger metadata found — aborting");
            return Err(FulfillmentError {
                stage: Stage::ResolveOrder,
                message: "order metadata not found in ledger".into(),
            });
        };

        // ── Idempotency guard ────────────────────────────────────────────
        if status_is_fulfilled(&record.status) {
            log::info!(
                "order {order_id}: status \"{}\" already denotes completion — skipping",
                record.status
            );
            return Ok(RunOutcome::AlreadyFulfilled {
                status: record.status,
            });
        }

        // Paid → Processing.  Advisory: the lock already guards double
        // work, so a failed status write does not stop the run.
        let processing = OrderStatus::Processing;
        if let Err(e) = with_retry(&policy, "mark processing", || {
            self.services.ledger.update(order_id, &processing, None)
        })
        .await
        {
            log::warn!("order {order_id}: could not mark Processing ({e}) — continuing");
        }

        // Scoped temp storage for the whole run; released on every exit
        // path when this guard drops.
        let workdir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => return Err(self.abort(order_id, Stage::Workspace, e.to_string()).await),
        };

        let mut artifacts: Vec<Artifact> = Vec::new();

        // ── 2. Resolve a fetchable audio reference ───────────────────────
        let audio_url = match self.resolve_audio(&record, &policy).await {
            Some(url) => url,
            None => {
                return Err(self
                    .abort(order_id, Stage::ResolveAudio, "no audio reference on order")
                    .await)
            }
        };
        log::info!("order {order_id}: audio reference resolved");

        // ── 3. Transcribe ────────────────────────────────────────────────
        let transcript = match with_retry(&policy, "transcribe", || {
            self.services.transcriber.transcribe(&audio_url)
        })
        .await
        {
            Ok(text) => text,
            Err(e) => return Err(self.abort(order_id, Stage::Transcribe, e.to_string()).await),
        };

        if transcript.split_whitespace().next().is_none() {
            return Err(self
                .abort(order_id, Stage::Transcribe, "transcription returned empty text")
                .await);
        }
        log::info!("order {order_id}: transcript ready ({} chars)", transcript.len());

        // ── 4. Back up the raw transcript (best-effort) ──────────────────
        let transcript_path = workdir.path().join(ArtifactKind::Transcript.file_name(order_id));
        match tokio::fs::write(&transcript_path, &transcript).await {
            Ok(()) => {
                let mut artifact =
                    Artifact::new(ArtifactKind::Transcript, order_id, transcript_path);
                self.upload_artifact(&mut artifact, &policy).await;
                artifacts.push(artifact);
            }
            Err(e) => log::warn!("order {order_id}: could not write transcript backup: {e}"),
        }

        // ── 5. Chunk and transform blocks sequentially ───────────────────
        let mut blocks = text::split(&transcript, self.config.pipeline.words_per_block);
        let total_blocks = blocks.len();
        log::info!("order {order_id}: transcript split into {total_blocks} block(s)");

        let rewriter =
            BlockRewriter::new(Arc::clone(&self.services.generator), policy.clone());
        for block in blocks.iter_mut() {
            rewriter.rewrite(block, total_blocks).await;
        }

        // ── 6. Assemble the final document ───────────────────────────────
        let document = text::assemble(&blocks);
        log::info!("order {order_id}: document assembled ({} chars)", document.len());

        // ── 7. Extract structure and look up images (best-effort) ────────
        let mut sections = extract_sections(&document);
        attach_images(&mut sections, self.services.image_finder.as_ref()).await;
        log::info!("order {order_id}: {} section(s) detected", sections.len());

        // ── 8. Generate the quiz ─────────────────────────────────────────
        let quiz_builder = QuizBuilder::new(
            Arc::clone(&self.services.generator),
            policy.clone(),
            self.config.pipeline.quiz_per_section,
        );
        let quiz = quiz_builder.generate(&sections).await;

        // ── 9. Render document and quiz ──────────────────────────────────
        let options = RenderOptions::from_choices(&record.color, &record.columns);
        let images: BTreeMap<u32, String> = sections
            .iter()
            .filter_map(|s| Some((s.page, s.image.clone()?)))
            .collect();

        let document_path = workdir.path().join(ArtifactKind::Document.file_name(order_id));
        if let Err(e) = with_retry(&policy, "render document", || {
            self.services
                .renderer
                .render_document(&document, &images, &options, &document_path)
        })
        .await
        {
            return Err(self
                .abort(order_id, Stage::Render, format!("document render failed: {e}"))
                .await);
        }
        artifacts.push(Artifact::new(ArtifactKind::Document, order_id, document_path.clone()));

        let quiz_path = workdir.path().join(ArtifactKind::QuizDocument.file_name(order_id));
        if let Err(e) = with_retry(&policy, "render quiz", || {
            self.services.renderer.render_quiz(&quiz, &options, &quiz_path)
        })
        .await
        {
            return Err(self
                .abort(order_id, Stage::Render, format!("quiz render failed: {e}"))
                .await);
        }
        artifacts.push(Artifact::new(ArtifactKind::QuizDocument, order_id, quiz_path.clone()));

        // ── 10. Convert to fixed layout (best-effort) ────────────────────
        if let Some(artifact) = self
            .convert_artifact(order_id, &document_path, ArtifactKind::DocumentPdf, workdir.path(), &policy)
            .await
        {
            artifacts.push(artifact);
        }
        if let Some(artifact) = self
            .convert_artifact(order_id, &quiz_path, ArtifactKind::QuizPdf, workdir.path(), &policy)
            .await
        {
            artifacts.push(artifact);
        }

        // ── 11. Upload artifacts (each independently best-effort) ────────
        for artifact in artifacts.iter_mut() {
            if !artifact.uploaded {
                self.upload_artifact(artifact, &policy).await;
            }
        }

        // ── 12. Update the ledger ────────────────────────────────────────
        let links = ArtifactLinks::from_artifacts(&artifacts);
        let delivered = OrderStatus::Delivered;
        if let Err(e) = with_retry(&policy, "ledger update", || {
            self.services.ledger.update(order_id, &delivered, Some(&links))
        })
        .await
        {
            log::warn!(
                "order {order_id}: rich ledger update failed ({e}) — trying mark-processed fallback"
            );
            match record.row {
                Some(row) => {
                    if let Err(e2) = with_retry(&policy, "ledger mark-processed", || {
                        self.services.ledger.mark_processed(row)
                    })
                    .await
                    {
                        return Err(self
                            .abort(
                                order_id,
                                Stage::UpdateLedger,
                                format!("rich update failed ({e}); mark-processed failed ({e2})"),
                            )
                            .await);
                    }
                }
                None => {
                    return Err(self
                        .abort(
                            order_id,
                            Stage::UpdateLedger,
                            format!("rich update failed ({e}) and row index unknown"),
                        )
                        .await)
                }
            }
        }

        // ── 13. Notify the customer ──────────────────────────────────────
        // Past the ledger update, a failure here is logged but never
        // written as an error status.
        self.notify(order_id, &record, &artifacts, &policy).await;

        log::info!("order {order_id}: delivered ({} artifact(s))", artifacts.len());
        Ok(RunOutcome::Delivered { artifacts })
    }

    // -----------------------------------------------------------------------
    // Stage helpers
    // -----------------------------------------------------------------------

    /// Documented fallback chain: lookup by id, then the pending scan,
    /// then a last-resort direct read of the underlying rows.
    async fn resolve_order(&self, order_id: &str, policy: &RetryPolicy) -> Option<OrderRecord> {
        match with_retry(policy, "ledger lookup", || {
            self.services.ledger.find_by_order_id(order_id)
        })
        .await
        {
            Ok(Some(record)) => return Some(record),
            Ok(None) => {
                log::warn!("order {order_id}: not found by id — scanning pending orders")
            }
            Err(e) => {
                log::warn!("order {order_id}: primary lookup failed ({e}) — scanning pending orders")
            }
        }

        match with_retry(policy, "ledger pending scan", || {
            self.services.ledger.list_pending()
        })
        .await
        {
            Ok(pending) => {
                if let Some(record) = pending.into_iter().find(|r| r.order_id == order_id) {
                    return Some(record);
                }
                log::warn!("order {order_id}: not among pending — reading raw rows");
            }
            Err(e) => log::warn!("order {order_id}: pending scan failed ({e}) — reading raw rows"),
        }

        match with_retry(policy, "ledger raw read", || self.services.ledger.all_rows()).await {
            Ok(rows) => rows.into_iter().find(|r| r.order_id == order_id),
            Err(e) => {
                log::error!("order {order_id}: raw ledger read failed: {e}");
                None
            }
        }
    }

    /// The ledger's audio URL when present, else a URL re-derived from
    /// the stored audio key.
    async fn resolve_audio(&self, record: &OrderRecord, policy: &RetryPolicy) -> Option<String> {
        if let Some(url) = record.audio_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Some(url.to_string());
        }

        let key = record.audio_key.as_deref().filter(|k| !k.trim().is_empty())?;
        log::info!(
            "order {}: no audio URL on record — re-deriving from stored key",
            record.order_id
        );

        match with_retry(policy, "storage url_for", || self.services.storage.url_for(key)).await {
            Ok(url) => Some(url),
            Err(e) => {
                log::error!("order {}: could not re-derive audio URL: {e}", record.order_id);
                None
            }
        }
    }

    /// Upload one artifact, best-effort.  Failure is logged and leaves
    /// the artifact unuploaded; it never aborts the run.
    async fn upload_artifact(&self, artifact: &mut Artifact, policy: &RetryPolicy) {
        let label = format!("upload {}", artifact.name);
        match with_retry(policy, &label, || {
            self.services.storage.upload(&artifact.local_path, &artifact.name)
        })
        .await
        {
            Ok(url) => {
                log::info!("{label}: done");
                artifact.url = Some(url);
                artifact.uploaded = true;
            }
            Err(e) => log::warn!("{label}: failed ({e}) — continuing without it"),
        }
    }

    /// Convert one rendered file to fixed layout, best-effort.  Returns
    /// `None` (and logs) when conversion fails — the artifact is simply
    /// omitted from delivery.
    async fn convert_artifact(
        &self,
        order_id: &str,
        source: &Path,
        kind: ArtifactKind,
        workdir: &Path,
        policy: &RetryPolicy,
    ) -> Option<Artifact> {
        let out_path = workdir.join(kind.file_name(order_id));
        let label = format!("convert {}", kind.label());

        match with_retry(policy, &label, || {
            self.services.converter.convert(source, &out_path)
        })
        .await
        {
            Ok(()) => Some(Artifact::new(kind, order_id, out_path)),
            Err(e) => {
                log::warn!("order {order_id}: {label} failed ({e}) — artifact omitted");
                None
            }
        }
    }

    /// Send the delivery notification with every produced document
    /// attached (the raw transcript stays out of the email).
    async fn notify(
        &self,
        order_id: &str,
        record: &OrderRecord,
        artifacts: &[Artifact],
        policy: &RetryPolicy,
    ) {
        let email = record.email.trim();
        if email.is_empty() {
            log::warn!("order {order_id}: no customer email on record — skipping notification");
            return;
        }

        let to = vec![email.to_string()];
        let subject = notification_subject(order_id);
        let body = notification_body();
        let attachments: Vec<PathBuf> = artifacts
            .iter()
            .filter(|a| a.kind != ArtifactKind::Transcript)
            .map(|a| a.local_path.clone())
            .collect();

        match with_retry(policy, "notify customer", || {
            self.services.mailer.send(&to, &subject, &body, &attachments)
        })
        .await
        {
            Ok(()) => log::info!("order {order_id}: notification sent to {email}"),
            Err(e) => log::error!("order {order_id}: notification failed: {e}"),
        }
    }

    /// Record a fatal stage failure in the ledger (best-effort) and
    /// build the error that aborts the run.
    async fn abort(
        &self,
        order_id: &str,
        stage: Stage,
        detail: impl Into<String>,
    ) -> FulfillmentError {
        let detail = detail.into();
        log::error!("order {order_id}: stage {stage} failed: {detail}");

        let status = OrderStatus::error(stage.as_str(), &detail);
        if let Err(e) = self.services.ledger.update(order_id, &status, None).await {
            log::warn!("order {order_id}: could not record error status: {e}");
        }

        FulfillmentError {
            stage,
            message: detail,
        }
    }
}

fn notification_subject(order_id: &str) -> String {
    format!("Your {PRODUCT_NAME} order Nº{order_id} is ready")
}

fn notification_body() -> String {
    format!(
        "<p>Hello,</p>\
         <p>Attached are your {PRODUCT_NAME} document and its {QUIZ_PRODUCT_NAME} companion.</p>\
         <p>Thank you for studying with {PRODUCT_NAME}.</p>"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
