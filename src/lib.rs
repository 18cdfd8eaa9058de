//! LecturePress — paid-order fulfillment pipeline.
//!
//! Turns a paid order's audio recording into a delivered document set: a
//! long-form rewritten transcript and an accompanying quiz, rendered,
//! converted, uploaded, recorded in the order ledger, and emailed to the
//! customer.
//!
//! The crate is organized around one stateful orchestrator
//! ([`pipeline::Orchestrator`]) and narrow async traits for every
//! external capability (ledger, storage, transcription, generation,
//! image lookup, rendering, mail, coordination store), each with a thin
//! HTTP adapter selected at startup from [`config::AppConfig`].
//!
//! # A fulfillment run
//!
//! ```text
//! Dispatcher::dispatch(order_id)            (queue or detached task)
//!   └─▶ Orchestrator::fulfill(order_id)
//!         acquire per-order lock ─▶ idempotency guard
//!         ─▶ transcribe ─▶ chunk + rewrite blocks ─▶ assemble
//!         ─▶ extract sections ─▶ generate quiz
//!         ─▶ render + convert + upload artifacts
//!         ─▶ ledger update ─▶ customer notification
//! ```

pub mod config;
pub mod dispatch;
pub mod generate;
pub mod ledger;
pub mod lock;
pub mod mail;
pub mod order;
pub mod pipeline;
pub mod quiz;
pub mod render;
pub mod retry;
pub mod rewrite;
pub mod storage;
pub mod structure;
pub mod text;
pub mod transcribe;
