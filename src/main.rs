//! Worker entry point — LecturePress fulfillment.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (returns defaults when no config file exists).
//! 3. Build the service set — one concrete adapter per capability.
//! 4. Fulfill the order ids given as arguments, or, with no arguments,
//!    every pending order from the ledger.

use std::sync::Arc;

use lecturepress::config::AppConfig;
use lecturepress::generate::ApiGenerator;
use lecturepress::ledger::HttpLedger;
use lecturepress::lock::{OrderLock, RedisStore};
use lecturepress::mail::HttpMailer;
use lecturepress::pipeline::{Orchestrator, RunOutcome, Services};
use lecturepress::render::HttpRenderer;
use lecturepress::storage::HttpStore;
use lecturepress::structure::PlaceholderImageFinder;
use lecturepress::transcribe::PollingTranscriber;

// ---------------------------------------------------------------------------
// Service construction
// ---------------------------------------------------------------------------

/// Build the per-order lock: Redis-backed when a coordination store is
/// configured, bypass mode otherwise.  A store that fails to initialise
/// degrades to bypass with a warning rather than refusing to start.
fn build_lock(config: &AppConfig) -> OrderLock {
    let Some(url) = config.lock.redis_url.as_deref() else {
        return OrderLock::bypass();
    };

    match RedisStore::open(url) {
        Ok(store) => OrderLock::new(Arc::new(store)),
        Err(e) => {
            log::warn!("could not initialise the coordination store ({e}) — lock runs in bypass mode");
            OrderLock::bypass()
        }
    }
}

/// One concrete adapter per capability, selected at startup.
fn build_services(config: &AppConfig) -> Services {
    let renderer = Arc::new(HttpRenderer::from_config(&config.render));

    Services {
        ledger: Arc::new(HttpLedger::from_config(&config.ledger)),
        storage: Arc::new(HttpStore::from_config(&config.storage)),
        transcriber: Arc::new(PollingTranscriber::from_config(&config.transcription)),
        generator: Arc::new(ApiGenerator::from_config(&config.generation)),
        image_finder: Arc::new(PlaceholderImageFinder),
        renderer: Arc::clone(&renderer) as Arc<dyn lecturepress::render::DocumentRenderer>,
        converter: renderer,
        mailer: Arc::new(HttpMailer::from_config(&config.mail)),
        lock: Arc::new(build_lock(config)),
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("LecturePress fulfillment worker starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Services and orchestrator
    let services = build_services(&config);
    let orchestrator = Orchestrator::new(services, config);

    // 4. Fulfill the requested orders
    let order_ids: Vec<String> = std::env::args().skip(1).collect();

    if order_ids.is_empty() {
        let delivered = orchestrator.fulfill_pending().await;
        log::info!("done — {delivered} order(s) delivered");
        return Ok(());
    }

    for order_id in &order_ids {
        match orchestrator.fulfill(order_id).await {
            Ok(RunOutcome::Delivered { artifacts }) => {
                log::info!("order {order_id}: delivered with {} artifact(s)", artifacts.len());
            }
            Ok(outcome) => log::info!("order {order_id}: {outcome:?}"),
            Err(e) => log::error!("order {order_id}: {e}"),
        }
    }

    Ok(())
}
