//! Dispatch front — queue-or-inline execution of fulfillment runs.
//!
//! The payment webhook's handler calls [`Dispatcher::dispatch`] once a
//! payment is verified.  With the `Queue` strategy a job is pushed onto
//! a durable Redis list for a worker to pick up; with `InlineAsync` the
//! orchestrator runs on a detached background task.  Both paths return
//! immediately — the triggering request never blocks on pipeline
//! completion.
//!
//! The strategy is resolved once at startup from [`DispatchConfig`],
//! never re-derived per call.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{DispatchConfig, DispatchStrategy};
use crate::pipeline::Orchestrator;

// ---------------------------------------------------------------------------
// QueueError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job queue error: {0}")]
    Store(String),
}

// ---------------------------------------------------------------------------
// JobQueue trait
// ---------------------------------------------------------------------------

/// Durable job queue contract.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a fulfillment job for `order_id`; returns the job id.
    async fn enqueue(&self, order_id: &str) -> Result<String, QueueError>;
}

// ---------------------------------------------------------------------------
// RedisQueue
// ---------------------------------------------------------------------------

/// Redis-list job queue (`LPUSH` of a JSON payload).
pub struct RedisQueue {
    client: redis::Client,
    queue_name: String,
}

impl RedisQueue {
    pub fn open(url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url).map_err(|e| QueueError::Store(e.to_string()))?;
        Ok(Self {
            client,
            queue_name: queue_name.to_string(),
        })
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, order_id: &str) -> Result<String, QueueError> {
        let job_id = format!("{order_id}:{}", chrono::Utc::now().timestamp_millis());
        let payload = serde_json::json!({
            "job_id":   job_id,
            "order_id": order_id,
        })
        .to_string();

        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Store(e.to_string()))?;

        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.queue_name)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Store(e.to_string()))?;

        Ok(job_id)
    }
}

// ---------------------------------------------------------------------------
// DispatchTicket
// ---------------------------------------------------------------------------

/// What [`Dispatcher::dispatch`] handed the run to.
pub enum DispatchTicket {
    /// Job pushed onto the durable queue.
    Queued { job_id: String },
    /// Run started on a detached background task.  The handle may be
    /// dropped by callers that have no use for it.
    Background { handle: tokio::task::JoinHandle<()> },
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Fire-and-forget entry into the fulfillment pipeline.
pub struct Dispatcher {
    strategy: DispatchStrategy,
    queue: Option<Arc<dyn JobQueue>>,
    orchestrator: Arc<Orchestrator>,
}

impl Dispatcher {
    /// Resolve the strategy from configuration.  `Queue` without a
    /// Redis URL degrades to `InlineAsync` with a warning.
    pub fn from_config(
        config: &DispatchConfig,
        orchestrator: Arc<Orchestrator>,
    ) -> Result<Self, QueueError> {
        let (strategy, queue) = match (config.strategy, config.redis_url.as_deref()) {
            (DispatchStrategy::Queue, Some(url)) => {
                let queue = RedisQueue::open(url, &config.queue_name)?;
                (DispatchStrategy::Queue, Some(Arc::new(queue) as Arc<dyn JobQueue>))
            }
            (DispatchStrategy::Queue, None) => {
                log::warn!(
                    "dispatch: Queue strategy configured without a redis_url — using InlineAsync"
                );
                (DispatchStrategy::InlineAsync, None)
            }
            (DispatchStrategy::InlineAsync, _) => (DispatchStrategy::InlineAsync, None),
        };

        Ok(Self {
            strategy,
            queue,
            orchestrator,
        })
    }

    /// A dispatcher with an explicit queue (useful for tests).
    pub fn with_queue(queue: Arc<dyn JobQueue>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            strategy: DispatchStrategy::Queue,
            queue: Some(queue),
            orchestrator,
        }
    }

    /// A dispatcher that always runs inline.
    pub fn inline(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            strategy: DispatchStrategy::InlineAsync,
            queue: None,
            orchestrator,
        }
    }

    /// Hand `order_id` off for fulfillment and return immediately.
    ///
    /// A queue enqueue failure degrades to a background run so a broken
    /// queue never drops a paid order.
    pub async fn dispatch(&self, order_id: &str) -> DispatchTicket {
        if self.strategy == DispatchStrategy::Queue {
            if let Some(queue) = &self.queue {
                match queue.enqueue(order_id).await {
                    Ok(job_id) => {
                        log::info!("order {order_id}: enqueued as job {job_id}");
                        return DispatchTicket::Queued { job_id };
                    }
                    Err(e) => {
                        log::warn!(
                            "order {order_id}: enqueue failed ({e}) — running in background instead"
                        );
                    }
                }
            }
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let order_id = order_id.to_string();
        let handle = tokio::spawn(async move {
            match orchestrator.fulfill(&order_id).await {
                Ok(outcome) => log::info!("order {order_id}: background run finished: {outcome:?}"),
                Err(e) => log::error!("order {order_id}: background run failed: {e}"),
            }
        });

        DispatchTicket::Background { handle }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
