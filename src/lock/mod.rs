//! Per-order mutual exclusion with TTL, backed by a shared coordination
//! store when one is configured.
//!
//! [`OrderLock`] prevents two concurrent fulfillment runs for the *same*
//! order from both doing paid work.  With no store configured it runs in
//! **bypass mode**: every acquire succeeds and release is a no-op.  That
//! trades strict exclusion for availability in single-instance
//! deployments and is logged loudly so operators can tell protected from
//! unprotected deployments apart.
//!
//! The lock is advisory — it does not make ledger writes atomic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

// ---------------------------------------------------------------------------
// LockError
// ---------------------------------------------------------------------------

/// Communication failure with the coordination store.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("coordination store error: {0}")]
    Store(String),
}

// ---------------------------------------------------------------------------
// CoordinationStore trait
// ---------------------------------------------------------------------------

/// Atomic set-if-absent-with-expiry against a shared store.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc<dyn CoordinationStore>`.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomically set `key` with `ttl` if it is absent.  Returns `true`
    /// only if this call created the key.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Delete `key`.
    async fn remove(&self, key: &str) -> Result<(), LockError>;
}

// ---------------------------------------------------------------------------
// RedisStore
// ---------------------------------------------------------------------------

/// Coordination store backed by Redis (`SET key v NX EX ttl` / `DEL key`).
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Connect lazily to the Redis instance at `url`.
    pub fn open(url: &str) -> Result<Self, LockError> {
        let client = redis::Client::open(url).map_err(|e| LockError::Store(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, LockError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LockError::Store(e.to_string()))
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = self.connection().await?;
        // SET NX replies "OK" when the key was created and Nil otherwise.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::Store(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn remove(&self, key: &str) -> Result<(), LockError> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::Store(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OrderLock
// ---------------------------------------------------------------------------

/// Per-order mutex over an optional [`CoordinationStore`].
pub struct OrderLock {
    store: Option<Arc<dyn CoordinationStore>>,
}

impl OrderLock {
    /// Lock backed by a real shared store.
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Bypass-mode lock: every acquire succeeds, release is a no-op.
    pub fn bypass() -> Self {
        log::warn!("lock: no coordination store configured — running in bypass mode (no mutual exclusion)");
        Self { store: None }
    }

    /// Returns `true` when no shared store backs this lock.
    pub fn is_bypass(&self) -> bool {
        self.store.is_none()
    }

    /// Try to acquire the lock for `key` with the given TTL.
    ///
    /// Returns `true` only if the caller now holds the lock (always, in
    /// bypass mode).  A store communication error counts as not acquired.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> bool {
        let Some(store) = &self.store else {
            log::debug!("lock: bypass acquire for key={key}");
            return true;
        };

        match store.set_if_absent(&lock_key(key), ttl).await {
            Ok(acquired) => acquired,
            Err(e) => {
                // Fail closed: without confirmation we must assume another
                // run holds the lock.
                log::warn!("lock: acquire failed for key={key}: {e}");
                false
            }
        }
    }

    /// Release the lock for `key`.
    ///
    /// Store errors are swallowed — the TTL bounds the lock's lifetime
    /// regardless.
    pub async fn release(&self, key: &str) {
        let Some(store) = &self.store else {
            log::debug!("lock: bypass release for key={key}");
            return;
        };

        if let Err(e) = store.remove(&lock_key(key)).await {
            log::warn!("lock: release failed for key={key}: {e}");
        }
    }
}

fn lock_key(key: &str) -> String {
    format!("lock:{key}")
}

// ---------------------------------------------------------------------------
// MemoryStore  (test-only)
// ---------------------------------------------------------------------------

/// In-process [`CoordinationStore`] used to test exclusion semantics
/// without a Redis instance.
#[cfg(test)]
pub struct MemoryStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, std::time::Instant>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut entries = self.entries.lock().unwrap();
        let now = std::time::Instant::now();
        entries.retain(|_, expiry| *expiry > now);

        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), now + ttl);
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<(), LockError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
