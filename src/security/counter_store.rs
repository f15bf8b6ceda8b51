//! External counter store used by the rate limiter.
//!
//! # Responsibilities
//! - Atomically increment a keyed counter
//! - Attach a time-to-live to a counter
//!
//! # Implementations
//! - `RedisCounterStore`: `INCR` / `EXPIRE` over a pooled connection; shared
//!   across gateway instances
//! - `MemoryCounterStore`: process-local, expiry checked lazily on access
//!
//! # Design Decisions
//! - Errors are surfaced, never swallowed; the caller decides to fail closed
//! - Concurrent increments are additive; expiry races are tolerated

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use tokio::time::Instant;

use crate::config::{CounterStoreConfig, CounterStoreKind};

/// Error type for counter store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store pool error: {0}")]
    Pool(String),
    #[error("counter store command failed: {0}")]
    Command(#[from] redis::RedisError),
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Remote key/value counter with expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` by one and return the new value.
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// Expire `key` after `ttl`.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// Build the configured counter store.
pub fn from_config(config: &CounterStoreConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
    match config.kind {
        CounterStoreKind::Redis => Ok(Arc::new(RedisCounterStore::new(config)?)),
        CounterStoreKind::Memory => Ok(Arc::new(MemoryCounterStore::new())),
    }
}

/// Redis-backed counter store.
#[derive(Clone)]
pub struct RedisCounterStore {
    pool: Pool,
}

impl RedisCounterStore {
    pub fn new(config: &CounterStoreConfig) -> Result<Self, StoreError> {
        let mut cfg = Config::from_url(config.url.clone());
        cfg.pool = Some(PoolConfig::new(config.pool_max));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        tracing::info!(url = %config.url, pool_max = config.pool_max, "Redis counter store configured");
        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let count: u64 = conn.incr(key, 1u64).await?;
        Ok(count)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let secs = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        let _: bool = conn.expire(key, secs).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Expired entries are swept once every this many increments.
const PURGE_EVERY: u64 = 1024;

/// In-process counter store.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: DashMap<String, Entry>,
    increments: AtomicU64,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key`, if it exists and has not expired.
    pub fn get(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.count)
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            tracing::debug!(purged, remaining = self.entries.len(), "Purged expired counters");
        }
    }

    /// Number of entries held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = Entry {
                count: 0,
                expires_at: None,
            };
        }
        entry.count += 1;
        let count = entry.count;
        drop(entry);

        if self.increments.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired();
        }
        Ok(count)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            // A deadline past the clock's range never expires.
            entry.expires_at = Instant::now().checked_add(ttl);
        }
        Ok(())
    }
}
