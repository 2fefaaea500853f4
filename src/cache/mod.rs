//! Read-through / write-invalidate cache
//!
//! Process-external string key-value mapping with per-entry TTL. Cache
//! failures must never block a request: callers treat errors as a miss on
//! reads and a no-op on writes. When the backend is unreachable at startup
//! the process continues on [`NullCache`].

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// TTL for cached balances and single transactions.
pub const ENTITY_TTL: Duration = Duration::from_secs(300);

/// TTL for cached transaction listings.
pub const LISTING_TTL: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cached value is not decodable: {0}")]
    Decode(String),
}

impl From<::redis::RedisError> for CacheError {
    fn from(err: ::redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete every key starting with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;

    fn stats(&self) -> CacheStatsSnapshot;
}

/// Cache keys used by the core.
pub mod keys {
    use super::*;

    pub fn balance(user_id: Uuid) -> String {
        format!("balance:{user_id}")
    }

    pub fn transaction(id: Uuid) -> String {
        format!("transaction:{id}")
    }

    pub fn transactions_prefix(user_id: Uuid) -> String {
        format!("transactions:{user_id}:")
    }

    pub fn transactions(
        user_id: Uuid,
        limit: i64,
        offset: i64,
        kind: Option<&str>,
        status: Option<&str>,
    ) -> String {
        format!(
            "transactions:{user_id}:{limit}:{offset}:{}:{}",
            kind.unwrap_or(""),
            status.unwrap_or("")
        )
    }
}

/// Lock-free hit/miss accounting shared by every implementation.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        CacheStatsSnapshot {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate,
        }
    }
}

/// Point-in-time view of the counters, detached from any lock.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub hit_rate: f64,
}

/// Cache that stores nothing. Installed when the backend is unreachable at
/// startup so the rest of the system runs uncached.
#[derive(Debug, Default)]
pub struct NullCache {
    stats: CacheStats,
}

impl NullCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for NullCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        self.stats.record_miss();
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::Backend("null cache".to_string()))
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}
