//! In-memory cache double with TTL expiry

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::{Cache, CacheError, CacheStats, CacheStatsSnapshot};

/// DashMap-backed [`Cache`] for tests. Entries expire lazily on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
    stats: CacheStats,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value().clone();
            drop(entry);
            if Instant::now() < expires_at {
                self.stats.record_hit();
                return Ok(Some(value));
            }
            self.entries.remove(key);
        }
        self.stats.record_miss();
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        self.stats.record_set();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        self.stats.record_delete();
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.entries.retain(|key, _| !key.starts_with(prefix));
        self.stats.record_delete();
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}
