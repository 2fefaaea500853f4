//! Redis cache backend

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use super::{Cache, CacheError, CacheStats, CacheStatsSnapshot};

/// Redis-backed [`Cache`] over a reconnecting connection manager.
pub struct RedisCache {
    conn: ConnectionManager,
    stats: CacheStats,
}

impl RedisCache {
    /// Connect and verify the backend with a PING.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(CacheError::from)?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(CacheError::from)?;

        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(CacheError::from)?;

        tracing::info!(url, "Redis cache connected");
        Ok(Self {
            conn,
            stats: CacheStats::default(),
        })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(value)) => {
                self.stats.record_hit();
                Ok(Some(value))
            }
            Ok(None) => {
                self.stats.record_miss();
                Ok(None)
            }
            Err(err) => {
                self.stats.record_error();
                Err(err.into())
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        match conn
            .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
        {
            Ok(()) => {
                self.stats.record_set();
                Ok(())
            }
            Err(err) => {
                self.stats.record_error();
                Err(err.into())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        match conn.del::<_, ()>(key).await {
            Ok(()) => {
                self.stats.record_delete();
                Ok(())
            }
            Err(err) => {
                self.stats.record_error();
                Err(err.into())
            }
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let result: Result<(), redis::RedisError> = async {
            let keys: Vec<String> = conn.keys(&pattern).await?;
            if !keys.is_empty() {
                conn.del::<_, ()>(keys).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.stats.record_delete();
                Ok(())
            }
            Err(err) => {
                self.stats.record_error();
                Err(err.into())
            }
        }
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|err| {
                self.stats.record_error();
                err.into()
            })
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ENTITY_TTL;

    const TEST_REDIS_URL: &str = "redis://127.0.0.1:6379/0";

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn set_get_delete_round_trip() {
        let cache = RedisCache::connect(TEST_REDIS_URL)
            .await
            .expect("Failed to connect");

        cache.set("ledgerd:test:k", "v", ENTITY_TTL).await.unwrap();
        assert_eq!(
            cache.get("ledgerd:test:k").await.unwrap(),
            Some("v".to_string())
        );

        cache.delete("ledgerd:test:k").await.unwrap();
        assert_eq!(cache.get("ledgerd:test:k").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn prefix_deletion() {
        let cache = RedisCache::connect(TEST_REDIS_URL)
            .await
            .expect("Failed to connect");

        cache.set("ledgerd:test:p:1", "a", ENTITY_TTL).await.unwrap();
        cache.set("ledgerd:test:p:2", "b", ENTITY_TTL).await.unwrap();
        cache.delete_prefix("ledgerd:test:p:").await.unwrap();

        assert_eq!(cache.get("ledgerd:test:p:1").await.unwrap(), None);
        assert_eq!(cache.get("ledgerd:test:p:2").await.unwrap(), None);
    }
}
