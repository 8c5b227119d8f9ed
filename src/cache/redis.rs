//! Redis session backend
//!
//! Shares session state between API instances.
//!
//! # Features
//! - Per-entry TTL via `PSETEX` (millisecond precision)
//! - Atomic consume via `GETDEL` (Redis 6.2+)
//! - Pattern-based deletion via SCAN + DEL (production-safe, not KEYS)

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// Number of keys to scan per iteration in delete_pattern
const SCAN_COUNT: usize = 100;

/// Redis key-value store
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to Redis and verify the connection with PING
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;

        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .context("Redis did not answer PING")?;

        tracing::info!("Connected to Redis session backend");

        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();

        let result: Option<String> = conn
            .get(key)
            .await
            .context("Failed to get value from Redis")?;

        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();

        // PSETEX rejects a zero expiry
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let _: () = conn
            .pset_ex(key, value, ttl_ms)
            .await
            .context("Failed to set value in Redis")?;

        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();

        let result: Option<String> = redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .context("Failed to take value from Redis")?;

        Ok(result)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();

        let _: () = conn
            .del(key)
            .await
            .context("Failed to delete key from Redis")?;

        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .context("Failed to scan keys in Redis")?;

            if !keys.is_empty() {
                let _: () = conn
                    .del(&keys)
                    .await
                    .context("Failed to delete keys from Redis")?;
            }

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(())
    }
}
