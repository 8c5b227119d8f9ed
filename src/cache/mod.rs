//! Key-value backend for session entries
//!
//! Session entries are plain strings keyed by `user:{id}:jwt:{jti}` with a
//! per-entry TTL. Two backends are provided:
//! - In-memory store (moka) - default, for single-instance deployment
//! - Redis - optional, shared between instances (`redis-cache` feature)
//!
//! The backend is selected from [`CacheConfig`] by [`create_cache`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use market_auth::cache::create_cache;
//! use market_auth::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default()).await?;
//! cache.set("user:1:jwt:abc", "token", Duration::from_secs(60)).await?;
//! ```

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;

/// Key-value backend used by the session store.
///
/// `get` returns `Ok(None)` for an absent or expired key and `Err` only for
/// backend failures (connection loss, protocol errors).
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Upsert `value` under `key`, expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove `key` and return the value it held, as one atomic step.
    ///
    /// Of several concurrent calls for the same key at most one sees the value.
    async fn take(&self, key: &str) -> Result<Option<String>>;

    /// Delete `key`; deleting an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all keys matching a glob-style pattern (`*`, `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;
}

/// Create the session backend selected by configuration
///
/// # Errors
/// - Redis is configured but the `redis-cache` feature is not enabled
/// - Redis is configured without a URL, or the connection fails
pub async fn create_cache(config: &CacheConfig) -> Result<Arc<dyn CacheLayer>> {
    match config.driver {
        CacheDriver::Memory => {
            let cache = MemoryCache::new();
            Ok(Arc::new(cache))
        }
        CacheDriver::Redis => {
            #[cfg(feature = "redis-cache")]
            {
                let redis_url = config.redis_url.as_ref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Redis URL is required when using the Redis session backend. \
                         Set 'redis_url' in cache configuration or use MARKET_CACHE_REDIS_URL environment variable."
                    )
                })?;

                let cache = RedisCache::new(redis_url).await?;
                Ok(Arc::new(cache))
            }

            #[cfg(not(feature = "redis-cache"))]
            {
                anyhow::bail!(
                    "Redis session backend is configured but the 'redis-cache' feature is not enabled. \
                     Either enable the feature with `--features redis-cache` or use the 'memory' driver."
                )
            }
        }
    }
}
