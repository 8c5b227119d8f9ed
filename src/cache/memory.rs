//! In-memory session backend using moka
//!
//! Each entry carries its own TTL, enforced through moka's per-entry
//! expiry policy. Expired entries are never returned by `get`, even before
//! moka evicts them.
//!
//! The cache has no size bound: an entry may only leave before its TTL when
//! it is deleted, so a stored session is never evicted by load.

use super::CacheLayer;
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct CacheEntry {
    value: Arc<String>,
    ttl: Duration,
}

/// Expiry policy reading the TTL stored alongside each value
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-memory key-value store using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl MemoryCache {
    /// Create a new memory store
    pub fn new() -> Self {
        let cache = Cache::builder().expire_after(EntryExpiry).build();

        Self { cache }
    }

    /// Get the current number of entries
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Flush pending writes so `entry_count` is exact
    #[cfg(test)]
    pub(crate) async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Check if a pattern matches a key using glob-style matching
    ///
    /// Supports:
    /// - `*` matches any sequence of characters
    /// - `?` matches any single character
    ///
    /// # Examples
    /// - `user:7:jwt:*` matches every session entry of user 7
    /// - `user:?:jwt:*` matches single-digit user ids only
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        let pattern_chars: Vec<char> = pattern.chars().collect();
        let key_chars: Vec<char> = key.chars().collect();
        Self::glob_match(&pattern_chars, &key_chars)
    }

    /// Iterative glob matching with single-star backtracking
    fn glob_match(pattern: &[char], key: &[char]) -> bool {
        let (mut pi, mut ki) = (0, 0);
        let mut star: Option<(usize, usize)> = None;

        while ki < key.len() {
            match pattern.get(pi) {
                Some('*') => {
                    star = Some((pi, ki));
                    pi += 1;
                }
                Some('?') => {
                    pi += 1;
                    ki += 1;
                }
                Some(&c) if c == key[ki] => {
                    pi += 1;
                    ki += 1;
                }
                _ => match star {
                    // Let the last star absorb one more character
                    Some((star_pi, star_ki)) => {
                        pi = star_pi + 1;
                        ki = star_ki + 1;
                        star = Some((star_pi, star_ki + 1));
                    }
                    None => return false,
                },
            }
        }

        pattern[pi..].iter().all(|&c| c == '*')
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .cache
            .get(key)
            .await
            .map(|entry| entry.value.as_ref().clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let entry = CacheEntry {
            value: Arc::new(value.to_string()),
            ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .cache
            .remove(key)
            .await
            .map(|entry| entry.value.as_ref().clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    /// Iterates over all keys; acceptable for the in-process backend only
    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let keys_to_delete: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key.as_ref()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys_to_delete {
            self.cache.invalidate(&key).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();

        cache.set("key1", "value1", Duration::from_secs(60)).await.unwrap();

        let result = cache.get("key1").await.unwrap();
        assert_eq!(result.as_deref(), Some("value1"));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_existing_key() {
        let cache = MemoryCache::new();

        cache.set("key", "value1", Duration::from_secs(60)).await.unwrap();
        cache.set("key", "value2", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get("key").await.unwrap().as_deref(), Some("value2"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let cache = MemoryCache::new();

        cache.set("key", "value", Duration::from_secs(60)).await.unwrap();
        cache.delete("key").await.unwrap();
        cache.delete("key").await.unwrap();

        assert_eq!(cache.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let cache = MemoryCache::new();

        cache.set("short", "a", Duration::from_millis(20)).await.unwrap();
        cache.set("long", "b", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert_eq!(cache.get("long").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_update_replaces_ttl() {
        let cache = MemoryCache::new();

        cache.set("key", "a", Duration::from_millis(20)).await.unwrap();
        cache.set("key", "b", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(cache.get("key").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_take_removes_once() {
        let cache = MemoryCache::new();

        cache.set("key", "value", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.take("key").await.unwrap().as_deref(), Some("value"));
        assert_eq!(cache.take("key").await.unwrap(), None);
        assert_eq!(cache.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_take_yields_value_once() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("key", "value", Duration::from_secs(60)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.take("key").await.unwrap() })
            })
            .collect();

        let mut taken = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                taken += 1;
            }
        }
        assert_eq!(taken, 1);
    }

    #[tokio::test]
    async fn test_many_entries_are_all_kept() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        for i in 0..5_000 {
            cache
                .set(&format!("user:{}:jwt:a", i), &i.to_string(), ttl)
                .await
                .unwrap();
        }
        cache.sync().await;

        assert_eq!(cache.entry_count(), 5_000);
        for i in 0..5_000 {
            let value = cache.get(&format!("user:{}:jwt:a", i)).await.unwrap();
            assert_eq!(value, Some(i.to_string()));
        }
    }

    #[tokio::test]
    async fn test_delete_pattern_user_sessions() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        cache.set("user:1:jwt:a", "t1", ttl).await.unwrap();
        cache.set("user:1:jwt:b", "t2", ttl).await.unwrap();
        cache.set("user:12:jwt:c", "t3", ttl).await.unwrap();
        cache.cache.run_pending_tasks().await;

        cache.delete_pattern("user:1:jwt:*").await.unwrap();

        assert_eq!(cache.get("user:1:jwt:a").await.unwrap(), None);
        assert_eq!(cache.get("user:1:jwt:b").await.unwrap(), None);
        assert_eq!(cache.get("user:12:jwt:c").await.unwrap().as_deref(), Some("t3"));
    }

    #[test]
    fn test_pattern_matches() {
        assert!(MemoryCache::pattern_matches("user:1:jwt:*", "user:1:jwt:abc"));
        assert!(MemoryCache::pattern_matches("user:?:jwt:*", "user:7:jwt:x"));
        assert!(MemoryCache::pattern_matches("*", ""));
        assert!(MemoryCache::pattern_matches("a*b*c", "aXXbYYc"));
        assert!(!MemoryCache::pattern_matches("user:?:jwt:*", "user:10:jwt:x"));
        assert!(!MemoryCache::pattern_matches("user:1:jwt:*", "user:12:jwt:abc"));
        assert!(!MemoryCache::pattern_matches("abc", "abcd"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(50))]

            /// A trailing star matches every key with the given prefix
            #[test]
            fn prefix_star_matches_extensions(
                prefix in "[a-z0-9:]{0,12}",
                suffix in "[a-zA-Z0-9_-]{0,20}"
            ) {
                let pattern = format!("{}*", prefix);
                let key = format!("{}{}", prefix, suffix);
                prop_assert!(MemoryCache::pattern_matches(&pattern, &key));
            }

            /// A pattern without wildcards matches only itself
            #[test]
            fn literal_pattern_is_equality(
                a in "[a-z0-9:]{0,12}",
                b in "[a-z0-9:]{0,12}"
            ) {
                prop_assert_eq!(MemoryCache::pattern_matches(&a, &b), a == b);
            }
        }
    }
}
