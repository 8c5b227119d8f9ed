//! Session store
//!
//! Keeps one key-value entry per live token under `user:{id}:jwt:{jti}`,
//! holding the exact token string and expiring with the token. A token is
//! live only while its entry exists and matches it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;

use crate::cache::CacheLayer;
use crate::error::AuthError;
use crate::models::{session_key, session_pattern};
use crate::services::token::TokenCodec;

/// Default upper bound for a single backend call
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(3);

/// Per-token revocation state backed by a [`CacheLayer`]
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn CacheLayer>,
    codec: Arc<TokenCodec>,
    op_timeout: Duration,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(backend: Arc<dyn CacheLayer>, codec: Arc<TokenCodec>) -> Self {
        Self::with_timeout(backend, codec, DEFAULT_OP_TIMEOUT)
    }

    pub fn with_timeout(
        backend: Arc<dyn CacheLayer>,
        codec: Arc<TokenCodec>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            codec,
            op_timeout,
        }
    }

    /// Store `token` as live until its own expiry.
    ///
    /// Saving the same token twice leaves a single entry.
    pub async fn save(&self, user_id: i64, token: &str) -> Result<(), AuthError> {
        let claims = self.codec.decode(token).map_err(|e| match e {
            AuthError::Expired => AuthError::TokenExpired,
            other => other,
        })?;

        let remaining = claims.exp - Utc::now().timestamp();
        if remaining <= 0 {
            return Err(AuthError::TokenExpired);
        }
        let ttl = Duration::from_secs(remaining as u64);

        let key = session_key(&user_id.to_string(), &claims.jti);
        self.bounded(self.backend.set(&key, token, ttl)).await?;

        tracing::debug!(user_id, ttl_secs = remaining, "Session entry saved");
        Ok(())
    }

    /// Store the access and refresh token of one login.
    ///
    /// Runs as a detached task so that dropping the caller cannot stop it
    /// between the two writes. The first failure is returned; an entry
    /// already written by then is left to expire.
    pub async fn save_pair(&self, user_id: i64, access: &str, refresh: &str) -> Result<(), AuthError> {
        let store = self.clone();
        let (access, refresh) = (access.to_string(), refresh.to_string());

        let task = tokio::spawn(async move {
            store.save(user_id, &access).await?;
            store.save(user_id, &refresh).await
        });

        task.await
            .map_err(|e| AuthError::Store(anyhow!("session save task failed: {}", e)))?
    }

    /// Whether `token` is currently live for `user_id`.
    ///
    /// True only when the entry exists and holds exactly this token.
    pub async fn validate(&self, user_id: i64, token: &str) -> Result<bool, AuthError> {
        let claims = self.codec.decode(token)?;
        let key = session_key(&user_id.to_string(), &claims.jti);

        let stored = self.bounded(self.backend.get(&key)).await?;
        Ok(stored.as_deref() == Some(token))
    }

    /// Remove the entry of `token` and report whether it was live.
    ///
    /// The check and the removal are one backend step, so when several
    /// callers consume the same token at once at most one gets `true`.
    pub async fn consume(&self, user_id: i64, token: &str) -> Result<bool, AuthError> {
        let claims = self.codec.decode(token)?;
        let key = session_key(&user_id.to_string(), &claims.jti);

        let taken = self.bounded(self.backend.take(&key)).await?;
        Ok(taken.as_deref() == Some(token))
    }

    /// Remove the entry of `token`.
    ///
    /// An absent entry, or a token whose key cannot be derived, is a no-op.
    pub async fn delete(&self, user_id: i64, token: &str) -> Result<(), AuthError> {
        let claims = match self.codec.decode_ignoring_expiry(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(user_id, error = %e, "Skipping deletion of undecodable token");
                return Ok(());
            }
        };

        let key = session_key(&user_id.to_string(), &claims.jti);
        self.bounded(self.backend.delete(&key)).await?;

        tracing::debug!(user_id, "Session entry deleted");
        Ok(())
    }

    /// Remove both entries of a session, as a detached task like [`SessionStore::save_pair`].
    pub async fn delete_pair(&self, user_id: i64, access: &str, refresh: &str) -> Result<(), AuthError> {
        let store = self.clone();
        let (access, refresh) = (access.to_string(), refresh.to_string());

        let task = tokio::spawn(async move {
            store.delete(user_id, &access).await?;
            store.delete(user_id, &refresh).await
        });

        task.await
            .map_err(|e| AuthError::Store(anyhow!("session delete task failed: {}", e)))?
    }

    /// Remove every session entry of `user_id`
    pub async fn delete_all(&self, user_id: i64) -> Result<(), AuthError> {
        let pattern = session_pattern(user_id);
        self.bounded(self.backend.delete_pattern(&pattern)).await?;

        tracing::info!(user_id, "All sessions revoked");
        Ok(())
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(AuthError::Store),
            Err(_) => Err(AuthError::Store(anyhow!(
                "session store operation timed out after {:?}",
                self.op_timeout
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use crate::cache::MemoryCache;
    use crate::config::AuthConfig;

    pub fn test_codec() -> Arc<TokenCodec> {
        let config = AuthConfig {
            secret: "session-test-secret".to_string(),
            issuer: "https://market.test".to_string(),
            ..AuthConfig::default()
        };
        Arc::new(TokenCodec::new(&config).unwrap())
    }

    /// Memory backend that can be switched into failing, hanging or slow
    #[derive(Default)]
    pub struct FlakyCache {
        pub inner: MemoryCache,
        pub failing: AtomicBool,
        pub hanging: AtomicBool,
        pub latency_ms: AtomicU64,
    }

    impl FlakyCache {
        pub fn fail(&self, on: bool) {
            self.failing.store(on, Ordering::SeqCst);
        }

        pub fn hang(&self, on: bool) {
            self.hanging.store(on, Ordering::SeqCst);
        }

        /// Delay every call by `latency` before it reaches the store
        pub fn slow(&self, latency: Duration) {
            self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
        }

        async fn check(&self) -> anyhow::Result<()> {
            let latency = self.latency_ms.load(Ordering::SeqCst);
            if latency > 0 {
                tokio::time::sleep(Duration::from_millis(latency)).await;
            }
            if self.hanging.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CacheLayer for FlakyCache {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.check().await?;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
            self.check().await?;
            self.inner.set(key, value, ttl).await
        }

        async fn take(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.check().await?;
            self.inner.take(key).await
        }

        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.check().await?;
            self.inner.delete(key).await
        }

        async fn delete_pattern(&self, pattern: &str) -> anyhow::Result<()> {
            self.check().await?;
            self.inner.delete_pattern(pattern).await
        }
    }
}
