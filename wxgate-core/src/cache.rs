//! Cache-aside support: a byte-oriented key-value store abstraction and a
//! thin, namespacing wrapper over it.
//!
//! The wrapper adds no recovery, retry or fallback of its own. Store errors
//! come back to the caller unchanged and the caller decides whether to go
//! straight to the provider instead.

use std::{fmt::Debug, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{config::CacheConfig, error::CacheError};

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Underlying key-value storage.
///
/// A zero `ttl` means the entry never expires.
#[async_trait]
pub trait KvStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Store `value` only if `key` is absent. Atomic with respect to the
    /// store; returns whether the write happened.
    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, CacheError>;

    /// Remaining lifetime, or `None` when the key is absent or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    async fn close(&self) -> Result<(), CacheError>;
}

/// How long each kind of data stays cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub current: Duration,
    pub forecast: Duration,
    pub alerts: Duration,
    /// Location data changes rarely and is invalidated by hand.
    pub location: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            current: Duration::from_secs(10 * 60),
            forecast: Duration::from_secs(30 * 60),
            alerts: Duration::from_secs(5 * 60),
            location: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl From<&CacheConfig> for TtlPolicy {
    fn from(cfg: &CacheConfig) -> Self {
        Self {
            current: Duration::from_secs(cfg.current_ttl_secs),
            forecast: Duration::from_secs(cfg.forecast_ttl_secs),
            alerts: Duration::from_secs(cfg.alerts_ttl_secs),
            location: Duration::from_secs(cfg.location_ttl_secs),
        }
    }
}

/// Namespaced view over a shared [`KvStore`].
///
/// Every key is stored as `"<prefix>:<key>"`, or as the bare key when the
/// prefix is empty. The store's lifecycle belongs to whoever created it;
/// [`RequestCache::close`] simply forwards.
#[derive(Debug, Clone)]
pub struct RequestCache {
    store: Arc<dyn KvStore>,
    prefix: String,
}

impl RequestCache {
    pub fn new(store: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self { store, prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        guard(cancel, self.store.get(&self.prefix_key(key))).await
    }

    pub async fn set(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        guard(cancel, self.store.set(&self.prefix_key(key), value, ttl)).await
    }

    pub async fn delete(&self, cancel: &CancellationToken, key: &str) -> Result<(), CacheError> {
        guard(cancel, self.store.delete(&self.prefix_key(key))).await
    }

    pub async fn exists(&self, cancel: &CancellationToken, key: &str) -> Result<bool, CacheError> {
        guard(cancel, self.store.exists(&self.prefix_key(key))).await
    }

    pub async fn set_nx(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        guard(cancel, self.store.set_nx(&self.prefix_key(key), value, ttl)).await
    }

    pub async fn ttl(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<Option<Duration>, CacheError> {
        guard(cancel, self.store.ttl(&self.prefix_key(key))).await
    }

    /// Clears the whole underlying store, not just this namespace.
    pub async fn clear(&self, cancel: &CancellationToken) -> Result<(), CacheError> {
        guard(cancel, self.store.clear()).await
    }

    pub async fn close(&self) -> Result<(), CacheError> {
        self.store.close().await
    }

    fn prefix_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{key}", self.prefix)
        }
    }
}

async fn guard<T>(
    cancel: &CancellationToken,
    op: impl Future<Output = Result<T, CacheError>>,
) -> Result<T, CacheError> {
    if cancel.is_cancelled() {
        return Err(CacheError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CacheError::Cancelled),
        res = op => res,
    }
}

/// Open the store named by `cfg`: Redis when a URL is configured, otherwise
/// a process-local map.
pub async fn open_store(cfg: &CacheConfig) -> Result<Arc<dyn KvStore>, CacheError> {
    match cfg.redis_url.as_deref() {
        Some(url) if !url.is_empty() => Ok(Arc::new(RedisStore::connect(url).await?)),
        _ => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn cache(prefix: &str) -> (Arc<MemoryStore>, RequestCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = RequestCache::new(store.clone(), prefix);
        (store, cache)
    }

    #[tokio::test]
    async fn set_then_get() {
        let (_, cache) = cache("test");
        let cancel = CancellationToken::new();

        cache.set(&cancel, "weather:nyc", b"sunny", Duration::from_secs(300)).await.unwrap();
        let got = cache.get(&cancel, "weather:nyc").await.unwrap();
        assert_eq!(got.as_deref(), Some(&b"sunny"[..]));
    }

    #[tokio::test]
    async fn keys_are_prefixed() {
        let (store, cache) = cache("weather");
        let cancel = CancellationToken::new();

        cache.set(&cancel, "key", b"v", Duration::ZERO).await.unwrap();
        assert!(store.exists("weather:key").await.unwrap());
        assert!(!store.exists("key").await.unwrap());
        assert!(cache.exists(&cancel, "key").await.unwrap());
    }

    #[tokio::test]
    async fn empty_prefix_uses_bare_key() {
        let (store, cache) = cache("");
        let cancel = CancellationToken::new();

        cache.set(&cancel, "key", b"v", Duration::ZERO).await.unwrap();
        assert_eq!(store.get("key").await.unwrap().as_deref(), Some(&b"v"[..]));
        assert!(!store.exists(":key").await.unwrap());
    }

    #[tokio::test]
    async fn set_nx_does_not_overwrite() {
        let (_, cache) = cache("p");
        let cancel = CancellationToken::new();
        let ttl = Duration::from_secs(60);

        assert!(cache.set_nx(&cancel, "lock", b"first", ttl).await.unwrap());
        assert!(!cache.set_nx(&cancel, "lock", b"second", ttl).await.unwrap());
        assert_eq!(cache.get(&cancel, "lock").await.unwrap().as_deref(), Some(&b"first"[..]));
    }

    #[tokio::test]
    async fn delete_and_ttl() {
        let (_, cache) = cache("p");
        let cancel = CancellationToken::new();
        let ttl = Duration::from_secs(3600);

        cache.set(&cancel, "k", b"v", ttl).await.unwrap();
        let remaining = cache.ttl(&cancel, "k").await.unwrap().unwrap();
        assert!(remaining > Duration::ZERO && remaining <= ttl);

        cache.delete(&cancel, "k").await.unwrap();
        assert!(cache.get(&cancel, "k").await.unwrap().is_none());
        assert_eq!(cache.ttl(&cancel, "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancelled_token_fails_fast() {
        let (_, cache) = cache("p");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = cache.get(&cancel, "k").await.unwrap_err();
        assert!(matches!(err, CacheError::Cancelled));
    }

    #[derive(Debug, Default)]
    struct FailingStore {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl KvStore for FailingStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            self.calls.lock().push(key.to_string());
            Err(CacheError::Closed)
        }
        async fn set(&self, _: &str, _: &[u8], _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Closed)
        }
        async fn delete(&self, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Closed)
        }
        async fn exists(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Closed)
        }
        async fn set_nx(&self, _: &str, _: &[u8], _: Duration) -> Result<bool, CacheError> {
            Err(CacheError::Closed)
        }
        async fn ttl(&self, _: &str) -> Result<Option<Duration>, CacheError> {
            Err(CacheError::Closed)
        }
        async fn clear(&self) -> Result<(), CacheError> {
            Err(CacheError::Closed)
        }
        async fn close(&self) -> Result<(), CacheError> {
            Err(CacheError::Closed)
        }
    }

    #[tokio::test]
    async fn store_errors_propagate_unchanged() {
        let store = Arc::new(FailingStore::default());
        let cache = RequestCache::new(store.clone(), "p");
        let cancel = CancellationToken::new();

        assert!(matches!(cache.get(&cancel, "k").await, Err(CacheError::Closed)));
        assert!(matches!(cache.set(&cancel, "k", b"", Duration::ZERO).await, Err(CacheError::Closed)));
        assert!(matches!(cache.ttl(&cancel, "k").await, Err(CacheError::Closed)));
        assert!(matches!(cache.clear(&cancel).await, Err(CacheError::Closed)));
        assert!(matches!(cache.close().await, Err(CacheError::Closed)));
        assert_eq!(store.calls.lock().as_slice(), ["p:k".to_string()]);
    }

    #[test]
    fn ttl_policy_from_config() {
        let policy = TtlPolicy::from(&CacheConfig::default());
        assert_eq!(policy, TtlPolicy::default());
    }
}
