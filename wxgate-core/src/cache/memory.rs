use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::KvStore;
use crate::error::CacheError;

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &[u8], ttl: Duration) -> Self {
        Self {
            value: value.to_vec(),
            expires_at: (!ttl.is_zero()).then(|| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Earliest expiry among stored entries; nothing can be swept before it.
    next_expiry: Option<Instant>,
    closed: bool,
}

impl Inner {
    fn open(&mut self) -> Result<&mut Self, CacheError> {
        if self.closed { Err(CacheError::Closed) } else { Ok(self) }
    }

    /// Live entry for `key`, evicting it first if it has expired.
    fn live(&mut self, key: &str) -> Option<&Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get(key)
    }

    /// Insert `entry`, first dropping every expired entry if any are due.
    fn insert(&mut self, key: &str, entry: Entry) {
        let now = Instant::now();
        if self.next_expiry.is_some_and(|at| now >= at) {
            self.sweep(now);
        }
        if let Some(at) = entry.expires_at {
            self.next_expiry = Some(self.next_expiry.map_or(at, |next| next.min(at)));
        }
        self.entries.insert(key.to_string(), entry);
    }

    fn sweep(&mut self, now: Instant) {
        self.entries.retain(|_, e| !e.is_expired(now));
        self.next_expiry = self.entries.values().filter_map(|e| e.expires_at).min();
    }
}

/// Process-local store. Expired entries are dropped on access, and swept
/// in bulk on the next write once any of them is due.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut inner = self.inner.lock();
        Ok(inner.open()?.live(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut inner = self.inner.lock();
        inner.open()?.insert(key, Entry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut inner = self.inner.lock();
        inner.open()?.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut inner = self.inner.lock();
        Ok(inner.open()?.live(key).is_some())
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, CacheError> {
        let mut guard = self.inner.lock();
        let inner = guard.open()?;
        if inner.live(key).is_some() {
            return Ok(false);
        }
        inner.insert(key, Entry::new(value, ttl));
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        Ok(inner
            .open()?
            .live(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut guard = self.inner.lock();
        let inner = guard.open()?;
        inner.entries.clear();
        inner.next_expiry = None;
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store.set("k", b"v", Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"v"[..]));
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.exists("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_nx_succeeds_once_previous_entry_expired() {
        let store = MemoryStore::new();
        assert!(store.set_nx("lock", b"a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_nx("lock", b"b", Duration::from_secs(5)).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.set_nx("lock", b"c", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some(&b"c"[..]));
    }

    #[tokio::test(start_paused = true)]
    async fn writes_sweep_expired_keys_that_are_never_read_again() {
        let store = MemoryStore::new();
        for i in 0..1000 {
            store.set(&format!("old:{i}"), b"v", Duration::from_secs(1)).await.unwrap();
        }
        store.set("keep", b"v", Duration::ZERO).await.unwrap();
        assert_eq!(store.len(), 1001);

        tokio::time::advance(Duration::from_secs(3600)).await;
        for i in 0..10 {
            store.set(&format!("new:{i}"), b"v", Duration::from_secs(60)).await.unwrap();
        }

        assert_eq!(store.len(), 11);
        assert!(store.exists("keep").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_waits_for_earliest_expiry() {
        let store = MemoryStore::new();
        store.set("short", b"v", Duration::from_secs(10)).await.unwrap();
        store.set("long", b"v", Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        store.set("a", b"v", Duration::ZERO).await.unwrap();
        assert_eq!(store.len(), 3);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(store.set_nx("lock", b"1", Duration::from_secs(30)).await.unwrap());
        assert_eq!(store.len(), 3);
        assert!(store.exists("long").await.unwrap());
    }

    #[tokio::test]
    async fn zero_ttl_never_expires_and_reports_no_ttl() {
        let store = MemoryStore::new();
        store.set("k", b"v", Duration::ZERO).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert_eq!(store.ttl("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = MemoryStore::new();
        store.set("a", b"1", Duration::ZERO).await.unwrap();
        store.set("b", b"2", Duration::ZERO).await.unwrap();
        assert_eq!(store.len(), 2);

        store.clear().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.close().await.unwrap();

        assert!(matches!(store.get("k").await, Err(CacheError::Closed)));
        assert!(matches!(store.set("k", b"v", Duration::ZERO).await, Err(CacheError::Closed)));
        assert!(matches!(store.set_nx("k", b"v", Duration::ZERO).await, Err(CacheError::Closed)));
    }
}
