use crate::errors::AppError;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Key-value store used by the rate limiter.
///
/// Entries expire at the store level after the TTL passed to `put`. The trait
/// makes no atomicity promises; callers doing read-modify-write sequences get
/// whatever consistency the backing store provides.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError>;
}

#[derive(Clone)]
struct KvEntry {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, KvEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &KvEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &KvEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process KV store backed by a moka cache with per-entry TTL.
pub struct MokaKvStore {
    cache: Cache<String, KvEntry>,
}

impl MokaKvStore {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl KvStore for MokaKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        self.cache
            .insert(key.to_string(), KvEntry { value, ttl })
            .await;
        Ok(())
    }
}

/// In-memory fake for tests. Honors TTLs on read and can inject failures to
/// exercise the store-error propagation path.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    fail: AtomicBool,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent get/put return a `KvError`.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check_fail(&self) -> Result<(), AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::KvError("injected store failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.check_fail()?;
        let mut entries = self.entries.lock().expect("kv mutex poisoned");
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        self.check_fail()?;
        let mut entries = self.entries.lock().expect("kv mutex poisoned");
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn moka_store_round_trips() {
        let store = MokaKvStore::new(100);
        store
            .put("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn moka_store_expires_entries() {
        let store = MokaKvStore::new(100);
        store
            .put("k", "v".to_string(), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_store_expires_on_read() {
        let store = InMemoryKvStore::new();
        store
            .put("k", "v".to_string(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_store_injects_failures() {
        let store = InMemoryKvStore::new();
        store.set_fail(true);
        assert!(store.get("k").await.is_err());
        assert!(store
            .put("k", "v".to_string(), Duration::from_secs(1))
            .await
            .is_err());
    }
}
