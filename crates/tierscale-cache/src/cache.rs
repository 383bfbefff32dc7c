//! Read-through cache with hit/miss accounting.
//!
//! Entries never expire and are never evicted for the lifetime of the
//! process. Cache statistics (hits, misses) are lock-free counters and are
//! emitted with every lookup as `tracing::debug` fields.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use tierscale_core::{BoxFuture, DataStore, OpsResult};

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// In-memory key/value cache backed by a [`DataStore`] for the paths that
/// must not be cached.
///
/// # Concurrency model
///
/// The map sits behind a `std::sync::RwLock`; lock hold time is a single
/// hash map lookup or insert and never spans an await point.
pub struct ReadThroughCache {
    entries: RwLock<HashMap<String, String>>,
    /// Store for transactions and write-through updates.
    backing: Arc<dyn DataStore>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ReadThroughCache {
    pub fn new(backing: Arc<dyn DataStore>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            backing,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `key` without touching the backing store.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let value = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();

        match &value {
            Some(_) => {
                let hits = self.hits.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    %key,
                    cache_hits = hits,
                    cache_misses = self.misses.load(Ordering::Relaxed),
                    "cache hit"
                );
            }
            None => {
                let misses = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    %key,
                    cache_hits = self.hits.load(Ordering::Relaxed),
                    cache_misses = misses,
                    "cache miss"
                );
            }
        }
        value
    }

    /// Insert or overwrite an entry. Overwrites with the same value are
    /// indistinguishable from a single insert.
    pub fn fill(&self, key: &str, value: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    /// Write `value` to the backing store and refresh the cached copy only
    /// if the backing accepted the write.
    pub async fn write_through(&self, key: &str, value: &str, auth: &str) -> OpsResult<bool> {
        let accepted = self.backing.set(key, value, auth).await?;
        if accepted {
            self.fill(key, value);
        } else {
            warn!(%key, "backing store rejected write-through");
        }
        Ok(accepted)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DataStore for ReadThroughCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, OpsResult<Option<String>>> {
        Box::pin(async move { Ok(self.lookup(key)) })
    }

    /// Populate the cache. Fills are not authenticated; `auth` only
    /// matters on the write-through path.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        _auth: &'a str,
    ) -> BoxFuture<'a, OpsResult<bool>> {
        Box::pin(async move {
            self.fill(key, value);
            Ok(true)
        })
    }

    fn transaction<'a>(
        &'a self,
        item: &'a str,
        price: f32,
        qty: u32,
    ) -> BoxFuture<'a, OpsResult<bool>> {
        self.backing.transaction(item, price, qty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CacheOnlyStore, MemoryStore};
    use tierscale_core::OpsError;

    fn memory_backing() -> Arc<MemoryStore> {
        let store = MemoryStore::new("secret");
        store.seed_item("apple", 1.25, 10);
        Arc::new(store)
    }

    #[tokio::test]
    async fn get_on_empty_cache_is_a_miss() {
        let cache = ReadThroughCache::new(memory_backing());
        assert_eq!(cache.get("apple").await.unwrap(), None);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[tokio::test]
    async fn set_then_get_hits() {
        let cache = ReadThroughCache::new(memory_backing());
        assert!(cache.set("k", "v", "").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 0,
                entries: 1
            }
        );
    }

    #[tokio::test]
    async fn get_never_reaches_the_backing_store() {
        let backing = memory_backing();
        let cache = ReadThroughCache::new(backing.clone());
        assert_eq!(cache.get("apple").await.unwrap(), None);
        assert_eq!(backing.reads(), 0);
    }

    #[tokio::test]
    async fn transaction_is_forwarded_uncached() {
        let backing = memory_backing();
        let cache = ReadThroughCache::new(backing.clone());
        assert!(cache.transaction("apple", 1.25, 4).await.unwrap());
        assert!(cache.is_empty());
        assert_eq!(backing.stock("apple"), Some(6));
    }

    #[tokio::test]
    async fn transaction_against_cache_only_backing_fails_loudly() {
        let cache = ReadThroughCache::new(Arc::new(CacheOnlyStore::new([(
            "apple".to_string(),
            "ITEM".to_string(),
        )])));
        let err = cache.transaction("apple", 1.0, 1).await.unwrap_err();
        assert!(matches!(err, OpsError::Unsupported(op) if op == "transaction"));
    }

    #[tokio::test]
    async fn write_through_refreshes_only_on_accept() {
        let backing = memory_backing();
        let cache = ReadThroughCache::new(backing.clone());

        assert!(!cache.write_through("banner", "hello", "wrong").await.unwrap());
        assert!(cache.is_empty());

        assert!(cache.write_through("banner", "hello", "secret").await.unwrap());
        assert_eq!(cache.lookup("banner").as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn concurrent_identical_fills_leave_one_entry() {
        let cache = Arc::new(ReadThroughCache::new(memory_backing()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let seen = cache.get("hot").await.unwrap();
                assert!(seen.is_none() || seen.as_deref() == Some("value"));
                cache.set("hot", "value", "").await.unwrap()
            }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("hot").await.unwrap().as_deref(), Some("value"));
    }
}
