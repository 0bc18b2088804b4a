//! Revalidating cache for public content reads
//!
//! Entries are valid for a fixed window after they were fetched. The next
//! access after the window recomputes the value. There is no single-flight:
//! concurrent misses may each run the producer, and whichever finishes last
//! wins. Every write replaces the whole entry under the lock, so readers never
//! see a value stitched together from two producer calls.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;

/// A cached value with the time it was produced
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            ttl,
        }
    }

    /// Valid iff less than `ttl` has passed since it was fetched
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

/// Time-windowed cache keyed by string
pub struct RevalidatingCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> RevalidatingCache<V> {
    /// Create an empty cache with the given revalidation window
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key` if still fresh
    pub fn peek(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value.clone())
    }

    /// Return the fresh value for `key`, or run `producer` and cache its result
    pub async fn get_or_refresh<F, Fut>(&self, key: &str, producer: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.peek(key) {
            tracing::debug!("Cache hit: {}", key);
            return value;
        }

        tracing::debug!("Cache miss: {}", key);
        let value = producer().await;
        self.store(key, value.clone());
        value
    }

    /// Replace the entry for `key` with a freshly timestamped value
    pub fn store(&self, key: &str, value: V) {
        let entry = CacheEntry::new(value, self.ttl);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);
    }

    /// Drop one entry
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_producer(
        calls: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> std::future::Ready<usize> + '_ {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(n)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_ttl_produces_once() {
        let cache = RevalidatingCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.get_or_refresh("posts", counting_producer(&calls)).await, 1);
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get_or_refresh("posts", counting_producer(&calls)).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_ttl_produces_again() {
        let cache = RevalidatingCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_or_refresh("posts", counting_producer(&calls)).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get_or_refresh("posts", counting_producer(&calls)).await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The refreshed entry starts a new window
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.get_or_refresh("posts", counting_producer(&calls)).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_exact_at_ttl() {
        let cache = RevalidatingCache::new(Duration::from_secs(60));
        cache.store("k", "old");
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.peek("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let cache = RevalidatingCache::new(Duration::from_secs(60));
        cache.store("a", 1);
        tokio::time::advance(Duration::from_secs(40)).await;
        cache.store("b", 2);
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.peek("a"), None);
        assert_eq!(cache.peek("b"), Some(2));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = RevalidatingCache::new(Duration::from_secs(60));
        cache.store("a", 1);
        cache.store("b", 2);
        cache.invalidate("a");
        assert_eq!(cache.peek("a"), None);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_misses_store_whole_values() {
        let cache = Arc::new(RevalidatingCache::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for i in 0..8usize {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh("list", || async move {
                        tokio::task::yield_now().await;
                        vec![i; 4]
                    })
                    .await
            }));
        }
        for handle in handles {
            let value = handle.await.unwrap();
            assert!(value.iter().all(|v| *v == value[0]));
        }
        let cached = cache.peek("list").unwrap();
        assert!(cached.iter().all(|v| *v == cached[0]));
    }
}
