use crate::entry::CachedPage;
use crate::fifo::FifoStore;
use crate::stats::CacheStats;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe response cache shared by all request handlers.
///
/// A single lock guards the whole store. Eviction order is global
/// (oldest-inserted first across every key), which a sharded layout would not
/// give us. Every operation is a hash lookup plus an amortised O(1) queue
/// update, so the critical section stays short.
pub struct PageCache {
    inner: Mutex<FifoStore>,
}

impl PageCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(FifoStore::new(capacity, ttl)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<CachedPage>> {
        self.inner.lock().get(key)
    }

    pub fn insert(&self, key: String, page: CachedPage) {
        self.inner.lock().insert(key, page);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().remove(key)
    }

    pub fn purge_expired(&self) -> usize {
        self.inner.lock().purge_expired()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn ttl(&self) -> Duration {
        self.inner.lock().ttl()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }
}
