use crate::entry::CachedPage;
use crate::stats::CacheStats;
use ahash::AHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Slot {
    page: Arc<CachedPage>,
    seq: u64,
}

/// Insertion-ordered store with a single TTL for every entry.
///
/// New entries are appended to the back of `order`; eviction and expiry both
/// work from the front. Because the TTL is uniform, the front is always the
/// entry closest to expiring, so a purge can stop at the first live entry.
///
/// Replacing or removing a key leaves its old `order` record behind. Those
/// records are recognised by a sequence mismatch and skipped, and the log is
/// compacted once stale records outnumber live ones.
///
/// All methods take `&mut self`; see [`crate::PageCache`] for the shared form.
pub struct FifoStore {
    map: AHashMap<String, Slot>,
    order: VecDeque<(String, u64)>,
    next_seq: u64,
    capacity: usize,
    ttl: Duration,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl FifoStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        assert!(capacity > 0, "cache capacity must be > 0");
        Self {
            map: AHashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            next_seq: 0,
            capacity,
            ttl,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    /// Look up a key. Expired entries are dropped and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<Arc<CachedPage>> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<Arc<CachedPage>> {
        let Some(slot) = self.map.get(key) else {
            self.misses += 1;
            return None;
        };

        if slot.page.is_expired_at(self.ttl, now) {
            self.map.remove(key);
            self.expirations += 1;
            self.misses += 1;
            return None;
        }

        let page = Arc::clone(&slot.page);
        self.hits += 1;
        Some(page)
    }

    /// Insert or replace `key`. The entry becomes the newest one regardless of
    /// whether the key was already present.
    pub fn insert(&mut self, key: String, page: CachedPage) {
        // Replacement frees its own slot, so it never triggers an eviction.
        self.map.remove(&key);

        if self.map.len() >= self.capacity {
            self.purge_expired_at(Instant::now());
        }
        while self.map.len() >= self.capacity {
            if !self.evict_oldest() {
                break;
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((key.clone(), seq));
        self.map.insert(
            key,
            Slot {
                page: Arc::new(page),
                seq,
            },
        );

        if self.order.len() > self.capacity.saturating_mul(2).max(16) {
            self.compact();
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }

    /// Drop every entry whose TTL has elapsed at `now`. Returns how many were dropped.
    pub fn purge_expired_at(&mut self, now: Instant) -> usize {
        let mut purged = 0;
        while let Some((key, seq)) = self.order.front() {
            match self.map.get(key) {
                Some(slot) if slot.seq == *seq => {
                    if !slot.page.is_expired_at(self.ttl, now) {
                        break;
                    }
                    self.map.remove(key);
                    self.expirations += 1;
                    purged += 1;
                }
                _ => {}
            }
            self.order.pop_front();
        }
        purged
    }

    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Remove the oldest live entry. Returns false if the store is empty.
    fn evict_oldest(&mut self) -> bool {
        while let Some((key, seq)) = self.order.pop_front() {
            let live = self.map.get(&key).is_some_and(|slot| slot.seq == seq);
            if live {
                self.map.remove(&key);
                self.evictions += 1;
                return true;
            }
        }
        false
    }

    fn compact(&mut self) {
        let map = &self.map;
        self.order
            .retain(|(key, seq)| map.get(key).is_some_and(|slot| slot.seq == *seq));
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
            current_size: self.map.len(),
            capacity: self.capacity,
        }
    }
}
