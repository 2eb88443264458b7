//! Bounded in-memory cache for computed response documents.
//!
//! Capacity-bounded (LRU reclaim on overflow) and time-bounded (fixed TTL
//! from insertion). Lookups promote recency but never refresh the insertion
//! timestamp, so an entry always dies 24 hours after it was stored no matter
//! how often it is read. Single process only; nothing survives a restart.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

/// Default number of entries kept before the least-recently-used one is
/// evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Default lifetime of an entry, measured from insertion.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Thread-safe TTL+LRU map keyed by strings.
pub struct TtlLruCache<V> {
    entries: Mutex<LruCache<String, Entry<V>>>,
    ttl: Duration,
}

impl<V: Clone> TtlLruCache<V> {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Builds a cache with the service defaults (1000 entries, 24h TTL).
    pub fn with_defaults() -> Self {
        let capacity =
            NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self::new(capacity, DEFAULT_CACHE_TTL)
    }

    /// Returns a clone of the stored value, or `None` when the key is absent
    /// or its entry has outlived the TTL. Expired entries are removed on the
    /// spot so they stop occupying capacity.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Stores a value, evicting the least-recently-used entry when the cache
    /// is full.
    pub fn put(&self, key: String, value: V) {
        let mut entries = self.entries.lock();
        entries.push(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
