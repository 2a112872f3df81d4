//! Bounded cache of inferred node shapes keyed by subgraph hash.
//!
//! Shape inference closures can be expensive, and tracing the same model step repeatedly records
//! structurally identical subgraphs. Since a node's subgraph hash identifies the whole computation
//! rooted at it, the first inferred shape for a hash is reused for every later node that shares it.
//!
//! All access goes through a single mutex. Closures are never run while the lock is held, so a
//! closure may itself resolve operand shapes through the same cache. Two threads that miss on the
//! same key at once may both run their closures; only the first inserted value is kept.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;
use lru::LruCache;
use serde::Serialize;

use super::hashing::HashValue;
use super::shape::ShapeDescriptor;

/// Number of cached shapes retained before LRU eviction kicks in.
pub const DEFAULT_SHAPE_CACHE_CAPACITY: usize = 4096;

/// Snapshot of cache activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

pub struct ShapeCache {
    capacity: usize,
    entries: Mutex<LruCache<HashValue, Arc<ShapeDescriptor>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl ShapeCache {
    /// Creates a cache holding at most `capacity` shapes. A zero capacity is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        ShapeCache {
            capacity: capacity.get(),
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up `key`, marking the entry as most recently used on a hit.
    pub fn get(&self, key: HashValue) -> Option<Arc<ShapeDescriptor>> {
        let found = self.lock().get(&key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("shape cache hit for {key}");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!("shape cache miss for {key}");
        }
        found
    }

    /// Checks for `key` without touching recency or counters.
    pub fn contains(&self, key: HashValue) -> bool {
        self.lock().contains(&key)
    }

    /// Stores `shape` under `key` and returns the value now held for that key.
    ///
    /// When the key is already present the existing value wins and `shape` is dropped.
    pub fn insert(&self, key: HashValue, shape: ShapeDescriptor) -> Arc<ShapeDescriptor> {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&key) {
            return Arc::clone(existing);
        }
        let shape = Arc::new(shape);
        if let Some((evicted, _)) = entries.push(key, Arc::clone(&shape)) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!("shape cache evicted {evicted} to make room for {key}");
        }
        self.inserts.fetch_add(1, Ordering::Relaxed);
        shape
    }

    /// Returns the cached shape for `key`, computing and inserting it with `infer` on a miss.
    pub fn get_or_try_insert_with<F, E>(
        &self,
        key: HashValue,
        infer: F,
    ) -> Result<Arc<ShapeDescriptor>, E>
    where
        F: FnOnce() -> Result<ShapeDescriptor, E>,
    {
        if let Some(shape) = self.get(key) {
            return Ok(shape);
        }
        let shape = infer()?;
        Ok(self.insert(key, shape))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<HashValue, Arc<ShapeDescriptor>>> {
        self.entries.lock().expect("shape cache poisoned")
    }
}

impl Default for ShapeCache {
    fn default() -> Self {
        ShapeCache::new(DEFAULT_SHAPE_CACHE_CAPACITY)
    }
}

impl fmt::Debug for ShapeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}
