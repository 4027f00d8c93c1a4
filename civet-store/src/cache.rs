//! Bounded TTL cache used by [`crate::FileStore`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counters describing cache behavior since construction (or the last
/// [`TtlCache::clear`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hit ratio in `[0, 1]`, 0 when the cache has never been read.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

struct Inner<T> {
    map: HashMap<String, Entry<T>>,
    generation: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// A capacity-bounded cache whose entries expire after a fixed TTL.
///
/// Reads refresh the TTL of the entry they hit, so hot objects stay
/// resident while cold ones age out. When full, the entry closest to
/// expiry is evicted to make room.
pub struct TtlCache<T> {
    inner: Mutex<Inner<T>>,
    ttl: Duration,
    capacity: usize,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                generation: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Returns a clone of the cached value, refreshing its TTL. Expired
    /// entries count as misses and are dropped on the spot.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match inner.map.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + self.ttl;
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            Some(_) => {
                inner.map.remove(key);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: &str, value: T) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        self.insert_locked(&mut inner, key, value);
    }

    fn insert_locked(&self, inner: &mut Inner<T>, key: &str, value: T) {
        let now = Instant::now();
        if !inner.map.contains_key(key) && inner.map.len() >= self.capacity {
            // Evict the entry nearest expiry (least recently refreshed).
            if let Some(victim) = inner
                .map
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            {
                inner.map.remove(&victim);
                inner.evictions += 1;
            }
        }
        inner.map.insert(
            key.to_owned(),
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// The current invalidation generation. Capture it before a disk read
    /// and pass it to [`TtlCache::insert_if_fresh`] so a fill that raced a
    /// write cannot resurrect the pre-write document.
    pub fn generation(&self) -> u64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.generation
    }

    /// Inserts only if no invalidation happened since `generation` was
    /// captured.
    pub fn insert_if_fresh(&self, key: &str, value: T, generation: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.generation != generation {
            return;
        }
        self.insert_locked(&mut inner, key, value);
    }

    pub fn invalidate(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.generation += 1;
        inner.map.remove(key);
    }

    /// Drops all entries and resets the counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.generation += 1;
        inner.map.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    /// Removes expired entries, returning how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let before = inner.map.len();
        inner.map.retain(|_, e| e.expires_at > now);
        before - inner.map.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            entries: inner.map.len(),
        }
    }
}
