//! Expiring key/value cache for read-heavy queries.
//!
//! Entries carry their own TTL. An entry is valid while
//! `now - stored_at <= ttl`; stale entries are treated as absent and removed
//! on the next access or by [`TtlCache::sweep_expired`].
//!
//! The cache also keeps an epoch that advances on every invalidation. A
//! reader that fetched under an older epoch must not repopulate the cache,
//! see [`TtlCache::insert_if_current`].

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// A cached value with its insertion time and lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value.
    pub data: V,
    /// When the value was stored.
    pub stored_at: Instant,
    /// How long the value stays valid.
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Returns true if the entry is still valid at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= self.ttl
    }
}

/// A generic TTL cache.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    epoch: u64,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            epoch: 0,
        }
    }

    /// Returns a clone of the value for `key` if present and fresh.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.is_fresh(now) => Some(entry.data.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value` under `key` for `ttl`.
    pub fn set(&mut self, key: K, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                data: value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Stores `value` only if no invalidation happened since `epoch` was read.
    ///
    /// Returns true if the value was stored.
    pub fn insert_if_current(&mut self, epoch: u64, key: K, value: V, ttl: Duration) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.set(key, value, ttl);
        true
    }

    /// Returns the current invalidation epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Removes every entry and advances the epoch.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Removes stale entries. Returns how many were removed.
    pub fn sweep_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before - self.entries.len()
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V: Clone> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
