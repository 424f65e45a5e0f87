//! # Key Cache
//!
//! Maps a wrapped key to its unwrapped form so that a burst of messages
//! carrying the same wrapped key costs one remote unwrap.
//!
//! ## Policy
//!
//! - An entry past its TTL is a miss and is removed on sight.
//! - At capacity, the least recently *inserted* entry is evicted. Lookups
//!   use `peek`, so a hit never changes eviction order.
//! - TTLs are capped at [`MAX_CACHE_TTL`].
//! - The cache never performs an unwrap itself.

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Default maximum entry count.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(20);

/// Longest lifetime an entry can be given.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Size and lifetime bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCacheConfig {
    /// Maximum number of live entries.
    pub capacity: usize,
    /// Lifetime used by [`KeyCache::put`].
    pub ttl: Duration,
}

impl Default for KeyCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Hit and miss counts since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing live.
    pub misses: u64,
    /// Entries removed to make room.
    pub evictions: u64,
}

/// Bounded, TTL-aware, thread-safe cache keyed by wrapped-key bytes.
pub struct KeyCache<V> {
    config: KeyCacheConfig,
    entries: Mutex<LruCache<Vec<u8>, (Instant, V)>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> KeyCache<V> {
    /// Empty cache. A capacity of zero is treated as one.
    pub fn new(config: KeyCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            config: KeyCacheConfig {
                capacity: capacity.get(),
                ttl: config.ttl.min(MAX_CACHE_TTL),
            },
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Live value for `wrapped`, if any.
    pub fn get(&self, wrapped: &[u8]) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let found = entries
            .peek(wrapped)
            .filter(|(expires_at, _)| *expires_at > now)
            .map(|(_, value)| value.clone());
        if found.is_none() {
            entries.pop(wrapped);
        }
        drop(entries);

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert with the configured TTL.
    pub fn put(&self, wrapped: &[u8], value: V) {
        self.put_with_ttl(wrapped, value, self.config.ttl);
    }

    /// Insert with an explicit TTL, replacing any existing entry.
    ///
    /// The TTL is capped at [`MAX_CACHE_TTL`]. An expiry that cannot be
    /// represented leaves the entry already expired.
    pub fn put_with_ttl(&self, wrapped: &[u8], value: V, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl.min(MAX_CACHE_TTL)).unwrap_or(now);

        let displaced = self.entries.lock().push(wrapped.to_vec(), (expires_at, value));
        if matches!(displaced, Some((key, _)) if key != wrapped) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove `wrapped`, returning its value if it was live.
    pub fn remove(&self, wrapped: &[u8]) -> Option<V> {
        let now = Instant::now();
        self.entries
            .lock()
            .pop(wrapped)
            .filter(|(expires_at, _)| *expires_at > now)
            .map(|(_, value)| value)
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired: Vec<Vec<u8>> = entries
            .iter()
            .filter(|(_, (expires_at, _))| *expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Entries currently stored, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Hit, miss and eviction counts.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Bounds in effect.
    pub fn config(&self) -> KeyCacheConfig {
        self.config
    }
}

impl<V: Clone> Default for KeyCache<V> {
    fn default() -> Self {
        Self::new(KeyCacheConfig::default())
    }
}

impl<V> std::fmt::Debug for KeyCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("config", &self.config)
            .field("len", &self.entries.lock().len())
            .finish()
    }
}
