/*!
 * Preview artifact caching.
 *
 * Rendered previews are kept per content key so that toggling back to a
 * recently previewed style is free. The store is bounded (least recently used
 * entry goes first) and entries stop being served once older than the TTL.
 */

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::app_config::PreviewConfig;
use crate::style::CacheKey;

/// A stored artifact, never mutated after insertion
#[derive(Debug, Clone)]
struct CacheEntry {
    artifact: Arc<str>,
    created_at: Instant,
}

/// Counters for cache effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Entries dropped to make room
    pub evictions: usize,
    /// Entries dropped because they outlived the TTL
    pub expirations: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

struct CacheInner {
    entries: LruCache<CacheKey, CacheEntry>,
    stats: CacheStats,
}

/// Bounded, time-expiring store of preview artifacts
///
/// Clones share the same storage, so one instance can be handed to every
/// consumer of an editor session.
#[derive(Clone)]
pub struct PreviewCache {
    inner: Arc<Mutex<CacheInner>>,
    ttl: Duration,
    max_size: NonZeroUsize,
}

impl PreviewCache {
    /// Create a cache holding at most `max_size` entries (minimum 1)
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let max_size = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: LruCache::new(max_size),
                stats: CacheStats::default(),
            })),
            ttl,
            max_size,
        }
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        Self::new(config.cache_max_size, config.cache_ttl())
    }

    /// Look up an artifact
    ///
    /// An entry older than the TTL is removed under the same lock that decides
    /// the miss, so it can never be returned afterwards.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<str>> {
        let mut inner = self.inner.lock();

        let expired = match inner.entries.peek(key) {
            Some(entry) => entry.created_at.elapsed() > self.ttl,
            None => {
                inner.stats.misses += 1;
                debug!("Preview cache miss for {}", key.short());
                return None;
            }
        };

        if expired {
            inner.entries.pop(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            debug!("Preview cache entry {} expired", key.short());
            return None;
        }

        inner.stats.hits += 1;
        debug!("Preview cache hit for {}", key.short());
        inner.entries.get(key).map(|entry| entry.artifact.clone())
    }

    /// Insert or replace an artifact, evicting the least recently used entry
    /// when full
    pub fn put(&self, key: CacheKey, artifact: impl Into<Arc<str>>) {
        let mut inner = self.inner.lock();
        let entry = CacheEntry {
            artifact: artifact.into(),
            created_at: Instant::now(),
        };

        let short = key.short().to_string();
        if let Some((evicted, _)) = inner.entries.push(key.clone(), entry) {
            if evicted != key {
                inner.stats.evictions += 1;
                debug!("Preview cache full, evicted {}", evicted.short());
            }
        }
        debug!("Cached preview {} ({} entries)", short, inner.entries.len());
    }

    /// Whether a fresh entry exists, without touching recency or counters
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner
            .lock()
            .entries
            .peek(key)
            .is_some_and(|entry| entry.created_at.elapsed() <= self.ttl)
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.stats = CacheStats::default();
        debug!("Preview cache cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    pub fn max_size(&self) -> usize {
        self.max_size.get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for PreviewCache {
    fn default() -> Self {
        Self::from_config(&PreviewConfig::default())
    }
}

impl std::fmt::Debug for PreviewCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewCache")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .field("ttl", &self.ttl)
            .finish()
    }
}
