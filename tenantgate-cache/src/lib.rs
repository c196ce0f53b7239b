//! In-process TTL cache with tag-based bulk invalidation.
//!
//! Every entry carries its own TTL and a set of tags. Reading an entry whose
//! TTL has passed is a miss, but the entry itself is retained for a
//! configurable *stale grace* period so a caller can fall back to it through
//! [`TagCache::get_stale`] when the upstream is unavailable. Entries past
//! their grace period are purged lazily on access or by [`TagCache::purge_expired`].
//!
//! ```ignore
//! use std::time::Duration;
//! use tenantgate_cache::{Invalidation, TagCache};
//!
//! let cache = TagCache::new();
//! cache.set("tenant:acme", 42, Duration::from_secs(900), &["tenant", "tenant_42"]);
//! assert_eq!(cache.get("tenant:acme"), Some(42));
//!
//! cache.invalidate(Invalidation::tags(&["tenant_42"]));
//! assert_eq!(cache.get("tenant:acme"), None);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// Roughly thirty years; stands in for expiries that overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline(start: Instant, ttl: Duration) -> Instant {
    start
        .checked_add(ttl)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// A stored value with its expiry and tags.
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    tags: Vec<String>,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    fn is_retained(&self, now: Instant, grace: Duration) -> bool {
        now < deadline(self.expires_at, grace)
    }
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// tag -> keys currently registered under it
    tags: HashMap<String, HashSet<String>>,
}

impl<V> CacheInner<V> {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.detach(key, &entry.tags);
                true
            }
            None => false,
        }
    }

    fn detach(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }
}

/// What to drop in a call to [`TagCache::invalidate`].
///
/// Always names a key, a list of tags, or both.
#[derive(Debug, Clone, Copy)]
pub struct Invalidation<'a> {
    key: Option<&'a str>,
    tags: &'a [&'a str],
}

impl<'a> Invalidation<'a> {
    /// Drop the entry stored under `key`.
    pub fn key(key: &'a str) -> Self {
        Self { key: Some(key), tags: &[] }
    }

    /// Drop every entry registered under any of `tags`.
    pub fn tags(tags: &'a [&'a str]) -> Self {
        Self { key: None, tags }
    }

    /// Drop the entry under `key` and every entry registered under `tags`.
    pub fn key_and_tags(key: &'a str, tags: &'a [&'a str]) -> Self {
        Self { key: Some(key), tags }
    }
}

/// Hit/miss counters since the cache was created.
///
/// Observability only; nothing in the cache reads them back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Reads served by [`TagCache::get_stale`] from an expired entry.
    pub stale_hits: u64,
    /// Entries currently held, including expired ones still in their grace period.
    pub entries: usize,
}

/// Thread-safe TTL cache keyed by string, with tag-based invalidation.
///
/// Cloning is cheap and yields a handle to the same storage. All mutations
/// go through a single mutex, so `set` and `invalidate` are atomic with
/// respect to each other. A poisoned mutex degrades every read to a miss.
pub struct TagCache<V> {
    inner: Arc<Mutex<CacheInner<V>>>,
    stale_grace: Duration,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    stale_hits: Arc<AtomicU64>,
}

impl<V> Clone for TagCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            stale_grace: self.stale_grace,
            hits: Arc::clone(&self.hits),
            misses: Arc::clone(&self.misses),
            stale_hits: Arc::clone(&self.stale_hits),
        }
    }
}

impl<V: Clone> Default for TagCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TagCache<V> {
    /// Create a cache that drops entries as soon as their TTL passes.
    pub fn new() -> Self {
        Self::with_stale_grace(Duration::ZERO)
    }

    /// Create a cache that keeps expired entries readable through
    /// [`get_stale`](Self::get_stale) for `stale_grace` after their TTL.
    pub fn with_stale_grace(stale_grace: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                tags: HashMap::new(),
            })),
            stale_grace,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            stale_hits: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, CacheInner<V>>> {
        match self.inner.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                tracing::warn!("tag cache mutex poisoned, treating access as a miss");
                None
            }
        }
    }

    /// Get a value if it exists and hasn't expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let found = self.lock().and_then(|mut inner| {
            let (fresh, retained) = match inner.entries.get(key) {
                Some(entry) => (
                    entry.is_fresh(now).then(|| entry.value.clone()),
                    entry.is_retained(now, self.stale_grace),
                ),
                None => return None,
            };
            if fresh.is_none() && !retained {
                inner.remove(key);
            }
            fresh
        });

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Whether `key` holds an unexpired entry. Does not touch the hit/miss
    /// counters.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .map(|inner| inner.entries.get(key).is_some_and(|e| e.is_fresh(now)))
            .unwrap_or(false)
    }

    /// Get a value even if its TTL has passed, as long as it is still within
    /// the stale grace period.
    pub fn get_stale(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        let entry = inner.entries.get(key)?;
        if entry.is_fresh(now) {
            return Some(entry.value.clone());
        }
        if entry.is_retained(now, self.stale_grace) {
            self.stale_hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }
        inner.remove(key);
        None
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry, and
    /// register `key` under each of `tags`.
    pub fn set(&self, key: &str, value: V, ttl: Duration, tags: &[&str]) {
        let Some(mut inner) = self.lock() else {
            return;
        };
        inner.remove(key);

        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        for tag in &tags {
            inner
                .tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: deadline(Instant::now(), ttl),
                tags,
            },
        );
    }

    /// Drop the entries named by `target`. Returns how many were removed.
    pub fn invalidate(&self, target: Invalidation<'_>) -> usize {
        let Some(mut inner) = self.lock() else {
            return 0;
        };
        let mut removed = 0;

        if let Some(key) = target.key {
            if inner.remove(key) {
                removed += 1;
            }
        }

        for tag in target.tags {
            let keys: Vec<String> = inner
                .tags
                .get(*tag)
                .map(|keys| keys.iter().cloned().collect())
                .unwrap_or_default();
            for key in keys {
                if inner.remove(&key) {
                    removed += 1;
                }
            }
        }

        tracing::trace!(key = ?target.key, tags = ?target.tags, removed, "cache invalidation");
        removed
    }

    /// Remove every entry past its stale grace period. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let Some(mut inner) = self.lock() else {
            return 0;
        };
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_retained(now, self.stale_grace))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    /// Remove all entries. Counters are kept.
    pub fn clear(&self) {
        if let Some(mut inner) = self.lock() {
            inner.entries.clear();
            inner.tags.clear();
        }
    }

    /// Number of entries held, including expired ones within their grace period.
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
