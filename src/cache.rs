use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Five minutes, the catalog refresh window the web client used.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    data: V,
    fetched_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_valid_at(&self, now: Instant) -> bool {
        now.duration_since(self.fetched_at) < self.ttl
    }
}

/// Time-windowed cache for fetched catalog data: a value is served only
/// while `now - fetched_at < ttl`. Expired entries read as absent; removal
/// is lazy (`sweep_expired`).
///
/// There is no size bound. The store only ever uses a handful of keys (one
/// per course lesson group plus the course list itself); a bound would be
/// needed before adding more resource types.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    default_ttl: Duration,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        TtlCache {
            entries: HashMap::new(),
            default_ttl,
        }
    }

    /// Returns the stored value only while it is still within its ttl.
    pub fn read(&self, key: &K) -> Option<&V> {
        self.read_at(key, Instant::now())
    }

    fn read_at(&self, key: &K, now: Instant) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_valid_at(now))
            .map(|entry| &entry.data)
    }

    /// Last stored value regardless of freshness. Display path only; never
    /// use this to decide whether a refetch is due.
    pub fn get_stale(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.data)
    }

    pub fn fetched_at(&self, key: &K) -> Option<Instant> {
        self.entries.get(key).map(|entry| entry.fetched_at)
    }

    /// Unconditional overwrite; re-stamps `fetched_at`.
    pub fn write(&mut self, key: K, value: V) {
        self.write_with_ttl(key, value, self.default_ttl);
    }

    pub fn write_with_ttl(&mut self, key: K, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                data: value,
                fetched_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn invalidate(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Housekeeping pass removing every expired entry. Never removes a
    /// still-valid one. Returns how many were dropped.
    pub fn sweep_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid_at(now));
        before - self.entries.len()
    }

    /// Keys currently stored, fresh or not.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
