//! In-process, time-bounded query cache.
//!
//! Entries are never evicted on lookup; an expired entry is shadowed until it
//! is overwritten by the next `put` for the same key or removed by
//! `purge_expired`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use meteo_store::WeatherObservation;

use crate::statistics::CityStatistics;

/// Default lifetime of a cached value.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) < ttl
    }
}

/// Thread-safe map from key to value with a single global time-to-live.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Cached value for `key` if it was stored less than `ttl` ago.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Insert or overwrite the value for `key`.
    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    /// Insert `value` only if `keep` still holds while the write lock is held.
    ///
    /// Returns whether the value was stored.
    pub fn put_if(&self, key: K, value: V, keep: impl FnOnce() -> bool) -> bool {
        let mut entries = self.entries.write();
        if !keep() {
            return false;
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.value.clone())
    }

    fn put_at(&self, key: K, value: V, now: Instant) {
        self.entries.write().insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    /// Remove every expired entry and return how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now, self.ttl));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove entries whose key matches `predicate`.
    pub fn remove_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        before - entries.len()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

/// Identity of a cacheable query: operation plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Current { city: String },
    History { city: String, limit: usize },
    Statistics { city: String },
}

impl CacheKey {
    pub fn current(city: &str) -> Self {
        Self::Current {
            city: city.to_string(),
        }
    }

    pub fn history(city: &str, limit: usize) -> Self {
        Self::History {
            city: city.to_string(),
            limit,
        }
    }

    pub fn statistics(city: &str) -> Self {
        Self::Statistics {
            city: city.to_string(),
        }
    }

    /// Operation tag used in log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Current { .. } => "current",
            Self::History { .. } => "history",
            Self::Statistics { .. } => "stats",
        }
    }

    pub fn city(&self) -> &str {
        match self {
            Self::Current { city } | Self::History { city, .. } | Self::Statistics { city } => city,
        }
    }
}

/// A cached query result.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Current(WeatherObservation),
    History(Vec<WeatherObservation>),
    Statistics(CityStatistics),
}

/// Cache used by the weather service.
pub type QueryCache = TtlCache<CacheKey, CachedValue>;

impl QueryCache {
    /// Drop every entry computed for `city`.
    pub fn invalidate_city(&self, city: &str) -> usize {
        self.remove_where(|key| key.city() == city)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    const TTL: Duration = Duration::from_secs(300);
    const EPSILON: Duration = Duration::from_millis(1);

    #[test]
    fn test_value_visible_until_ttl() {
        let cache: TtlCache<&str, i32> = TtlCache::new(TTL);
        let t0 = Instant::now();
        cache.put_at("k", 1, t0);

        assert_eq!(cache.get_at(&"k", t0), Some(1));
        assert_eq!(cache.get_at(&"k", t0 + TTL - EPSILON), Some(1));
        assert_eq!(cache.get_at(&"k", t0 + TTL), None);
        assert_eq!(cache.get_at(&"k", t0 + TTL + EPSILON), None);
    }

    #[test]
    fn test_expired_entry_is_shadowed_not_removed() {
        let cache: TtlCache<&str, i32> = TtlCache::new(TTL);
        let t0 = Instant::now();
        cache.put_at("k", 1, t0);

        assert_eq!(cache.get_at(&"k", t0 + TTL + EPSILON), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_overwrite_makes_second_value_visible() {
        let cache: TtlCache<&str, i32> = TtlCache::default();
        cache.put("k", 1);
        cache.put("k", 2);
        assert_eq!(cache.get(&"k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_overwrite_refreshes_insertion_time() {
        let cache: TtlCache<&str, i32> = TtlCache::new(TTL);
        let t0 = Instant::now();
        cache.put_at("k", 1, t0);
        cache.put_at("k", 2, t0 + TTL);

        assert_eq!(cache.get_at(&"k", t0 + TTL + EPSILON), Some(2));
    }

    #[test]
    fn test_put_if_rejected() {
        let cache: TtlCache<&str, i32> = TtlCache::default();
        assert!(!cache.put_if("k", 1, || false));
        assert!(cache.is_empty());

        assert!(cache.put_if("k", 2, || true));
        assert_eq!(cache.get(&"k"), Some(2));
    }

    #[test]
    fn test_missing_key() {
        let cache: TtlCache<&str, i32> = TtlCache::default();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&"missing"), None);
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::ZERO);
        cache.put("k", 1);
        assert_eq!(cache.get(&"k"), None);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_do_not_collide_across_operations() {
        let cache: TtlCache<CacheKey, i32> = TtlCache::default();
        cache.put(CacheKey::current("Paris"), 1);
        cache.put(CacheKey::statistics("Paris"), 2);
        cache.put(CacheKey::history("Paris", 10), 3);
        cache.put(CacheKey::history("Paris", 5), 4);

        assert_eq!(cache.get(&CacheKey::current("Paris")), Some(1));
        assert_eq!(cache.get(&CacheKey::statistics("Paris")), Some(2));
        assert_eq!(cache.get(&CacheKey::history("Paris", 10)), Some(3));
        assert_eq!(cache.get(&CacheKey::history("Paris", 5)), Some(4));
        assert_eq!(cache.get(&CacheKey::current("paris")), None);
    }

    #[test]
    fn test_invalidate_city() {
        let cache = QueryCache::default();
        let stats = CityStatistics::from_temperatures(&[1.0]).unwrap();
        cache.put(CacheKey::statistics("Paris"), CachedValue::Statistics(stats.clone()));
        cache.put(CacheKey::history("Paris", 10), CachedValue::History(vec![]));
        cache.put(CacheKey::statistics("London"), CachedValue::Statistics(stats));

        assert_eq!(cache.invalidate_city("Paris"), 2);
        assert!(cache.get(&CacheKey::statistics("Paris")).is_none());
        assert!(cache.get(&CacheKey::statistics("London")).is_some());
    }

    #[test]
    fn test_key_tags() {
        assert_eq!(CacheKey::current("x").tag(), "current");
        assert_eq!(CacheKey::history("x", 1).tag(), "history");
        assert_eq!(CacheKey::statistics("x").tag(), "stats");
    }
}
