//! Time-bounded memo cache shared by price and volatility lookups.

use dashmap::DashMap;
use log::debug;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Default time-to-live for memoized lookups (one hour)
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent cache whose entries expire after a fixed TTL.
///
/// The cache is owned by whichever component performs the slow call; callers
/// never see whether a value came from the cache or not. A zero TTL disables it.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl > Duration::ZERO
    }

    /// Get a live entry, evicting it if it has expired
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if Instant::now() <= entry.expires_at => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        // only evict if no fresh value was inserted since the read
        if expired
            && self
                .entries
                .remove_if(key, |_, entry| entry.expires_at < Instant::now())
                .is_some()
        {
            debug!("Cache entry expired for {:?}", key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        if !self.is_enabled() {
            return;
        }
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Return the cached value or compute, store and return a fresh one.
    /// Errors from `load` are passed through and nothing is cached.
    pub fn get_or_try_insert_with<E, F>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            debug!("Cache hit for {:?}", key);
            return Ok(value);
        }
        debug!("Cache miss for {:?}", key);
        let value = load()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn clear_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_get_or_insert_loads_once() {
        let cache: TtlCache<String, f64> = TtlCache::default();
        let calls = Cell::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with("SPY".to_string(), || {
                    calls.set(calls.get() + 1);
                    Ok::<_, String>(0.15)
                })
                .unwrap();
            assert_eq!(value, 0.15);
        }

        assert_eq!(calls.get(), 1, "loader should run only on the first miss");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_loader_error_is_not_cached() {
        let cache: TtlCache<String, f64> = TtlCache::default();
        let result = cache.get_or_try_insert_with("BAD".to_string(), || Err("offline"));
        assert_eq!(result, Err("offline"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let cache: TtlCache<String, f64> = TtlCache::disabled();
        cache.insert("SPY".to_string(), 0.15);
        assert!(cache.get(&"SPY".to_string()).is_none());
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let cache: TtlCache<String, f64> = TtlCache::new(Duration::from_millis(1));
        cache.insert("SPY".to_string(), 0.15);
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get(&"SPY".to_string()).is_none());
        assert!(cache.is_empty(), "expired entry should be removed on read");
    }

    #[test]
    fn test_refreshed_entry_survives_expiry_check() {
        let cache: TtlCache<String, f64> = TtlCache::new(Duration::from_millis(20));
        cache.insert("SPY".to_string(), 0.15);
        std::thread::sleep(Duration::from_millis(40));
        cache.insert("SPY".to_string(), 0.16);
        assert_eq!(cache.get(&"SPY".to_string()), Some(0.16));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_expired_sweeps_stale_entries() {
        let cache: TtlCache<String, f64> = TtlCache::new(Duration::from_millis(1));
        cache.insert("SPY".to_string(), 0.15);
        cache.insert("AGG".to_string(), 0.05);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.len(), 2);
        cache.clear_expired();
        assert!(cache.is_empty());
    }
}
