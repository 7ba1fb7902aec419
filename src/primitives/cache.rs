//! Generic jittered-TTL local cache, the multi-instance-safe workhorse
//! behind the registry and rate-limit resolver.
//!
//! `DashMap`-backed, `Instant`-stamped entries, generalized to any `(K, V)`
//! and given per-entry jittered expiry so that a fleet of gateway instances
//! refreshing the same keys doesn't stampede the backing store all at
//! once.

use dashmap::DashMap;
use rand::Rng;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Jitter factor `j` must lie in `[0, 0.5]`.
fn clamp_jitter(jitter: f64) -> f64 {
    jitter.clamp(0.0, 0.5)
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A `(K -> V)` cache with per-entry jittered TTL expiry and a soft size cap.
///
/// `get` never extends an entry's lifetime (no LRU-on-read promotion of
/// expiry) -- only `put` schedules expiry, exactly once. Eviction of
/// expired entries is lazy (checked on access) plus a size-bounded sweep so
/// the map doesn't grow unboundedly under pure-write workloads with no
/// reads.
pub struct LocalCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    jitter: f64,
    max_entries: usize,
}

impl<K, V> LocalCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Build a cache with a base `ttl`, a `jitter` factor in `[0, 0.5]`
    /// (clamped), and a soft `max_entries` cap.
    pub fn new(ttl: Duration, jitter: f64, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            jitter: clamp_jitter(jitter),
            max_entries,
        }
    }

    /// Returns `Some(v)` iff the entry exists and has not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.expires_at > Instant::now() {
            Some(entry.value.clone())
        } else {
            drop(entry);
            self.entries.remove(key);
            None
        }
    }

    /// Insert `value`, scheduling its jittered expiry once. A subsequent
    /// `put` for the same key resets the expiry (it is a fresh write, not a
    /// read-driven refresh).
    pub fn put(&self, key: K, value: V) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_one_expired_or_oldest();
        }
        let expires_at = Instant::now() + jittered_duration(self.ttl, self.jitter);
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Drop `key` immediately, regardless of expiry.
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every entry. Used when a registration change makes the whole
    /// cache's view of the world stale (e.g. rate-limit config cache
    /// invalidation on local registration update).
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Best-effort size, may lag reality (expired-but-not-yet-evicted
    /// entries still count). Not consulted for correctness, only for
    /// telemetry.
    pub fn estimated_size(&self) -> usize {
        self.entries.len()
    }

    fn evict_one_expired_or_oldest(&self) {
        let now = Instant::now();
        if let Some(expired_key) = self
            .entries
            .iter()
            .find(|e| e.expires_at <= now)
            .map(|e| e.key().clone())
        {
            self.entries.remove(&expired_key);
            return;
        }
        // No expired entries to reclaim: evict whichever entry expires
        // soonest, approximating LRU without tracking access recency.
        if let Some(soonest) = self
            .entries
            .iter()
            .min_by_key(|e| e.expires_at)
            .map(|e| e.key().clone())
        {
            self.entries.remove(&soonest);
        }
    }
}

/// `ttl * (1 + eps)` where `eps ~ Uniform(-jitter, +jitter)`.
fn jittered_duration(ttl: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return ttl;
    }
    let mut rng = rand::rng();
    let eps: f64 = rng.random_range(-jitter..=jitter);
    let factor = (1.0 + eps).max(0.0);
    Duration::from_secs_f64(ttl.as_secs_f64() * factor)
}

/// A cheap-clone handle to a [`LocalCache`], for sharing across components
/// the way `SearchOptionsCache`/`SitemapCache` share their `Arc<DashMap<..>>`
/// internals.
pub type SharedLocalCache<K, V> = Arc<LocalCache<K, V>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn put_then_get_returns_value() {
        let cache: LocalCache<String, i32> = LocalCache::new(Duration::from_secs(60), 0.1, 100);
        cache.put("a".into(), 1);
        assert_eq!(cache.get(&"a".into()), Some(1));
    }

    #[test]
    fn get_misses_absent_key() {
        let cache: LocalCache<String, i32> = LocalCache::new(Duration::from_secs(60), 0.1, 100);
        assert_eq!(cache.get(&"missing".into()), None);
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let cache: LocalCache<String, i32> = LocalCache::new(Duration::from_millis(5), 0.0, 100);
        cache.put("a".into(), 1);
        sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&"a".into()), None);
    }

    #[test]
    fn invalidate_drops_immediately() {
        let cache: LocalCache<String, i32> = LocalCache::new(Duration::from_secs(60), 0.0, 100);
        cache.put("a".into(), 1);
        cache.invalidate(&"a".into());
        assert_eq!(cache.get(&"a".into()), None);
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let cache: LocalCache<String, i32> = LocalCache::new(Duration::from_secs(60), 0.0, 100);
        cache.put("a".into(), 1);
        cache.put("b".into(), 2);
        cache.invalidate_all();
        assert_eq!(cache.estimated_size(), 0);
    }

    #[test]
    fn jitter_factor_is_clamped_to_half() {
        assert_eq!(clamp_jitter(5.0), 0.5);
        assert_eq!(clamp_jitter(-5.0), 0.0);
        assert_eq!(clamp_jitter(0.25), 0.25);
    }

    #[test]
    fn zero_jitter_is_deterministic_ttl() {
        let d = jittered_duration(Duration::from_secs(10), 0.0);
        assert_eq!(d, Duration::from_secs(10));
    }

    #[test]
    fn size_cap_evicts_rather_than_growing_unboundedly() {
        let cache: LocalCache<i32, i32> = LocalCache::new(Duration::from_secs(60), 0.0, 4);
        for i in 0..10 {
            cache.put(i, i);
        }
        assert!(cache.estimated_size() <= 4);
    }
}
