//! Bounded, concurrent memoization for the matchers.
//!
//! [`BoundedCache`] is an LRU map with single-flight loading: concurrent
//! misses on one key run the computation once while the other callers wait
//! for its result. Failed computations are never stored. [`MatchCaches`]
//! groups the caches shared by the distance engine and the pattern matcher
//! and clears them together when the worldview changes.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use lru::LruCache;
use serde::Serialize;

use crate::concept::ConceptId;
use crate::declaration::Declaration;
use crate::distance::Distance;

/// Counters for one cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub name: &'static str,
    pub len: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// LRU cache with per-key single-flight loading.
pub struct BoundedCache<K, V> {
    name: &'static str,
    entries: Mutex<LruCache<K, V>>,
    in_flight: DashMap<K, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached value for `key`, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Store a value if `epoch` still equals `stamp`.
    fn publish(&self, key: K, value: V, stamp: u64, epoch: &AtomicU64) -> bool {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        if epoch.load(Ordering::SeqCst) != stamp {
            return false;
        }
        entries.put(key, value);
        true
    }

    fn hit(&self, key: &K) -> Option<V> {
        let value = self.get(key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Return the cached value for `key` or compute it at most once.
    ///
    /// `stamp` is the worldview epoch the caller's computation is based on;
    /// the result is only stored if `epoch` has not moved since.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        stamp: u64,
        epoch: &AtomicU64,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        self.single_flight(key, stamp, epoch, compute, |v| v, |v| Some(v.clone()))
    }

    /// Like [`get_or_try_insert_with`](Self::get_or_try_insert_with), but a
    /// computation yielding `None` is returned without being cached.
    pub fn load<E>(
        &self,
        key: K,
        stamp: u64,
        epoch: &AtomicU64,
        compute: impl FnOnce() -> Result<Option<V>, E>,
    ) -> Result<Option<V>, E> {
        self.single_flight(key, stamp, epoch, compute, Some, Option::clone)
    }

    fn single_flight<R, E>(
        &self,
        key: K,
        stamp: u64,
        epoch: &AtomicU64,
        compute: impl FnOnce() -> Result<R, E>,
        from_hit: impl Fn(V) -> R,
        to_store: impl Fn(&R) -> Option<V>,
    ) -> Result<R, E> {
        if let Some(value) = self.hit(&key) {
            return Ok(from_hit(value));
        }
        let gate = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _held = gate.lock().unwrap_or_else(PoisonError::into_inner);
            match self.hit(&key) {
                Some(value) => Ok(from_hit(value)),
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    compute().map(|result| {
                        if let Some(value) = to_store(&result) {
                            self.publish(key.clone(), value, stamp, epoch);
                        }
                        result
                    })
                }
            }
        };
        self.release_gate(&key, gate);
        result
    }

    /// Drop the caller's reference to `gate`, removing it from the map once
    /// no other caller holds it.
    ///
    /// Gates are cloned out of the map under its shard lock, and released
    /// under it here, so the count seen below is exact. A failed load thus
    /// hands the gate to the next waiter instead of letting a new arrival
    /// race it on a fresh gate.
    fn release_gate(&self, key: &K, gate: Arc<Mutex<()>>) {
        if let Entry::Occupied(entry) = self.in_flight.entry(key.clone()) {
            if Arc::ptr_eq(entry.get(), &gate) {
                drop(gate);
                if Arc::strong_count(entry.get()) == 1 {
                    entry.remove();
                }
            }
        }
    }

    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().expect("cache lock poisoned");
        CacheStats {
            name: self.name,
            len: entries.len(),
            capacity: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Key of a context-free distance query: (from, to).
pub type BinaryKey = (ConceptId, ConceptId);
/// Key of a contextual distance query: (from, to, context).
pub type TernaryKey = (ConceptId, ConceptId, ConceptId);

/// The shared caches as seen by one request.
///
/// Results computed through a handle are only stored while the epoch it was
/// created with is current.
#[derive(Clone, Copy)]
pub struct CacheHandle<'a> {
    pub(crate) caches: &'a MatchCaches,
    pub(crate) stamp: u64,
}

impl<'a> CacheHandle<'a> {
    pub(crate) fn epoch(&self) -> &'a AtomicU64 {
        &self.caches.epoch
    }
}

/// The caches shared by the matchers, invalidated together.
pub struct MatchCaches {
    pub(crate) binary: BoundedCache<BinaryKey, Distance>,
    pub(crate) ternary: BoundedCache<TernaryKey, Distance>,
    pub(crate) matches: BoundedCache<(String, String), bool>,
    pub(crate) declarations: BoundedCache<String, Arc<Declaration>>,
    epoch: AtomicU64,
}

impl MatchCaches {
    pub fn new(capacity: usize) -> Self {
        Self {
            binary: BoundedCache::new("distance", capacity),
            ternary: BoundedCache::new("contextual_distance", capacity),
            matches: BoundedCache::new("match", capacity),
            declarations: BoundedCache::new("declaration", capacity),
            epoch: AtomicU64::new(0),
        }
    }

    /// Current worldview epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// View of the caches for a request based on epoch `stamp`.
    pub fn handle(&self, stamp: u64) -> CacheHandle<'_> {
        CacheHandle {
            caches: self,
            stamp,
        }
    }

    /// View of the caches at the current epoch.
    pub fn current(&self) -> CacheHandle<'_> {
        self.handle(self.epoch())
    }

    /// Invalidate every entry. Computations started before the reset cannot
    /// publish afterwards.
    pub fn reset(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.binary.clear();
        self.ternary.clear();
        self.matches.clear();
        self.declarations.clear();
        tracing::debug!(epoch, "match caches reset");
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        vec![
            self.binary.stats(),
            self.ternary.stats(),
            self.matches.stats(),
            self.declarations.stats(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn computes_once_then_hits() {
        let epoch = AtomicU64::new(0);
        let cache: BoundedCache<u32, u32> = BoundedCache::new("test", 4);
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v: Result<u32, ()> = cache.get_or_try_insert_with(7, 0, &epoch, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(49)
            });
            assert_eq!(v, Ok(49));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.len), (2, 1, 1));
    }

    #[test]
    fn failures_are_not_memoized() {
        let epoch = AtomicU64::new(0);
        let cache: BoundedCache<u32, u32> = BoundedCache::new("test", 4);
        let err: Result<u32, &str> = cache.get_or_try_insert_with(1, 0, &epoch, || Err("boom"));
        assert!(err.is_err());
        assert!(cache.is_empty());
        let ok: Result<u32, &str> = cache.get_or_try_insert_with(1, 0, &epoch, || Ok(2));
        assert_eq!(ok, Ok(2));
    }

    #[test]
    fn none_results_are_not_memoized() {
        let epoch = AtomicU64::new(0);
        let cache: BoundedCache<u32, u32> = BoundedCache::new("test", 4);
        let v: Result<Option<u32>, ()> = cache.load(1, 0, &epoch, || Ok(None));
        assert_eq!(v, Ok(None));
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_is_bounded() {
        let epoch = AtomicU64::new(0);
        let cache: BoundedCache<u32, u32> = BoundedCache::new("test", 2);
        for k in 0..5 {
            let _: Result<u32, ()> = cache.get_or_try_insert_with(k, 0, &epoch, || Ok(k));
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&4), Some(4));
        assert_eq!(cache.get(&0), None);
    }

    #[test]
    fn stale_epoch_does_not_publish() {
        let epoch = AtomicU64::new(0);
        let cache: BoundedCache<u32, u32> = BoundedCache::new("test", 4);
        let v: Result<u32, ()> = cache.get_or_try_insert_with(1, 0, &epoch, || {
            epoch.fetch_add(1, Ordering::SeqCst);
            Ok(10)
        });
        assert_eq!(v, Ok(10));
        assert!(cache.get(&1).is_none());
    }

    #[test]
    fn concurrent_misses_compute_once() {
        let epoch = AtomicU64::new(0);
        let cache: BoundedCache<u32, u32> = BoundedCache::new("test", 4);
        let calls = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let v: Result<u32, ()> = cache.get_or_try_insert_with(3, 0, &epoch, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(50));
                        Ok(9)
                    });
                    assert_eq!(v, Ok(9));
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.is_empty());
    }

    #[test]
    fn failed_loader_hands_over_to_one_waiter() {
        let epoch = AtomicU64::new(0);
        let cache: BoundedCache<u32, u32> = BoundedCache::new("test", 4);
        let calls = AtomicUsize::new(0);
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let _: Result<u32, &str> = cache.get_or_try_insert_with(5, 0, &epoch, || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(30));
                        active.fetch_sub(1, Ordering::SeqCst);
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err("first load fails")
                        } else {
                            Ok(25)
                        }
                    });
                });
            }
        });
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get(&5), Some(25));
        assert!(cache.in_flight.is_empty());
    }

    #[test]
    fn reset_clears_everything_and_bumps_epoch() {
        let caches = MatchCaches::new(8);
        let a = ConceptId::new(1).unwrap();
        let stamp = caches.epoch();
        let _: Result<Distance, ()> =
            caches
                .binary
                .get_or_try_insert_with((a, a), stamp, caches.handle(stamp).epoch(), || {
                    Ok(Distance::EXACT)
                });
        let _: Result<bool, ()> = caches.matches.get_or_try_insert_with(
            ("a".into(), "b".into()),
            stamp,
            caches.handle(stamp).epoch(),
            || Ok(true),
        );
        assert_eq!(caches.binary.len(), 1);
        caches.reset();
        assert_eq!(caches.epoch(), stamp + 1);
        assert!(caches.stats().iter().all(|s| s.len == 0));
    }
}
