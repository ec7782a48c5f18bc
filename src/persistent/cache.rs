//! Concurrent object cache with segmented LRU admission.
//!
//! [`PersistentObjectCache`] keeps two access-ordered generations
//! behind a single atomic root: new entries land in the probationary
//! first generation, and entries re-read while the first generation is
//! at least half full are promoted into the protected second
//! generation. One-shot scans therefore cycle through the first
//! generation without evicting the hot set.
//!
//! Unlike the raw persistent structures, whose callers retry lost
//! commits themselves, the cache retries internally: `cache_object` and
//! `remove` loop until their swap lands. Lookups never block.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;

use super::linked_hashmap::LinkedRoot;

const DEFAULT_SECOND_GENERATION_RATIO: f64 = 0.5;

const MINIMUM_SIZE: usize = 4;

struct CacheRoot<K, V> {
    first: LinkedRoot<K, V>,
    second: LinkedRoot<K, V>,
}

impl<K, V> CacheRoot<K, V> {
    const fn new() -> Self {
        Self {
            first: LinkedRoot::new(),
            second: LinkedRoot::new(),
        }
    }

    const fn count(&self) -> usize {
        self.first.len() + self.second.len()
    }
}

impl<K, V> Clone for CacheRoot<K, V> {
    fn clone(&self) -> Self {
        Self {
            first: self.first.clone(),
            second: self.second.clone(),
        }
    }
}

/// A fixed-capacity concurrent cache over cheaply cloneable values.
///
/// Values are typically `Arc`ed payloads; lookups clone the stored
/// value out of the observed snapshot.
///
/// # Examples
///
/// ```rust
/// use evergreen::persistent::PersistentObjectCache;
///
/// let cache = PersistentObjectCache::new(16);
/// cache.cache_object("answer", 42);
/// assert_eq!(cache.try_key(&"answer"), Some(42));
/// assert_eq!(cache.try_key(&"missing"), None);
/// assert!(cache.hit_rate() > 0.0);
/// ```
pub struct PersistentObjectCache<K, V> {
    root: ArcSwap<CacheRoot<K, V>>,
    first_bound: usize,
    second_bound: usize,
    attempts: AtomicU64,
    hits: AtomicU64,
}

static_assertions::assert_impl_all!(PersistentObjectCache<i64, String>: Send, Sync);

impl<K, V> PersistentObjectCache<K, V> {
    /// Creates a cache bounded to `size` entries overall, splitting the
    /// capacity evenly between the two generations.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self::with_second_generation_ratio(size, DEFAULT_SECOND_GENERATION_RATIO)
    }

    /// Creates a cache giving `ratio` of `size` to the protected second
    /// generation. `ratio` is clamped to `(0, 1)`.
    #[must_use]
    pub fn with_second_generation_ratio(size: usize, ratio: f64) -> Self {
        let size = size.max(MINIMUM_SIZE);
        let ratio = ratio.clamp(0.05, 0.95);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let second_bound = ((size as f64 * ratio) as usize).max(1);
        Self {
            root: ArcSwap::from_pointee(CacheRoot::new()),
            first_bound: (size - second_bound).max(1),
            second_bound,
            attempts: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Total entry count across both generations.
    #[must_use]
    pub fn count(&self) -> usize {
        self.root.load().count()
    }

    /// Ratio of hits to lookups since construction (or the last
    /// [`Self::reset_hit_rate`]).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let attempts = self.attempts.load(Ordering::Relaxed);
        if attempts == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.hits.load(Ordering::Relaxed) as f64 / attempts as f64;
        rate
    }

    /// Clears the hit bookkeeping.
    pub fn reset_hit_rate(&self) {
        self.attempts.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
    }
}

impl<K: Eq + Hash + Clone, V: Clone> PersistentObjectCache<K, V> {
    /// Looks up `key`, recording the attempt and adjusting recency: a
    /// second-generation hit is re-stamped, a first-generation hit is
    /// promoted once the first generation has filled past half its
    /// bound. The recency adjustment is advisory, committed with a
    /// single swap attempt; a lost race only loses the adjustment,
    /// never the returned value.
    pub fn try_key(&self, key: &K) -> Option<V> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let observed = self.root.load_full();
        if let Some(value) = observed.second.get_no_touch(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            let value = value.clone();
            if let Some(touched) = observed.second.touched(key) {
                let next = Arc::new(CacheRoot {
                    first: observed.first.clone(),
                    second: touched,
                });
                let _ = self.root.compare_and_swap(&observed, next);
            }
            return Some(value);
        }
        let value = observed.first.get_no_touch(key)?.clone();
        self.hits.fetch_add(1, Ordering::Relaxed);
        if observed.first.len() * 2 >= self.first_bound {
            if let Some((first, key, promoted)) = observed.first.remove(key).map(
                |(first, promoted)| (first, key.clone(), promoted),
            ) {
                let mut second = observed.second.put(key, promoted);
                while second.len() > self.second_bound {
                    let Some((next, _, _)) = second.remove_eldest() else {
                        break;
                    };
                    second = next;
                }
                let next = Arc::new(CacheRoot { first, second });
                let _ = self.root.compare_and_swap(&observed, next);
            }
        }
        Some(value)
    }

    /// Looks up `key` without recording the attempt or adjusting
    /// recency.
    #[must_use]
    pub fn get_object(&self, key: &K) -> Option<V> {
        let observed = self.root.load();
        observed
            .second
            .get_no_touch(key)
            .or_else(|| observed.first.get_no_touch(key))
            .cloned()
    }

    /// Inserts or replaces `key`. New keys enter the first generation;
    /// a key already resident in the second generation is updated in
    /// place. Retries internally until the swap lands.
    pub fn cache_object(&self, key: K, value: V) {
        loop {
            let observed = self.root.load_full();
            let next = if observed.second.contains_key(&key) {
                CacheRoot {
                    first: observed.first.clone(),
                    second: observed.second.put(key.clone(), value.clone()),
                }
            } else {
                let mut first = observed.first.put(key.clone(), value.clone());
                while first.len() > self.first_bound {
                    let Some((next, _, _)) = first.remove_eldest() else {
                        break;
                    };
                    first = next;
                }
                CacheRoot {
                    first,
                    second: observed.second.clone(),
                }
            };
            let previous = self.root.compare_and_swap(&observed, Arc::new(next));
            if Arc::ptr_eq(&previous, &observed) {
                return;
            }
        }
    }

    /// Removes `key` from whichever generation holds it, returning the
    /// evicted value. Retries internally until the swap lands.
    pub fn remove(&self, key: &K) -> Option<V> {
        loop {
            let observed = self.root.load_full();
            let (next, removed) = if let Some((second, value)) = observed.second.remove(key) {
                (
                    CacheRoot {
                        first: observed.first.clone(),
                        second,
                    },
                    value,
                )
            } else if let Some((first, value)) = observed.first.remove(key) {
                (
                    CacheRoot {
                        first,
                        second: observed.second.clone(),
                    },
                    value,
                )
            } else {
                return None;
            };
            let previous = self.root.compare_and_swap(&observed, Arc::new(next));
            if Arc::ptr_eq(&previous, &observed) {
                return Some(removed);
            }
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.root.store(Arc::new(CacheRoot::new()));
    }

    /// Calls `visit` for every cached value in both generations, on the
    /// snapshot current at the time of the call.
    pub fn for_each_value(&self, mut visit: impl FnMut(&K, &V)) {
        let observed = self.root.load_full();
        for (key, value) in observed.second.iter().chain(observed.first.iter()) {
            visit(key, value);
        }
    }
}

impl<K, V> std::fmt::Debug for PersistentObjectCache<K, V> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PersistentObjectCache")
            .field("count", &self.count())
            .field("first_bound", &self.first_bound)
            .field("second_bound", &self.second_bound)
            .finish()
    }
}
