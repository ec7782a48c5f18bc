//! Persistent hash map with access-order tracking and bounded eviction.
//!
//! [`PersistentLinkedHashMap`] pairs a HAMT (key to stamped value) with
//! a 2-3 tree order queue (stamp to key) and a monotone stamp counter.
//! The eldest entry is the one with the minimum stamp, so an eviction
//! predicate turns the map into an LRU-ish bound. Re-stamping on read
//! is amortized: an entry is only touched once its stamp lags the
//! counter by more than half the map size.

use std::hash::Hash;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::warn;

use super::hamt::HamtMap;
use super::long_map::LongMapEntry;
use super::tree23::ImmutableTree;

/// Re-stamp a read entry only when its stamp lags the counter by more
/// than `len / TOUCH_LAG_DIVISOR`.
const TOUCH_LAG_DIVISOR: usize = 2;

/// Hard cap on evictions performed by a single `put`.
const EVICTION_CAP: usize = 50;

/// Eviction count at which a single `put` starts warning.
const EVICTION_WARN_THRESHOLD: usize = 35;

/// Decides whether the eldest entry should be evicted, given the
/// current entry count and the eldest key/value pair.
pub type EvictionPredicate<K, V> = Arc<dyn Fn(usize, &K, &V) -> bool + Send + Sync>;

// ============================================================
// LinkedRoot
// ============================================================

/// One immutable version: backing map, order queue, stamp counter.
///
/// Shared with the object cache, which packs two of these behind a
/// single atomic root.
pub(crate) struct LinkedRoot<K, V> {
    map: HamtMap<K, (i64, V)>,
    queue: ImmutableTree<LongMapEntry<K>>,
    order: i64,
}

impl<K, V> Clone for LinkedRoot<K, V> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            queue: self.queue.clone(),
            order: self.order,
        }
    }
}

impl<K, V> LinkedRoot<K, V> {
    pub(crate) const fn new() -> Self {
        Self {
            map: HamtMap::new(),
            queue: ImmutableTree::empty(),
            order: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> LinkedRoot<K, V> {
    pub(crate) fn get_no_touch(&self, key: &K) -> Option<&V> {
        self.map.get(key).map(|(_, value)| value)
    }

    pub(crate) fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Returns a re-stamped version if `key` is present and its stamp
    /// lags far enough to warrant a touch. `None` means no new version
    /// is needed (absent key or fresh stamp).
    pub(crate) fn touched(&self, key: &K) -> Option<Self> {
        let (stamp, value) = self.map.get(key)?;
        #[allow(clippy::cast_possible_wrap)]
        let lag_threshold = (self.len() / TOUCH_LAG_DIVISOR) as i64;
        if self.order - stamp <= lag_threshold {
            return None;
        }
        Some(self.restamped(key.clone(), *stamp, value.clone()))
    }

    pub(crate) fn put(&self, key: K, value: V) -> Self {
        let order = self.order + 1;
        let (map, previous) = self.map.insert(key.clone(), (order, value));
        let mut queue = self.queue.clone();
        if let Some((old_stamp, _)) = previous {
            if let Some((next, _)) = queue.remove_with(|entry| entry.key.cmp(&old_stamp)) {
                queue = next;
            }
        }
        let queue = queue.add(LongMapEntry { key: order, value: key }).0;
        Self { map, queue, order }
    }

    pub(crate) fn remove(&self, key: &K) -> Option<(Self, V)> {
        let (map, (stamp, value)) = self.map.remove(key)?;
        let queue = self
            .queue
            .remove_with(|entry| entry.key.cmp(&stamp))
            .map_or_else(|| self.queue.clone(), |(next, _)| next);
        Some((
            Self {
                map,
                queue,
                order: self.order,
            },
            value,
        ))
    }

    /// The minimum-stamp entry, skipping stale queue records.
    pub(crate) fn eldest(&self) -> Option<(&K, &V)> {
        for entry in self.queue.iter() {
            if let Some((stamp, value)) = self.map.get(&entry.value) {
                if *stamp == entry.key {
                    return Some((&entry.value, value));
                }
            }
        }
        None
    }

    /// Unlinks the minimum-stamp entry from both structures. Stale
    /// queue records found on the way are dropped with a warning; they
    /// indicate a map/queue mismatch and are never fatal.
    pub(crate) fn remove_eldest(&self) -> Option<(Self, K, V)> {
        let mut queue = self.queue.clone();
        loop {
            let eldest = queue.minimum()?;
            let stamp = eldest.key;
            let key = eldest.value.clone();
            let consistent = self
                .map
                .get(&key)
                .is_some_and(|(stored, _)| *stored == stamp);
            queue = queue
                .remove_with(|entry| entry.key.cmp(&stamp))
                .map_or_else(|| queue.clone(), |(next, _)| next);
            if !consistent {
                warn!(stamp, "order queue entry without a matching map entry, skipping");
                continue;
            }
            let (map, (_, value)) = self.map.remove(&key)?;
            return Some((
                Self {
                    map,
                    queue,
                    order: self.order,
                },
                key,
                value,
            ));
        }
    }

    /// Iterates entries from eldest stamp to freshest.
    pub(crate) fn iter(&self) -> LinkedIterator<'_, K, V> {
        LinkedIterator {
            root: self,
            queue: self.queue.iter(),
        }
    }

    fn restamped(&self, key: K, old_stamp: i64, value: V) -> Self {
        let order = self.order + 1;
        let (map, _) = self.map.insert(key.clone(), (order, value));
        let queue = self
            .queue
            .remove_with(|entry| entry.key.cmp(&old_stamp))
            .map_or_else(|| self.queue.clone(), |(next, _)| next)
            .add(LongMapEntry { key: order, value: key })
            .0;
        Self { map, queue, order }
    }
}

/// Iterator over a [`LinkedRoot`] in stamp order, eldest first.
pub(crate) struct LinkedIterator<'a, K, V> {
    root: &'a LinkedRoot<K, V>,
    queue: super::tree23::TreeIterator<'a, LongMapEntry<K>>,
}

impl<'a, K: Eq + Hash + Clone, V: Clone> Iterator for LinkedIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = self.queue.next()?;
            if let Some((stamp, value)) = self.root.map.get(&entry.value) {
                if *stamp == entry.key {
                    return Some((&entry.value, value));
                }
            }
            warn!(stamp = entry.key, "skipping stale order queue entry");
        }
    }
}

// ============================================================
// Container
// ============================================================

/// A versioned access-ordered hash map with an atomic current root.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use evergreen::persistent::PersistentLinkedHashMap;
///
/// let map = PersistentLinkedHashMap::with_eviction(Arc::new(|len, _key, _value| len > 2));
/// let mut write = map.begin_write();
/// write.put("a", 1);
/// write.put("b", 2);
/// write.put("c", 3);
/// assert!(write.end_write());
///
/// let snapshot = map.begin_read();
/// assert_eq!(snapshot.len(), 2);
/// assert!(!snapshot.contains_key(&"a"));
/// ```
pub struct PersistentLinkedHashMap<K, V> {
    root: ArcSwap<LinkedRoot<K, V>>,
    remove_eldest: Option<EvictionPredicate<K, V>>,
}

static_assertions::assert_impl_all!(PersistentLinkedHashMap<String, i64>: Send, Sync);

impl<K, V> PersistentLinkedHashMap<K, V> {
    /// Creates an empty map with no eviction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: ArcSwap::from_pointee(LinkedRoot::new()),
            remove_eldest: None,
        }
    }

    /// Creates an empty map that evicts the eldest entry while
    /// `remove_eldest` holds after each `put`, capped per call.
    #[must_use]
    pub fn with_eviction(remove_eldest: EvictionPredicate<K, V>) -> Self {
        Self {
            root: ArcSwap::from_pointee(LinkedRoot::new()),
            remove_eldest: Some(remove_eldest),
        }
    }

    /// Takes a frozen snapshot of the current version.
    #[must_use]
    pub fn begin_read(&self) -> ImmutableLinkedHashMap<K, V> {
        ImmutableLinkedHashMap {
            root: self.root.load_full(),
        }
    }

    /// Opens a copy-on-write view off the current version.
    #[must_use]
    pub fn begin_write(&self) -> MutableLinkedHashMap<'_, K, V> {
        let base = self.root.load_full();
        MutableLinkedHashMap {
            owner: self,
            current: (*base).clone(),
            base,
        }
    }

    /// Entry count of the current version.
    #[must_use]
    pub fn size(&self) -> usize {
        self.root.load().len()
    }
}

impl<K, V> Default for PersistentLinkedHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for PersistentLinkedHashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: ArcSwap::new(self.root.load_full()),
            remove_eldest: self.remove_eldest.clone(),
        }
    }
}

/// A frozen snapshot of a [`PersistentLinkedHashMap`]. Reads never
/// re-stamp.
pub struct ImmutableLinkedHashMap<K, V> {
    root: Arc<LinkedRoot<K, V>>,
}

impl<K, V> Clone for ImmutableLinkedHashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<K, V> ImmutableLinkedHashMap<K, V> {
    /// Entry count. O(1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Returns `true` if the snapshot holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> ImmutableLinkedHashMap<K, V> {
    /// Looks up `key` without re-stamping.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.root.get_no_touch(key)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.root.contains_key(key)
    }

    /// The entry with the oldest stamp.
    #[must_use]
    pub fn eldest(&self) -> Option<(&K, &V)> {
        self.root.eldest()
    }

    /// Iterates entries from eldest stamp to freshest.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.root.iter()
    }
}

/// A private copy-on-write view over a [`PersistentLinkedHashMap`].
pub struct MutableLinkedHashMap<'m, K, V> {
    owner: &'m PersistentLinkedHashMap<K, V>,
    base: Arc<LinkedRoot<K, V>>,
    current: LinkedRoot<K, V>,
}

impl<K: Eq + Hash + Clone, V: Clone> MutableLinkedHashMap<'_, K, V> {
    /// Looks up `key`, re-stamping it when its stamp lags far enough.
    #[must_use]
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if let Some(touched) = self.current.touched(key) {
            self.current = touched;
        }
        self.current.get_no_touch(key)
    }

    /// Looks up `key` without re-stamping.
    #[must_use]
    pub fn get_no_touch(&self, key: &K) -> Option<&V> {
        self.current.get_no_touch(key)
    }

    /// Returns `true` if `key` is present in the in-progress version.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.current.contains_key(key)
    }

    /// Inserts or replaces `key`, then runs the eviction loop while the
    /// configured predicate holds, capped at 50 removals per call.
    pub fn put(&mut self, key: K, value: V) {
        self.current = self.current.put(key, value);
        let Some(predicate) = self.owner.remove_eldest.as_ref() else {
            return;
        };
        let mut evicted = 0_usize;
        while evicted < EVICTION_CAP {
            let should_evict = self
                .current
                .eldest()
                .is_some_and(|(key, value)| predicate(self.current.len(), key, value));
            if !should_evict {
                return;
            }
            let Some((next, _, _)) = self.current.remove_eldest() else {
                return;
            };
            self.current = next;
            evicted += 1;
            if evicted == EVICTION_WARN_THRESHOLD {
                warn!(evicted, "single put evicted unusually many entries");
            }
        }
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (next, value) = self.current.remove(key)?;
        self.current = next;
        Some(value)
    }

    /// Commits: atomically swaps the container root if it still matches
    /// this view's base.
    #[must_use]
    pub fn end_write(self) -> bool {
        let next = Arc::new(self.current);
        let previous = self.owner.root.compare_and_swap(&self.base, next);
        Arc::ptr_eq(&previous, &self.base)
    }
}

impl<K, V> MutableLinkedHashMap<'_, K, V> {
    /// Entry count of the in-progress version.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Returns `true` if the in-progress version is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}
