//! Persistent (immutable) hash map based on HAMT.
//!
//! [`PersistentHashMap`] wraps the HAMT core with the crate's versioned
//! container discipline: frozen [`ImmutableHashMap`] snapshots for
//! readers, a copy-on-write [`MutableHashMap`] view for writers, and a
//! compare-and-swap commit. Iteration order is unspecified (hash-bucket
//! order).
//!
//! # Examples
//!
//! ```rust
//! use evergreen::persistent::PersistentHashMap;
//!
//! let map = PersistentHashMap::new();
//! let mut write = map.begin_write();
//! write.put("one".to_string(), 1);
//! write.put("two".to_string(), 2);
//! assert!(write.end_write());
//!
//! let snapshot = map.begin_read();
//! assert_eq!(snapshot.get("one"), Some(&1));
//! ```

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::hamt::{HamtIterator, HamtMap};

/// A versioned HAMT hash map with an atomic current root.
pub struct PersistentHashMap<K, V> {
    root: ArcSwap<HamtMap<K, V>>,
}

static_assertions::assert_impl_all!(PersistentHashMap<i64, i64>: Send, Sync);

impl<K, V> PersistentHashMap<K, V> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: ArcSwap::from_pointee(HamtMap::new()),
        }
    }

    /// Takes a frozen snapshot of the current version.
    #[must_use]
    pub fn begin_read(&self) -> ImmutableHashMap<K, V> {
        ImmutableHashMap {
            map: self.root.load_full(),
        }
    }

    /// Opens a copy-on-write view off the current version.
    #[must_use]
    pub fn begin_write(&self) -> MutableHashMap<'_, K, V> {
        let base = self.root.load_full();
        MutableHashMap {
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

impl<K, V> Default for PersistentHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for PersistentHashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: ArcSwap::new(self.root.load_full()),
        }
    }
}

/// A frozen snapshot of a [`PersistentHashMap`].
pub struct ImmutableHashMap<K, V> {
    map: Arc<HamtMap<K, V>>,
}

impl<K, V> Clone for ImmutableHashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<K, V> ImmutableHashMap<K, V> {
    /// Entry count. O(1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the snapshot holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates entries in unspecified order.
    pub fn iter(&self) -> HashMapIterator<'_, K, V> {
        HashMapIterator {
            inner: self.map.iter(),
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> ImmutableHashMap<K, V> {
    /// Looks up the value for `key`.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }
}

/// Borrowing iterator over a hash map snapshot.
pub struct HashMapIterator<'a, K, V> {
    inner: HamtIterator<'a, K, V>,
}

impl<'a, K, V> Iterator for HashMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// A private copy-on-write view over a [`PersistentHashMap`].
pub struct MutableHashMap<'m, K, V> {
    owner: &'m PersistentHashMap<K, V>,
    base: Arc<HamtMap<K, V>>,
    current: HamtMap<K, V>,
}

impl<K: Hash + Eq + Clone, V: Clone> MutableHashMap<'_, K, V> {
    /// Inserts or replaces, returning the previous value for an equal
    /// key.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let (next, previous) = self.current.insert(key, value);
        self.current = next;
        previous
    }

    /// Removes `key`, returning its value. Absent keys are a no-op.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (next, value) = self.current.remove(key)?;
        self.current = next;
        Some(value)
    }

    /// Looks up the in-progress version.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.current.get(key)
    }

    /// Commits: atomically swaps the container root if it still matches
    /// this view's base. On `false` the edits are discarded and the
    /// caller retries from a fresh view.
    #[must_use]
    pub fn end_write(self) -> bool {
        let next = Arc::new(self.current);
        let previous = self.owner.root.compare_and_swap(&self.base, next);
        Arc::ptr_eq(&previous, &self.base)
    }
}

impl<K, V> MutableHashMap<'_, K, V> {
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

#[cfg(test)]
mod tests {
    use super::PersistentHashMap;
    use rstest::rstest;

    #[rstest]
    fn test_put_get_across_versions() {
        let map = PersistentHashMap::new();
        let mut write = map.begin_write();
        assert_eq!(write.put("key".to_string(), 1), None);
        assert_eq!(write.put("key".to_string(), 2), Some(1));
        assert!(write.end_write());
        assert_eq!(map.begin_read().get("key"), Some(&2));
    }

    #[rstest]
    fn test_snapshot_is_frozen() {
        let map = PersistentHashMap::new();
        let mut write = map.begin_write();
        write.put(1, "one");
        assert!(write.end_write());

        let snapshot = map.begin_read();
        let mut write = map.begin_write();
        write.remove(&1);
        assert!(write.end_write());

        assert_eq!(snapshot.get(&1), Some(&"one"));
        assert!(map.begin_read().get(&1).is_none());
    }

    #[rstest]
    fn test_conflicting_writers() {
        let map = PersistentHashMap::new();
        let mut first = map.begin_write();
        let mut second = map.begin_write();
        first.put(1, 1);
        second.put(2, 2);
        assert!(first.end_write());
        assert!(!second.end_write());
        assert_eq!(map.size(), 1);
    }
}
