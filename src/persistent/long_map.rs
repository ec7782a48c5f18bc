//! Persistent map keyed by primitive 64-bit integers.
//!
//! [`PersistentLong23TreeMap`] specializes the 2-3 tree to entries
//! `(i64, V)` ordered by the integer key alone, so a put of an existing
//! key replaces the payload in place. Iteration ascends key order.

use std::cmp::Ordering;

use super::tree23::{ImmutableTree, MutableTree, Persistent23Tree, TreeIterator};

/// A `(key, value)` pair whose ordering and equality ignore the value.
#[derive(Clone, Debug)]
pub(crate) struct LongMapEntry<V> {
    pub(crate) key: i64,
    pub(crate) value: V,
}

impl<V> PartialEq for LongMapEntry<V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<V> Eq for LongMapEntry<V> {}

impl<V> PartialOrd for LongMapEntry<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V> Ord for LongMapEntry<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// A versioned long-keyed ordered map with an atomic current root.
///
/// # Examples
///
/// ```rust
/// use evergreen::persistent::PersistentLong23TreeMap;
///
/// let map = PersistentLong23TreeMap::new();
/// let mut write = map.begin_write();
/// write.put(2, "two");
/// write.put(1, "one");
/// assert!(write.end_write());
///
/// let snapshot = map.begin_read();
/// assert_eq!(snapshot.get(1), Some(&"one"));
/// let keys: Vec<i64> = snapshot.iter().map(|(key, _)| key).collect();
/// assert_eq!(keys, vec![1, 2]);
/// ```
pub struct PersistentLong23TreeMap<V> {
    inner: Persistent23Tree<LongMapEntry<V>>,
}

impl<V> PersistentLong23TreeMap<V> {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Persistent23Tree::new(),
        }
    }

    /// Takes a frozen snapshot of the current version.
    #[must_use]
    pub fn begin_read(&self) -> ImmutableLongMap<V> {
        ImmutableLongMap {
            inner: self.inner.begin_read(),
        }
    }

    /// Opens a copy-on-write view off the current version.
    #[must_use]
    pub fn begin_write(&self) -> MutableLongMap<'_, V> {
        MutableLongMap {
            inner: self.inner.begin_write(),
        }
    }

    /// Entry count of the current version.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size()
    }
}

impl<V> Default for PersistentLong23TreeMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for PersistentLong23TreeMap<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// A frozen snapshot of a [`PersistentLong23TreeMap`].
pub struct ImmutableLongMap<V> {
    inner: ImmutableTree<LongMapEntry<V>>,
}

impl<V> Clone for ImmutableLongMap<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> ImmutableLongMap<V> {
    /// Entry count. O(1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the snapshot holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Looks up the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: i64) -> Option<&V> {
        self.inner
            .get_with(|entry| entry.key.cmp(&key))
            .map(|entry| &entry.value)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: i64) -> bool {
        self.get(key).is_some()
    }

    /// Smallest entry, if any.
    #[must_use]
    pub fn minimum(&self) -> Option<(i64, &V)> {
        self.inner
            .minimum()
            .map(|entry| (entry.key, &entry.value))
    }

    /// Forward iteration in strictly increasing key order.
    pub fn iter(&self) -> LongMapIterator<'_, V> {
        LongMapIterator {
            inner: self.inner.iter(),
        }
    }

    /// Reverse iteration in strictly decreasing key order.
    pub fn rev_iter(&self) -> LongMapIterator<'_, V> {
        LongMapIterator {
            inner: self.inner.rev_iter(),
        }
    }

    /// Forward iteration over entries with key `>= from`.
    pub fn tail_iter(&self, from: i64) -> LongMapIterator<'_, V> {
        LongMapIterator {
            inner: self.inner.tail_iter_with(move |entry| entry.key.cmp(&from)),
        }
    }
}

/// Iterator over a long map snapshot yielding `(key, &value)`.
pub struct LongMapIterator<'a, V> {
    inner: TreeIterator<'a, LongMapEntry<V>>,
}

impl<'a, V> Iterator for LongMapIterator<'a, V> {
    type Item = (i64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|entry| (entry.key, &entry.value))
    }
}

/// A private copy-on-write view over a [`PersistentLong23TreeMap`].
pub struct MutableLongMap<'m, V> {
    inner: MutableTree<'m, LongMapEntry<V>>,
}

impl<V: Clone> MutableLongMap<'_, V> {
    /// Inserts or replaces the value under `key`.
    pub fn put(&mut self, key: i64, value: V) {
        let _ = self.inner.add(LongMapEntry { key, value });
    }

    /// Removes `key`, returning its value. Absent keys are a no-op.
    pub fn remove(&mut self, key: i64) -> Option<V> {
        self.inner
            .remove_with(|entry| entry.key.cmp(&key))
            .map(|entry| entry.value)
    }

    /// Looks up the in-progress version.
    #[must_use]
    pub fn get(&self, key: i64) -> Option<&V> {
        self.inner
            .get_with(|entry| entry.key.cmp(&key))
            .map(|entry| &entry.value)
    }

    /// Returns `true` if `key` is present in the in-progress version.
    #[must_use]
    pub fn contains_key(&self, key: i64) -> bool {
        self.get(key).is_some()
    }

    /// Commits; see [`MutableTree::end_write`].
    #[must_use]
    pub fn end_write(self) -> bool {
        self.inner.end_write()
    }
}

impl<V> MutableLongMap<'_, V> {
    /// Entry count of the in-progress version.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the in-progress version is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::PersistentLong23TreeMap;
    use rstest::rstest;

    #[rstest]
    fn test_put_replaces_value() {
        let map = PersistentLong23TreeMap::new();
        let mut write = map.begin_write();
        write.put(5, "old");
        write.put(5, "new");
        assert_eq!(write.len(), 1);
        assert_eq!(write.get(5), Some(&"new"));
        assert!(write.end_write());
    }

    #[rstest]
    fn test_tail_iteration() {
        let map = PersistentLong23TreeMap::new();
        let mut write = map.begin_write();
        for key in 0..10 {
            write.put(key, key * 10);
        }
        assert!(write.end_write());
        let snapshot = map.begin_read();
        let tail: Vec<i64> = snapshot.tail_iter(7).map(|(key, _)| key).collect();
        assert_eq!(tail, vec![7, 8, 9]);
        let none: Vec<i64> = snapshot.tail_iter(100).map(|(key, _)| key).collect();
        assert!(none.is_empty());
    }
}
