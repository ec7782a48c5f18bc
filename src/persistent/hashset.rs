//! Persistent (immutable) hash set based on HAMT.
//!
//! A set is a map of `()`: [`PersistentHashSet`] wraps
//! [`PersistentHashMap`](super::PersistentHashMap) keyed by the element
//! with a unit payload, inheriting its snapshot/write-view/CAS surface.

use std::borrow::Borrow;
use std::hash::Hash;

use super::hashmap::{
    HashMapIterator, ImmutableHashMap, MutableHashMap, PersistentHashMap,
};

/// A versioned HAMT hash set with an atomic current root.
///
/// # Examples
///
/// ```rust
/// use evergreen::persistent::PersistentHashSet;
///
/// let set = PersistentHashSet::new();
/// let mut write = set.begin_write();
/// assert!(write.add(1));
/// assert!(!write.add(1));
/// assert!(write.end_write());
/// assert!(set.begin_read().contains(&1));
/// ```
pub struct PersistentHashSet<T> {
    inner: PersistentHashMap<T, ()>,
}

impl<T> PersistentHashSet<T> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: PersistentHashMap::new(),
        }
    }

    /// Takes a frozen snapshot of the current version.
    #[must_use]
    pub fn begin_read(&self) -> ImmutableHashSet<T> {
        ImmutableHashSet {
            inner: self.inner.begin_read(),
        }
    }

    /// Opens a copy-on-write view off the current version.
    #[must_use]
    pub fn begin_write(&self) -> MutableHashSet<'_, T> {
        MutableHashSet {
            inner: self.inner.begin_write(),
        }
    }

    /// Element count of the current version.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size()
    }
}

impl<T> Default for PersistentHashSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PersistentHashSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// A frozen snapshot of a [`PersistentHashSet`].
pub struct ImmutableHashSet<T> {
    inner: ImmutableHashMap<T, ()>,
}

impl<T> Clone for ImmutableHashSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ImmutableHashSet<T> {
    /// Element count. O(1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the snapshot holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates elements in unspecified order.
    pub fn iter(&self) -> HashSetIterator<'_, T> {
        HashSetIterator {
            inner: self.inner.iter(),
        }
    }
}

impl<T: Hash + Eq + Clone> ImmutableHashSet<T> {
    /// Returns `true` if `element` is present.
    #[must_use]
    pub fn contains<Q>(&self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains_key(element)
    }
}

/// Borrowing iterator over a hash set snapshot.
pub struct HashSetIterator<'a, T> {
    inner: HashMapIterator<'a, T, ()>,
}

impl<'a, T> Iterator for HashSetIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(element, _)| element)
    }
}

/// A private copy-on-write view over a [`PersistentHashSet`].
pub struct MutableHashSet<'m, T> {
    inner: MutableHashMap<'m, T, ()>,
}

impl<T: Hash + Eq + Clone> MutableHashSet<'_, T> {
    /// Adds `element`, returning `true` when it was not already present.
    pub fn add(&mut self, element: T) -> bool {
        self.inner.put(element, ()).is_none()
    }

    /// Removes `element`, returning `true` when it was present.
    pub fn remove<Q>(&mut self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.remove(element).is_some()
    }

    /// Membership check against the in-progress version.
    #[must_use]
    pub fn contains<Q>(&self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(element).is_some()
    }

    /// Commits; see [`MutableHashMap::end_write`].
    #[must_use]
    pub fn end_write(self) -> bool {
        self.inner.end_write()
    }
}

impl<T> MutableHashSet<'_, T> {
    /// Element count of the in-progress version.
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
