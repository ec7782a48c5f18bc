//! Persistent long-keyed map bucketed for dense keys.
//!
//! [`PersistentBitTreeLongMap`] groups 1024 consecutive keys (bucket id
//! = `key >> 10`) under one 2-3 tree entry carrying a 1024-bit set plus
//! a value slab. Dense integer-keyed data (type-id indexes, cached
//! entity-id sets) pays one tree node per kiloblock instead of one per
//! key; `put`/`remove` copy only the touched bucket.

use std::cmp::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::tree23::{ImmutableTree, TreeIterator};

const BUCKET_BITS: u32 = 10;
const BUCKET_SIZE: usize = 1 << BUCKET_BITS;
const BUCKET_WORDS: usize = BUCKET_SIZE / 64;
const INDEX_MASK: i64 = (BUCKET_SIZE - 1) as i64;

fn split_key(key: i64) -> (i64, usize) {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let index = (key & INDEX_MASK) as usize;
    (key >> BUCKET_BITS, index)
}

/// Lowest set bit at or above `from`, if any.
fn next_set_bit(bits: &[u64; BUCKET_WORDS], from: usize) -> Option<usize> {
    if from >= BUCKET_SIZE {
        return None;
    }
    let mut word_index = from / 64;
    let mut word = bits[word_index] & (u64::MAX << (from % 64));
    loop {
        if word != 0 {
            return Some(word_index * 64 + word.trailing_zeros() as usize);
        }
        word_index += 1;
        if word_index >= BUCKET_WORDS {
            return None;
        }
        word = bits[word_index];
    }
}

struct BucketData<V> {
    bits: [u64; BUCKET_WORDS],
    values: Vec<Option<V>>,
}

impl<V> BucketData<V> {
    fn bit(&self, index: usize) -> bool {
        self.bits[index / 64] & (1 << (index % 64)) != 0
    }

    fn is_clear(&self) -> bool {
        self.bits.iter().all(|word| *word == 0)
    }
}

impl<V: Clone> Clone for BucketData<V> {
    fn clone(&self) -> Self {
        Self {
            bits: self.bits,
            values: self.values.clone(),
        }
    }
}

/// One 1024-key block. Ordering and equality use the base alone so a
/// tree add with a rewritten block replaces its predecessor.
struct Bucket<V> {
    base: i64,
    data: Arc<BucketData<V>>,
}

impl<V> Clone for Bucket<V> {
    fn clone(&self) -> Self {
        Self {
            base: self.base,
            data: self.data.clone(),
        }
    }
}

impl<V> PartialEq for Bucket<V> {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl<V> Eq for Bucket<V> {}

impl<V> PartialOrd for Bucket<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V> Ord for Bucket<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.base.cmp(&other.base)
    }
}

struct BitRoot<V> {
    tree: ImmutableTree<Bucket<V>>,
    length: usize,
}

/// A versioned bucketed long-keyed map with an atomic current root.
///
/// # Examples
///
/// ```rust
/// use evergreen::persistent::PersistentBitTreeLongMap;
///
/// let map = PersistentBitTreeLongMap::new();
/// let mut write = map.begin_write();
/// write.put(1_000_000, "far");
/// write.put(3, "near");
/// assert!(write.end_write());
///
/// let snapshot = map.begin_read();
/// assert_eq!(snapshot.minimum(), Some(3));
/// assert_eq!(snapshot.get(1_000_000), Some(&"far"));
/// ```
pub struct PersistentBitTreeLongMap<V> {
    root: ArcSwap<BitRoot<V>>,
}

static_assertions::assert_impl_all!(PersistentBitTreeLongMap<i64>: Send, Sync);

impl<V> PersistentBitTreeLongMap<V> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: ArcSwap::from_pointee(BitRoot {
                tree: ImmutableTree::empty(),
                length: 0,
            }),
        }
    }

    /// Takes a frozen snapshot of the current version.
    #[must_use]
    pub fn begin_read(&self) -> ImmutableBitTreeMap<V> {
        ImmutableBitTreeMap {
            root: self.root.load_full(),
        }
    }

    /// Opens a copy-on-write view off the current version.
    #[must_use]
    pub fn begin_write(&self) -> MutableBitTreeMap<'_, V> {
        let base = self.root.load_full();
        MutableBitTreeMap {
            owner: self,
            tree: base.tree.clone(),
            length: base.length,
            base,
        }
    }

    /// Key count of the current version.
    #[must_use]
    pub fn size(&self) -> usize {
        self.root.load().length
    }
}

impl<V> Default for PersistentBitTreeLongMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for PersistentBitTreeLongMap<V> {
    fn clone(&self) -> Self {
        Self {
            root: ArcSwap::new(self.root.load_full()),
        }
    }
}

/// A frozen snapshot of a [`PersistentBitTreeLongMap`].
pub struct ImmutableBitTreeMap<V> {
    root: Arc<BitRoot<V>>,
}

impl<V> Clone for ImmutableBitTreeMap<V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<V> ImmutableBitTreeMap<V> {
    /// Key count. O(1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.root.length
    }

    /// Returns `true` if the snapshot holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.length == 0
    }

    /// Looks up the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: i64) -> Option<&V> {
        let (base, index) = split_key(key);
        let bucket = self.root.tree.get_with(|bucket| bucket.base.cmp(&base))?;
        if !bucket.data.bit(index) {
            return None;
        }
        bucket.data.values[index].as_ref()
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: i64) -> bool {
        self.get(key).is_some()
    }

    /// Smallest key: the lowest set bit of the minimum bucket.
    #[must_use]
    pub fn minimum(&self) -> Option<i64> {
        let bucket = self.root.tree.minimum()?;
        let index = next_set_bit(&bucket.data.bits, 0)?;
        Some((bucket.base << BUCKET_BITS) | index as i64)
    }

    /// Forward iteration in strictly increasing key order.
    pub fn iter(&self) -> BitTreeIterator<'_, V> {
        BitTreeIterator {
            buckets: self.root.tree.iter(),
            current: None,
            minimum_key: i64::MIN,
        }
    }

    /// Forward iteration over keys `>= from`, resuming mid-bucket when
    /// `from` lands inside a block.
    pub fn tail_iter(&self, from: i64) -> BitTreeIterator<'_, V> {
        let (base, _) = split_key(from);
        BitTreeIterator {
            buckets: self
                .root
                .tree
                .tail_iter_with(move |bucket| bucket.base.cmp(&base)),
            current: None,
            minimum_key: from,
        }
    }
}

/// Iterator over a bit-tree map snapshot yielding `(key, &value)`.
pub struct BitTreeIterator<'a, V> {
    buckets: TreeIterator<'a, Bucket<V>>,
    current: Option<(&'a Bucket<V>, usize)>,
    minimum_key: i64,
}

impl<'a, V> Iterator for BitTreeIterator<'a, V> {
    type Item = (i64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((bucket, next_index)) = self.current {
                if let Some(index) = next_set_bit(&bucket.data.bits, next_index) {
                    self.current = Some((bucket, index + 1));
                    let key = (bucket.base << BUCKET_BITS) | index as i64;
                    if key >= self.minimum_key {
                        let value = bucket.data.values[index].as_ref();
                        debug_assert!(value.is_some(), "set bit without a value at key {key}");
                        if let Some(value) = value {
                            return Some((key, value));
                        }
                    }
                    continue;
                }
                self.current = None;
            }
            let bucket = self.buckets.next()?;
            self.current = Some((bucket, 0));
        }
    }
}

/// A private copy-on-write view over a [`PersistentBitTreeLongMap`].
///
/// Mutations clone only the touched 1024-key bucket.
pub struct MutableBitTreeMap<'m, V> {
    owner: &'m PersistentBitTreeLongMap<V>,
    base: Arc<BitRoot<V>>,
    tree: ImmutableTree<Bucket<V>>,
    length: usize,
}

impl<V: Clone> MutableBitTreeMap<'_, V> {
    /// Inserts or replaces the value under `key`.
    pub fn put(&mut self, key: i64, value: V) {
        let (base, index) = split_key(key);
        let mut data = match self.tree.get_with(|bucket| bucket.base.cmp(&base)) {
            Some(bucket) => (*bucket.data).clone(),
            None => BucketData {
                bits: [0; BUCKET_WORDS],
                values: vec![None; BUCKET_SIZE],
            },
        };
        if !data.bit(index) {
            data.bits[index / 64] |= 1 << (index % 64);
            self.length += 1;
        }
        data.values[index] = Some(value);
        self.tree = self
            .tree
            .add(Bucket {
                base,
                data: Arc::new(data),
            })
            .0;
    }

    /// Removes `key`, returning its value. Dropping the last key of a
    /// bucket drops the bucket. Absent keys are a no-op.
    pub fn remove(&mut self, key: i64) -> Option<V> {
        let (base, index) = split_key(key);
        let bucket = self.tree.get_with(|bucket| bucket.base.cmp(&base))?;
        if !bucket.data.bit(index) {
            return None;
        }
        let mut data = (*bucket.data).clone();
        data.bits[index / 64] &= !(1 << (index % 64));
        let value = data.values[index].take();
        self.length -= 1;
        self.tree = if data.is_clear() {
            self.tree
                .remove_with(|bucket| bucket.base.cmp(&base))
                .map_or_else(|| self.tree.clone(), |(next, _)| next)
        } else {
            self.tree
                .add(Bucket {
                    base,
                    data: Arc::new(data),
                })
                .0
        };
        value
    }

    /// Looks up the in-progress version.
    #[must_use]
    pub fn get(&self, key: i64) -> Option<&V> {
        let (base, index) = split_key(key);
        let bucket = self.tree.get_with(|bucket| bucket.base.cmp(&base))?;
        if !bucket.data.bit(index) {
            return None;
        }
        bucket.data.values[index].as_ref()
    }

    /// Returns `true` if `key` is present in the in-progress version.
    #[must_use]
    pub fn contains_key(&self, key: i64) -> bool {
        self.get(key).is_some()
    }

    /// Commits: atomically swaps the container root if it still matches
    /// this view's base.
    #[must_use]
    pub fn end_write(self) -> bool {
        let next = Arc::new(BitRoot {
            tree: self.tree,
            length: self.length,
        });
        let previous = self.owner.root.compare_and_swap(&self.base, next);
        Arc::ptr_eq(&previous, &self.base)
    }
}

impl<V> MutableBitTreeMap<'_, V> {
    /// Key count of the in-progress version.
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the in-progress version is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}
