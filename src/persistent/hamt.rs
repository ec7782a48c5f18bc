//! Hash-array-mapped-trie core shared by the hash map and hash set.
//!
//! [`HamtMap`] is the immutable value type: 32-way branching, 5 bits of
//! hash per level, bitmap-compressed child arrays, and flat collision
//! nodes for keys whose hashes fully agree. The public containers in
//! `hashmap`/`hashset` wrap it with the atomic current-root discipline.

use std::borrow::Borrow;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

/// Branching factor (2^5 = 32).
const BRANCHING_BITS: u32 = 5;

const SLICE_MASK: u64 = (1 << BRANCHING_BITS) - 1;

pub(crate) fn compute_hash<Q: Hash + ?Sized>(key: &Q) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

#[inline]
const fn slice(hash: u64, depth: u32) -> u32 {
    ((hash >> (depth * BRANCHING_BITS)) & SLICE_MASK) as u32
}

enum HamtNode<K, V> {
    /// Bitmap-indexed table. Invariant: `children.len() == bitmap.count_ones()`.
    Table {
        bitmap: u32,
        children: Arc<[Child<K, V>]>,
    },
    /// Keys whose hashes fully agree. Invariant: at least two entries.
    Collision { hash: u64, entries: Arc<[(K, V)]> },
}

enum Child<K, V> {
    Entry { hash: u64, key: K, value: V },
    Node(Arc<HamtNode<K, V>>),
}

impl<K: Clone, V: Clone> Clone for Child<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Entry { hash, key, value } => Self::Entry {
                hash: *hash,
                key: key.clone(),
                value: value.clone(),
            },
            Self::Node(node) => Self::Node(node.clone()),
        }
    }
}

/// Result of removing below a table slot: the slot's replacement, a
/// single collapsed entry (so 2-element tables lose their indirection),
/// or nothing.
enum Removed<K, V> {
    Node(Arc<HamtNode<K, V>>),
    Entry(u64, K, V),
    Empty,
}

/// Immutable HAMT map value. Cloning is an `Arc` bump; every mutation
/// returns a new version sharing all untouched subtrees.
pub(crate) struct HamtMap<K, V> {
    root: Option<Arc<HamtNode<K, V>>>,
    length: usize,
}

impl<K, V> Clone for HamtMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            length: self.length,
        }
    }
}

impl<K, V> HamtMap<K, V> {
    pub(crate) const fn new() -> Self {
        Self {
            root: None,
            length: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.length
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub(crate) fn iter(&self) -> HamtIterator<'_, K, V> {
        let mut stack = Vec::new();
        if let Some(root) = self.root.as_deref() {
            stack.push(NodeFrame {
                node: root,
                position: 0,
            });
        }
        HamtIterator { stack }
    }
}

struct NodeFrame<'a, K, V> {
    node: &'a HamtNode<K, V>,
    position: usize,
}

/// Iterator over a [`HamtMap`] in unspecified (hash-bucket) order.
pub(crate) struct HamtIterator<'a, K, V> {
    stack: Vec<NodeFrame<'a, K, V>>,
}

impl<'a, K, V> Iterator for HamtIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            match frame.node {
                HamtNode::Table { children, .. } => {
                    if frame.position >= children.len() {
                        self.stack.pop();
                        continue;
                    }
                    let child = &children[frame.position];
                    frame.position += 1;
                    match child {
                        Child::Entry { key, value, .. } => return Some((key, value)),
                        Child::Node(node) => self.stack.push(NodeFrame {
                            node,
                            position: 0,
                        }),
                    }
                }
                HamtNode::Collision { entries, .. } => {
                    if frame.position >= entries.len() {
                        self.stack.pop();
                        continue;
                    }
                    let (key, value) = &entries[frame.position];
                    frame.position += 1;
                    return Some((key, value));
                }
            }
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> HamtMap<K, V> {
    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = compute_hash(key);
        let mut node = self.root.as_deref()?;
        let mut depth = 0;
        loop {
            match node {
                HamtNode::Table { bitmap, children } => {
                    let bit = 1u32 << slice(hash, depth);
                    if bitmap & bit == 0 {
                        return None;
                    }
                    let position = (bitmap & (bit - 1)).count_ones() as usize;
                    match &children[position] {
                        Child::Entry {
                            hash: entry_hash,
                            key: entry_key,
                            value,
                        } => {
                            return (*entry_hash == hash && entry_key.borrow() == key)
                                .then_some(value);
                        }
                        Child::Node(sub) => {
                            node = sub;
                            depth += 1;
                        }
                    }
                }
                HamtNode::Collision {
                    hash: node_hash,
                    entries,
                } => {
                    if *node_hash != hash {
                        return None;
                    }
                    return entries
                        .iter()
                        .find(|(entry_key, _)| entry_key.borrow() == key)
                        .map(|(_, value)| value);
                }
            }
        }
    }

    pub(crate) fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Inserts, returning the next version and the previous value for an
    /// equal key. `None` as the second element means the element count
    /// grew — the exact-size bookkeeping the containers rely on.
    pub(crate) fn insert(&self, key: K, value: V) -> (Self, Option<V>) {
        let hash = compute_hash(&key);
        match self.root.as_deref() {
            None => {
                let root = HamtNode::Table {
                    bitmap: 1 << slice(hash, 0),
                    children: Arc::from(vec![Child::Entry { hash, key, value }]),
                };
                (
                    Self {
                        root: Some(Arc::new(root)),
                        length: 1,
                    },
                    None,
                )
            }
            Some(root) => {
                let (root, previous) = insert_node(root, 0, hash, key, value);
                let length = if previous.is_some() {
                    self.length
                } else {
                    self.length + 1
                };
                (
                    Self {
                        root: Some(root),
                        length,
                    },
                    previous,
                )
            }
        }
    }

    /// Removes `key`, returning the next version and the stored value,
    /// or `None` when absent.
    pub(crate) fn remove<Q>(&self, key: &Q) -> Option<(Self, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = compute_hash(key);
        let root = self.root.as_deref()?;
        let (removed, value) = remove_node(root, 0, hash, key)?;
        let root = match removed {
            Removed::Node(node) => Some(node),
            // The root table keeps a lone entry; collapse applies below
            // the root only.
            Removed::Entry(entry_hash, entry_key, entry_value) => {
                Some(Arc::new(HamtNode::Table {
                    bitmap: 1 << slice(entry_hash, 0),
                    children: Arc::from(vec![Child::Entry {
                        hash: entry_hash,
                        key: entry_key,
                        value: entry_value,
                    }]),
                }))
            }
            Removed::Empty => None,
        };
        Some((
            Self {
                root,
                length: self.length - 1,
            },
            value,
        ))
    }
}

/// Builds the smallest subtree distinguishing two entries, descending
/// until their hash slices diverge (hashes fully agreeing become a
/// collision node).
fn join_entries<K, V>(
    depth: u32,
    first: (u64, K, V),
    second: (u64, K, V),
) -> Arc<HamtNode<K, V>> {
    let (first_hash, first_key, first_value) = first;
    let (second_hash, second_key, second_value) = second;
    if first_hash == second_hash {
        return Arc::new(HamtNode::Collision {
            hash: first_hash,
            entries: Arc::from(vec![
                (first_key, first_value),
                (second_key, second_value),
            ]),
        });
    }
    debug_assert!(depth * BRANCHING_BITS < u64::BITS);
    let first_slice = slice(first_hash, depth);
    let second_slice = slice(second_hash, depth);
    if first_slice == second_slice {
        let sub = join_entries(
            depth + 1,
            (first_hash, first_key, first_value),
            (second_hash, second_key, second_value),
        );
        return Arc::new(HamtNode::Table {
            bitmap: 1 << first_slice,
            children: Arc::from(vec![Child::Node(sub)]),
        });
    }
    let first_child = Child::Entry {
        hash: first_hash,
        key: first_key,
        value: first_value,
    };
    let second_child = Child::Entry {
        hash: second_hash,
        key: second_key,
        value: second_value,
    };
    let children = if first_slice < second_slice {
        vec![first_child, second_child]
    } else {
        vec![second_child, first_child]
    };
    Arc::new(HamtNode::Table {
        bitmap: (1 << first_slice) | (1 << second_slice),
        children: Arc::from(children),
    })
}

fn insert_node<K: Hash + Eq + Clone, V: Clone>(
    node: &HamtNode<K, V>,
    depth: u32,
    hash: u64,
    key: K,
    value: V,
) -> (Arc<HamtNode<K, V>>, Option<V>) {
    match node {
        HamtNode::Table { bitmap, children } => {
            let index = slice(hash, depth);
            let bit = 1u32 << index;
            let position = (bitmap & (bit - 1)).count_ones() as usize;
            if bitmap & bit == 0 {
                let mut next: Vec<Child<K, V>> = children.to_vec();
                next.insert(position, Child::Entry { hash, key, value });
                return (
                    Arc::new(HamtNode::Table {
                        bitmap: bitmap | bit,
                        children: Arc::from(next),
                    }),
                    None,
                );
            }
            let (replacement, previous) = match &children[position] {
                Child::Entry {
                    hash: entry_hash,
                    key: entry_key,
                    value: entry_value,
                } => {
                    if *entry_hash == hash && entry_key == &key {
                        // Equal key: replace both key and value — entry
                        // equality is defined by key alone, but the
                        // replacement must carry the new payload.
                        (
                            Child::Entry { hash, key, value },
                            Some(entry_value.clone()),
                        )
                    } else {
                        let sub = join_entries(
                            depth + 1,
                            (*entry_hash, entry_key.clone(), entry_value.clone()),
                            (hash, key, value),
                        );
                        (Child::Node(sub), None)
                    }
                }
                Child::Node(sub) => {
                    let (sub, previous) = insert_node(sub, depth + 1, hash, key, value);
                    (Child::Node(sub), previous)
                }
            };
            let mut next: Vec<Child<K, V>> = children.to_vec();
            next[position] = replacement;
            (
                Arc::new(HamtNode::Table {
                    bitmap: *bitmap,
                    children: Arc::from(next),
                }),
                previous,
            )
        }
        HamtNode::Collision {
            hash: node_hash,
            entries,
        } => {
            if *node_hash == hash {
                let mut next: Vec<(K, V)> = entries.to_vec();
                let previous = next
                    .iter_mut()
                    .find(|(entry_key, _)| entry_key == &key)
                    .map(|slot| std::mem::replace(slot, (key.clone(), value.clone())).1);
                if previous.is_none() {
                    next.push((key, value));
                }
                return (
                    Arc::new(HamtNode::Collision {
                        hash,
                        entries: Arc::from(next),
                    }),
                    previous,
                );
            }
            // Diverging hash below a collision node: push the collision
            // node one level down and branch.
            let collision_slice = slice(*node_hash, depth);
            let entry_slice = slice(hash, depth);
            let collision_child = Child::Node(Arc::new(HamtNode::Collision {
                hash: *node_hash,
                entries: entries.clone(),
            }));
            if collision_slice == entry_slice {
                let (sub, previous) =
                    insert_node(node, depth + 1, hash, key, value);
                debug_assert!(previous.is_none());
                return (
                    Arc::new(HamtNode::Table {
                        bitmap: 1 << collision_slice,
                        children: Arc::from(vec![Child::Node(sub)]),
                    }),
                    None,
                );
            }
            let entry_child = Child::Entry { hash, key, value };
            let children = if collision_slice < entry_slice {
                vec![collision_child, entry_child]
            } else {
                vec![entry_child, collision_child]
            };
            (
                Arc::new(HamtNode::Table {
                    bitmap: (1 << collision_slice) | (1 << entry_slice),
                    children: Arc::from(children),
                }),
                None,
            )
        }
    }
}

fn remove_node<K, V, Q>(
    node: &HamtNode<K, V>,
    depth: u32,
    hash: u64,
    key: &Q,
) -> Option<(Removed<K, V>, V)>
where
    K: Hash + Eq + Clone + Borrow<Q>,
    V: Clone,
    Q: Hash + Eq + ?Sized,
{
    match node {
        HamtNode::Table { bitmap, children } => {
            let bit = 1u32 << slice(hash, depth);
            if bitmap & bit == 0 {
                return None;
            }
            let position = (bitmap & (bit - 1)).count_ones() as usize;
            let (replacement, value) = match &children[position] {
                Child::Entry {
                    hash: entry_hash,
                    key: entry_key,
                    value: entry_value,
                } => {
                    if *entry_hash != hash || entry_key.borrow() != key {
                        return None;
                    }
                    (None, entry_value.clone())
                }
                Child::Node(sub) => {
                    let (removed, value) = remove_node(sub, depth + 1, hash, key)?;
                    let replacement = match removed {
                        Removed::Node(sub) => Some(Child::Node(sub)),
                        Removed::Entry(entry_hash, entry_key, entry_value) => {
                            Some(Child::Entry {
                                hash: entry_hash,
                                key: entry_key,
                                value: entry_value,
                            })
                        }
                        Removed::Empty => None,
                    };
                    (replacement, value)
                }
            };
            let removed = match replacement {
                Some(child) => {
                    let mut next: Vec<Child<K, V>> = children.to_vec();
                    next[position] = child;
                    table_or_collapse(*bitmap, next)
                }
                None => {
                    if children.len() == 1 {
                        Removed::Empty
                    } else {
                        let mut next: Vec<Child<K, V>> = children.to_vec();
                        next.remove(position);
                        table_or_collapse(bitmap & !bit, next)
                    }
                }
            };
            Some((removed, value))
        }
        HamtNode::Collision {
            hash: node_hash,
            entries,
        } => {
            if *node_hash != hash {
                return None;
            }
            let position = entries
                .iter()
                .position(|(entry_key, _)| entry_key.borrow() == key)?;
            let value = entries[position].1.clone();
            let removed = if entries.len() == 2 {
                let (remaining_key, remaining_value) = entries[1 - position].clone();
                Removed::Entry(*node_hash, remaining_key, remaining_value)
            } else {
                let mut next: Vec<(K, V)> = entries.to_vec();
                next.remove(position);
                Removed::Node(Arc::new(HamtNode::Collision {
                    hash: *node_hash,
                    entries: Arc::from(next),
                }))
            };
            Some((removed, value))
        }
    }
}

/// A table reduced to a single bare entry collapses into that entry so
/// small buckets carry no indirection.
fn table_or_collapse<K: Clone, V: Clone>(bitmap: u32, children: Vec<Child<K, V>>) -> Removed<K, V> {
    if children.len() == 1 {
        if let Child::Entry { hash, key, value } = &children[0] {
            return Removed::Entry(*hash, key.clone(), value.clone());
        }
    }
    Removed::Node(Arc::new(HamtNode::Table {
        bitmap,
        children: Arc::from(children),
    }))
}

#[cfg(test)]
mod tests {
    use super::HamtMap;
    use rstest::rstest;

    #[rstest]
    fn test_insert_get_remove_roundtrip() {
        let map: HamtMap<String, i32> = HamtMap::new();
        let (map, previous) = map.insert("one".to_string(), 1);
        assert!(previous.is_none());
        let (map, previous) = map.insert("one".to_string(), 10);
        assert_eq!(previous, Some(1));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("one"), Some(&10));

        let (map, value) = map.remove("one").unwrap();
        assert_eq!(value, 10);
        assert!(map.is_empty());
        assert!(map.remove("one").is_none());
    }

    #[rstest]
    fn test_many_keys_survive_mixed_operations() {
        let mut map: HamtMap<i32, i32> = HamtMap::new();
        for key in 0..500 {
            map = map.insert(key, key * 2).0;
        }
        assert_eq!(map.len(), 500);
        for key in (0..500).step_by(2) {
            map = map.remove(&key).unwrap().0;
        }
        assert_eq!(map.len(), 250);
        assert!(map.get(&2).is_none());
        assert_eq!(map.get(&3), Some(&6));
        assert_eq!(map.iter().count(), 250);
    }
}
