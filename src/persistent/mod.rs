//! Persistent (immutable) data structures with optimistic versioning.
//!
//! This module provides efficient immutable data structures that use
//! structural sharing to minimize copying, plus thread-safe containers
//! that version them through atomic root swaps:
//!
//! - [`PersistentStack`] / [`PersistentQueue`]: linked stack and
//!   two-stack queue
//! - [`Persistent23Tree`]: persistent ordered set (2-3 tree)
//! - [`PersistentHashMap`] / [`PersistentHashSet`]: persistent hash
//!   map and set (HAMT)
//! - [`PersistentLong23TreeMap`]: ordered map keyed by `i64`
//! - [`PersistentBitTreeLongMap`]: `i64`-keyed map bucketing 1024
//!   consecutive keys per tree entry
//! - [`PersistentLinkedHashMap`]: hash map with access-order tracking
//!   and bounded eviction
//! - [`PersistentObjectCache`]: two-generation segmented-LRU cache
//!
//! # Versioning
//!
//! Every container follows the same discipline: `begin_read` freezes
//! the current version as an `Immutable*` snapshot, `begin_write`
//! opens a private `Mutable*` copy-on-write view, and `end_write`
//! publishes the view with a compare-and-swap against the version it
//! started from. A writer that lost the race gets `false` back and
//! retries against the fresh root; readers never block and never see a
//! half-applied write.
//!
//! # Examples
//!
//! ```rust
//! use evergreen::persistent::Persistent23Tree;
//!
//! let tree = Persistent23Tree::new();
//! let mut write = tree.begin_write();
//! write.add(2);
//! write.add(1);
//! assert!(write.end_write());
//!
//! // Snapshots are frozen: later commits do not affect them.
//! let snapshot = tree.begin_read();
//! let mut write = tree.begin_write();
//! write.add(3);
//! assert!(write.end_write());
//! assert_eq!(snapshot.len(), 2);
//! assert_eq!(tree.size(), 3);
//! ```

mod bit_tree_map;
mod cache;
pub(crate) mod hamt;
mod hashmap;
mod hashset;
mod linked_hashmap;
mod long_map;
mod stack;
mod tree23;

pub use bit_tree_map::BitTreeIterator;
pub use bit_tree_map::ImmutableBitTreeMap;
pub use bit_tree_map::MutableBitTreeMap;
pub use bit_tree_map::PersistentBitTreeLongMap;
pub use cache::PersistentObjectCache;
pub use hashmap::HashMapIterator;
pub use hashmap::ImmutableHashMap;
pub use hashmap::MutableHashMap;
pub use hashmap::PersistentHashMap;
pub use hashset::HashSetIterator;
pub use hashset::ImmutableHashSet;
pub use hashset::MutableHashSet;
pub use hashset::PersistentHashSet;
pub use linked_hashmap::EvictionPredicate;
pub use linked_hashmap::ImmutableLinkedHashMap;
pub use linked_hashmap::MutableLinkedHashMap;
pub use linked_hashmap::PersistentLinkedHashMap;
pub use long_map::ImmutableLongMap;
pub use long_map::LongMapIterator;
pub use long_map::MutableLongMap;
pub use long_map::PersistentLong23TreeMap;
pub use stack::PersistentQueue;
pub use stack::PersistentStack;
pub use stack::PersistentStackIterator;
pub use tree23::ImmutableTree;
pub use tree23::MutableTree;
pub use tree23::Persistent23Tree;
pub use tree23::TreeIterator;
