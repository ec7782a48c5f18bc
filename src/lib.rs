//! # evergreen
//!
//! Persistent (immutable, structurally-shared) collections and a lazy
//! entity-iterable query engine with copy-on-write result caching.
//!
//! ## Overview
//!
//! The crate has two layers:
//!
//! - [`persistent`]: versioned, lock-free data structures — a 2-3 tree,
//!   a HAMT hash map/set, long-keyed map specializations, an
//!   insertion/access-ordered linked hash map, and a two-generation
//!   object cache built on top of them. Every structure exposes frozen
//!   snapshots for readers and optimistic copy-on-write write views that
//!   commit with a compare-and-swap against the current root.
//! - [`iterate`]: a query engine composing set-algebraic operations
//!   (union, intersection, minus, concat, distinct, select-many) over
//!   cursors into an entity store, producing lazy sequences of entity
//!   identifiers. Results of stable queries are materialized into the
//!   persistent structures and patched incrementally on later mutations.
//!
//! ## Concurrency model
//!
//! Readers never synchronize: they traverse a frozen snapshot graph.
//! Writers build a private version off the observed root and commit by
//! atomic compare-and-swap; a losing writer never blocks, it restarts.
//!
//! ## Example
//!
//! ```rust
//! use evergreen::persistent::Persistent23Tree;
//!
//! let tree = Persistent23Tree::new();
//! let mut write = tree.begin_write();
//! write.add(3);
//! write.add(1);
//! write.add(2);
//! assert!(write.end_write());
//!
//! let snapshot = tree.begin_read();
//! let keys: Vec<i32> = snapshot.iter().copied().collect();
//! assert_eq!(keys, vec![1, 2, 3]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod iterate;
pub mod persistent;

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types and traits.
///
/// # Usage
///
/// ```rust
/// use evergreen::prelude::*;
/// ```
pub mod prelude {
    pub use crate::iterate::*;
    pub use crate::persistent::*;
}
