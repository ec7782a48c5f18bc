//! Lazy, composable entity queries over sorted key/value indexes.
//!
//! The building blocks:
//!
//! - [`EntityId`]: a typed 96-bit entity address ordered by type then
//!   local id. Every iterator in this module yields ids in that order
//!   unless documented otherwise.
//! - [`Cursor`]: the boundary to the underlying storage. Iterables
//!   never touch index bytes directly; they walk cursors opened by a
//!   [`StoreTransaction`]. [`MemoryEntityStore`] is the in-process
//!   [`StoreSource`] used throughout the tests.
//! - [`EntityIterable`]: a query description. Constructing one does no
//!   work; iteration starts when [`EntityIterable::iter`] runs against
//!   a transaction. Source iterables ([`EntitiesOfTypeIterable`],
//!   [`PropertyValueIterable`], ...) scan indexes, composite ones
//!   ([`UnionIterable`], [`SelectManyIterable`], ...) combine other
//!   iterables.
//! - [`IterableHandle`]: the structural identity of a query, used as
//!   the cache key and re-instantiated through an
//!   [`IterableRegistry`].
//! - [`CachedIterable`]: a materialized result held by the
//!   [`EntityStore`] cache and patched in place when single-type
//!   results can absorb entity churn.
//!
//! ```
//! use evergreen::iterate::{
//!     EntitiesOfTypeIterable, EntityIterable, MemoryEntityStore, EntityStore,
//! };
//!
//! let store = EntityStore::new(MemoryEntityStore::new(), 64);
//! let issue = store.source().new_entity(0);
//! let txn = store.begin_transaction();
//! let all = EntitiesOfTypeIterable::new(0);
//! assert_eq!(txn.iterate(&all).collect::<Vec<_>>(), vec![issue]);
//! ```

mod binary;
mod binding;
mod cached;
mod cursor;
mod entity_id;
mod filter;
mod handle;
mod iterable;
mod links;
mod memory;
mod property;
mod registry;
mod select;
mod store;
mod types;

pub use binary::ConcatIterable;
pub use binary::IntersectionIterable;
pub use binary::MinusIterable;
pub use binary::UnionIterable;
pub use binding::PropertyValue;
pub use binding::decode_entity_id;
pub use binding::decode_link_key;
pub use binding::decode_long;
pub use binding::encode_entity_id;
pub use binding::encode_long;
pub use binding::link_key;
pub use binding::read_compressed_u64;
pub use binding::reverse_link_key;
pub use binding::write_compressed_u64;
pub use cached::CachedIterable;
pub use cached::CachedIterator;
pub use cached::CachedUpdate;
pub use cursor::Cursor;
pub use entity_id::EntityId;
pub use entity_id::EntityIdSet;
pub use filter::FilterLinksIterable;
pub use handle::IterableHandle;
pub use handle::IterableKind;
pub use iterable::EmptyIterator;
pub use iterable::EntityIterable;
pub use iterable::EntityIterator;
pub use links::EntitiesWithLinkIterable;
pub use links::EntityToLinksIterable;
pub use memory::MemoryCursor;
pub use memory::MemoryEntityStore;
pub use property::EntitiesWithPropertyIterable;
pub use property::PropertyRangeIterable;
pub use property::PropertyValueIterable;
pub use registry::IterableConstructor;
pub use registry::IterableRegistry;
pub use select::DistinctIterable;
pub use select::SelectDistinctIterable;
pub use select::SelectManyIterable;
pub use store::EntityStore;
pub use store::EntityStoreError;
pub use store::StoreSource;
pub use store::StoreTransaction;
pub use types::EntitiesOfRangeIterable;
pub use types::EntitiesOfTypeIterable;
