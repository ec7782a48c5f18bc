//! Store boundary: index sources, transactions, and event routing.
//!
//! [`StoreSource`] is what a storage backend must supply: cursors over
//! four byte-ordered indexes plus an existence check. [`EntityStore`]
//! wraps a source with the shared query-result cache and routes data
//! change events into cached instances. [`StoreTransaction`] is the
//! read snapshot handed to iterables.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::cached::CachedIterable;
use super::cursor::Cursor;
use super::entity_id::EntityId;
use super::handle::IterableHandle;
use super::iterable::{EntityIterable, EntityIterator};
use crate::persistent::PersistentObjectCache;

/// Opens index cursors against the current snapshot of a backend.
///
/// Index layouts (all keys built by the `binding` encodings):
///
/// - entity index, per type: compressed local id, no payload
/// - property index, per (type, property): value key, duplicate
///   values are compressed local ids
/// - link index, per source type: `(source local id, link id)` key,
///   duplicate values are encoded target ids
/// - reverse link index, per source type: `(link id, target id)` key,
///   duplicate values are compressed source local ids
///
/// Every cursor returned reads a frozen snapshot: mutations committed
/// after the cursor opened are invisible to it.
pub trait StoreSource: Send + Sync {
    /// Cursor over the entity index of `type_id`.
    fn entity_index(&self, type_id: i32) -> Box<dyn Cursor>;

    /// Cursor over the value index of `(type_id, property_id)`.
    fn property_index(&self, type_id: i32, property_id: i32) -> Box<dyn Cursor>;

    /// Cursor over the outgoing link index of source type `type_id`.
    fn link_index(&self, type_id: i32) -> Box<dyn Cursor>;

    /// Cursor over the reverse link index of source type `type_id`.
    fn reverse_link_index(&self, type_id: i32) -> Box<dyn Cursor>;

    /// Returns `true` if `id` currently exists.
    fn entity_exists(&self, id: EntityId) -> bool;
}

/// Failure surfaced to callers of the store API.
///
/// Cursor misses never raise; they become empty iterations. The only
/// hard failure is asking for an entity that was structurally removed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityStoreError {
    /// The referenced entity has been removed from the backing store.
    #[error("entity {id} has been removed")]
    EntityRemoved {
        /// The id that no longer resolves.
        id: EntityId,
    },
}

/// The matchers only say a change *could* affect a result. Patching a
/// cached instance in place additionally needs the handle alone to
/// decide whether the changed id belongs in the result: a bare type
/// scan does, a range scan does (its matcher already checked
/// containment), and every other shape depends on link or property
/// state the event does not carry, so those instances are dropped and
/// rebuilt on the next query.
fn decides_membership(handle: &IterableHandle) -> bool {
    matches!(
        handle,
        IterableHandle::EntitiesOfType { .. } | IterableHandle::EntitiesOfRange { .. }
    )
}

/// A store source paired with the shared query-result cache.
///
/// Cached instances are keyed by the structural hash of their handle.
/// Data change events reported through the `on_*` methods are routed to
/// every cached instance whose handle matches: updatable instances are
/// patched in place through the incremental update protocol, the rest
/// are dropped from the cache.
pub struct EntityStore<S> {
    source: S,
    cache: PersistentObjectCache<u64, Arc<CachedIterable>>,
}

impl<S: StoreSource> EntityStore<S> {
    /// Wraps `source` with a result cache bounded to `cache_size`
    /// instances.
    pub fn new(source: S, cache_size: usize) -> Self {
        Self {
            source,
            cache: PersistentObjectCache::new(cache_size),
        }
    }

    /// The wrapped source, for direct data manipulation.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Opens a read transaction over the current snapshot.
    #[must_use]
    pub fn begin_transaction(&self) -> StoreTransaction<'_> {
        StoreTransaction {
            source: &self.source,
            cache: &self.cache,
        }
    }

    /// Number of cached query results.
    #[must_use]
    pub fn cached_results(&self) -> usize {
        self.cache.count()
    }

    /// Routes an entity creation into affected cached instances.
    pub fn on_entity_added(&self, id: EntityId) {
        self.route_entity_change(id, true);
    }

    /// Routes an entity removal into affected cached instances.
    pub fn on_entity_removed(&self, id: EntityId) {
        self.route_entity_change(id, false);
    }

    /// Invalidates cached instances affected by adding or deleting a
    /// link of `link_id` on entities of `type_id`.
    pub fn on_link_adjusted(&self, type_id: i32, link_id: i32) {
        self.invalidate(|handle| handle.is_matched_link_adjusted(type_id, link_id));
    }

    /// Invalidates cached instances affected by a property change.
    pub fn on_property_changed(&self, type_id: i32, property_id: i32) {
        self.invalidate(|handle| handle.is_matched_property_changed(type_id, property_id));
    }

    fn route_entity_change(&self, id: EntityId, added: bool) {
        let mut matched = Vec::new();
        self.cache.for_each_value(|key, instance| {
            let affected = if added {
                instance.handle().is_matched_entity_added(id)
            } else {
                instance.handle().is_matched_entity_removed(id)
            };
            if affected {
                matched.push((*key, instance.clone()));
            }
        });
        for (key, instance) in matched {
            if instance.is_updatable() && decides_membership(instance.handle()) {
                loop {
                    let Some(mut update) = instance.begin_update() else {
                        break;
                    };
                    if added {
                        update.add_entity(id);
                    } else {
                        update.remove_entity(id);
                    }
                    if update.end_update() {
                        break;
                    }
                }
            } else {
                debug!(key, "dropping cached result not patchable in place");
                self.cache.remove(&key);
            }
        }
    }

    fn invalidate(&self, matched: impl Fn(&IterableHandle) -> bool) {
        let mut stale = Vec::new();
        self.cache.for_each_value(|key, instance| {
            if matched(instance.handle()) {
                stale.push(*key);
            }
        });
        for key in stale {
            self.cache.remove(&key);
        }
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for EntityStore<S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EntityStore")
            .field("source", &self.source)
            .field("cached_results", &self.cache.count())
            .finish()
    }
}

/// A read snapshot over a [`StoreSource`] plus the shared result
/// cache.
#[derive(Clone, Copy)]
pub struct StoreTransaction<'t> {
    source: &'t dyn StoreSource,
    cache: &'t PersistentObjectCache<u64, Arc<CachedIterable>>,
}

impl<'t> StoreTransaction<'t> {
    /// Cursor over the entity index of `type_id`.
    #[must_use]
    pub fn entity_index(&self, type_id: i32) -> Box<dyn Cursor> {
        self.source.entity_index(type_id)
    }

    /// Cursor over the value index of `(type_id, property_id)`.
    #[must_use]
    pub fn property_index(&self, type_id: i32, property_id: i32) -> Box<dyn Cursor> {
        self.source.property_index(type_id, property_id)
    }

    /// Cursor over the outgoing link index of `type_id`.
    #[must_use]
    pub fn link_index(&self, type_id: i32) -> Box<dyn Cursor> {
        self.source.link_index(type_id)
    }

    /// Cursor over the reverse link index of `type_id`.
    #[must_use]
    pub fn reverse_link_index(&self, type_id: i32) -> Box<dyn Cursor> {
        self.source.reverse_link_index(type_id)
    }

    /// Resolves `id`, failing if the entity was removed.
    ///
    /// # Errors
    ///
    /// [`EntityStoreError::EntityRemoved`] when `id` does not resolve.
    pub fn get_entity(&self, id: EntityId) -> Result<EntityId, EntityStoreError> {
        if self.source.entity_exists(id) {
            Ok(id)
        } else {
            Err(EntityStoreError::EntityRemoved { id })
        }
    }

    /// The cached instance for `handle`, if present and structurally
    /// consistent.
    #[must_use]
    pub fn cached(&self, handle: &IterableHandle) -> Option<Arc<CachedIterable>> {
        let instance = self.cache.try_key(&handle.hash64())?;
        (instance.handle() == handle).then_some(instance)
    }

    /// Iterates `iterable` through the cache: a consistent cached
    /// instance is served without touching a cursor; a cacheable miss
    /// is materialized, stored, then served; everything else falls back
    /// to a raw scan.
    pub fn iterate(&self, iterable: &dyn EntityIterable) -> Box<dyn EntityIterator + 't> {
        let handle = iterable.handle();
        if let Some(instance) = self.cached(&handle) {
            return Box::new(instance.iter());
        }
        if iterable.can_be_cached(self) {
            let mut source = iterable.iter(self);
            let instance = Arc::new(CachedIterable::from_iterator(handle, &mut source));
            source.dispose();
            self.cache
                .cache_object(instance.handle().hash64(), instance.clone());
            return Box::new(instance.iter());
        }
        iterable.iter(self)
    }
}

impl std::fmt::Debug for StoreTransaction<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StoreTransaction")
            .field("cached_results", &self.cache.count())
            .finish()
    }
}
