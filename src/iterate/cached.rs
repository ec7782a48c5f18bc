//! Materialized query results.
//!
//! A [`CachedIterable`] freezes one query's ids so repeats within the
//! cache window touch no cursor. Single-type results go into a
//! [`PersistentBitTreeLongMap`] keyed by local id, which also makes
//! them updatable in place: a matching entity add or remove patches
//! the backing map through its copy-on-write commit instead of
//! invalidating the instance. Heterogeneous results are frozen into a
//! sorted id slice and invalidated on change.

use std::sync::Arc;

use super::entity_id::EntityId;
use super::handle::IterableHandle;
use super::iterable::EntityIterator;
use crate::persistent::{ImmutableBitTreeMap, MutableBitTreeMap, PersistentBitTreeLongMap};

enum CachedStorage {
    SingleType {
        type_id: i32,
        ids: PersistentBitTreeLongMap<()>,
    },
    Mixed {
        ids: Arc<[EntityId]>,
    },
}

/// A materialized, handle-keyed snapshot of a query result.
pub struct CachedIterable {
    handle: IterableHandle,
    storage: CachedStorage,
}

impl CachedIterable {
    /// Materializes `source` under `handle`.
    ///
    /// Results confined to one entity type (or whose handle names one)
    /// get the updatable bit-map representation; mixed results are
    /// frozen sorted and deduplicated.
    pub fn from_iterator(
        handle: IterableHandle,
        source: &mut (impl Iterator<Item = EntityId> + ?Sized),
    ) -> Self {
        let mut collected: Vec<EntityId> = source.collect();
        let single_type = match collected.split_first() {
            None => handle_type(&handle),
            Some((first, rest)) => rest
                .iter()
                .all(|id| id.type_id == first.type_id)
                .then_some(first.type_id),
        };
        let storage = if let Some(type_id) = single_type {
            let ids = PersistentBitTreeLongMap::new();
            let mut write = ids.begin_write();
            for id in &collected {
                write.put(id.local_id, ());
            }
            let committed = write.end_write();
            debug_assert!(committed);
            CachedStorage::SingleType { type_id, ids }
        } else {
            collected.sort_unstable();
            collected.dedup();
            CachedStorage::Mixed {
                ids: collected.into(),
            }
        };
        Self { handle, storage }
    }

    /// The structural identity this result was computed for.
    #[must_use]
    pub fn handle(&self) -> &IterableHandle {
        &self.handle
    }

    /// Result size.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.storage {
            CachedStorage::SingleType { ids, .. } => ids.size(),
            CachedStorage::Mixed { ids } => ids.len(),
        }
    }

    /// Returns `true` for an empty result.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Membership check against the current version.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        match &self.storage {
            CachedStorage::SingleType { type_id, ids } => {
                *type_id == id.type_id && ids.begin_read().contains_key(id.local_id)
            }
            CachedStorage::Mixed { ids } => ids.binary_search(&id).is_ok(),
        }
    }

    /// Iterates the result in ascending id order without touching a
    /// cursor.
    #[must_use]
    pub fn iter(&self) -> CachedIterator {
        let state = match &self.storage {
            CachedStorage::SingleType { type_id, ids } => CachedIteratorState::SingleType {
                snapshot: ids.begin_read(),
                type_id: *type_id,
                next_from: i64::MIN,
                exhausted: false,
            },
            CachedStorage::Mixed { ids } => CachedIteratorState::Mixed {
                ids: ids.clone(),
                position: 0,
            },
        };
        CachedIterator { state }
    }

    /// Whether this instance supports in-place incremental update.
    #[must_use]
    pub fn is_updatable(&self) -> bool {
        matches!(self.storage, CachedStorage::SingleType { .. })
    }

    /// Opens the incremental update protocol. `None` for frozen mixed
    /// results, which must be invalidated instead.
    #[must_use]
    pub fn begin_update(&self) -> Option<CachedUpdate<'_>> {
        match &self.storage {
            CachedStorage::SingleType { type_id, ids } => Some(CachedUpdate {
                type_id: *type_id,
                write: ids.begin_write(),
            }),
            CachedStorage::Mixed { .. } => None,
        }
    }
}

impl std::fmt::Debug for CachedIterable {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CachedIterable")
            .field("handle", &self.handle)
            .field("len", &self.len())
            .field("updatable", &self.is_updatable())
            .finish()
    }
}

fn handle_type(handle: &IterableHandle) -> Option<i32> {
    match handle {
        IterableHandle::EntitiesOfType { type_id }
        | IterableHandle::EntitiesOfRange { type_id, .. }
        | IterableHandle::EntitiesWithLink { type_id, .. }
        | IterableHandle::EntityToLinks { type_id, .. }
        | IterableHandle::PropertyValue { type_id, .. }
        | IterableHandle::PropertyRange { type_id, .. }
        | IterableHandle::EntitiesWithProperty { type_id, .. } => Some(*type_id),
        _ => None,
    }
}

enum CachedIteratorState {
    SingleType {
        snapshot: ImmutableBitTreeMap<()>,
        type_id: i32,
        next_from: i64,
        exhausted: bool,
    },
    Mixed {
        ids: Arc<[EntityId]>,
        position: usize,
    },
}

/// Iterator over a [`CachedIterable`] snapshot.
pub struct CachedIterator {
    state: CachedIteratorState,
}

impl Iterator for CachedIterator {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        match &mut self.state {
            CachedIteratorState::SingleType {
                snapshot,
                type_id,
                next_from,
                exhausted,
            } => {
                if *exhausted {
                    return None;
                }
                match snapshot.tail_iter(*next_from).next() {
                    Some((local_id, _)) => {
                        match local_id.checked_add(1) {
                            Some(from) => *next_from = from,
                            None => *exhausted = true,
                        }
                        Some(EntityId::new(*type_id, local_id))
                    }
                    None => {
                        *exhausted = true;
                        None
                    }
                }
            }
            CachedIteratorState::Mixed { ids, position } => {
                let id = ids.get(*position).copied()?;
                *position += 1;
                Some(id)
            }
        }
    }
}

impl EntityIterator for CachedIterator {
    fn dispose(&mut self) {}
}

/// In-flight incremental update of a single-type cached instance.
///
/// Changes land in a private copy-on-write view;
/// [`end_update`](Self::end_update) commits with the same
/// compare-and-swap discipline as the raw persistent structures, and
/// the caller retries from a fresh [`CachedIterable::begin_update`] on
/// a lost race.
pub struct CachedUpdate<'c> {
    type_id: i32,
    write: MutableBitTreeMap<'c, ()>,
}

impl CachedUpdate<'_> {
    /// Records `id` as added. Ids of a foreign type are ignored.
    pub fn add_entity(&mut self, id: EntityId) -> bool {
        if id.type_id != self.type_id {
            return false;
        }
        self.write.put(id.local_id, ());
        true
    }

    /// Records `id` as removed. Unknown ids are a no-op.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        id.type_id == self.type_id && self.write.remove(id.local_id).is_some()
    }

    /// Commits the patch. `false` means a concurrent update won.
    #[must_use]
    pub fn end_update(self) -> bool {
        self.write.end_write()
    }
}

#[cfg(test)]
mod tests {
    use super::super::handle::IterableHandle;
    use super::CachedIterable;
    use super::super::entity_id::EntityId;
    use rstest::rstest;

    #[rstest]
    fn test_single_type_round_trip_and_update() {
        let handle = IterableHandle::EntitiesOfType { type_id: 0 };
        let mut source = [1_i64, 3, 5].into_iter().map(|local| EntityId::new(0, local));
        let instance = CachedIterable::from_iterator(handle, &mut source);
        assert!(instance.is_updatable());
        assert_eq!(instance.len(), 3);

        let mut update = instance.begin_update().unwrap();
        assert!(update.add_entity(EntityId::new(0, 4)));
        assert!(update.remove_entity(EntityId::new(0, 1)));
        assert!(!update.add_entity(EntityId::new(9, 4)));
        assert!(update.end_update());

        let ids: Vec<i64> = instance.iter().map(|id| id.local_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[rstest]
    fn test_mixed_result_is_sorted_and_frozen() {
        let handle = IterableHandle::Distinct {
            source: Box::new(IterableHandle::EntitiesOfType { type_id: 0 }),
        };
        let mut source = [
            EntityId::new(1, 2),
            EntityId::new(0, 9),
            EntityId::new(1, 2),
        ]
        .into_iter();
        let instance = CachedIterable::from_iterator(handle, &mut source);
        assert!(!instance.is_updatable());
        assert!(instance.begin_update().is_none());
        let ids: Vec<EntityId> = instance.iter().collect();
        assert_eq!(ids, vec![EntityId::new(0, 9), EntityId::new(1, 2)]);
        assert!(instance.contains(EntityId::new(1, 2)));
    }
}
