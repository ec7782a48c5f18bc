//! Per-type entity iteration.

use super::binding::{decode_long, encode_long};
use super::cursor::Cursor;
use super::entity_id::EntityId;
use super::handle::IterableHandle;
use super::iterable::{EntityIterable, EntityIterator};
use super::store::StoreTransaction;

/// All entities of one type, ascending by local id.
#[derive(Debug, Clone, Copy)]
pub struct EntitiesOfTypeIterable {
    type_id: i32,
}

impl EntitiesOfTypeIterable {
    /// Creates the "all entities of `type_id`" iterable.
    #[must_use]
    pub const fn new(type_id: i32) -> Self {
        Self { type_id }
    }
}

impl EntityIterable for EntitiesOfTypeIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        Box::new(EntityIndexIterator {
            cursor: Some(txn.entity_index(self.type_id)),
            type_id: self.type_id,
            min: 0,
            max: i64::MAX,
            started: false,
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::EntitiesOfType {
            type_id: self.type_id,
        }
    }
}

/// Entities of one type within an inclusive local id range.
#[derive(Debug, Clone, Copy)]
pub struct EntitiesOfRangeIterable {
    type_id: i32,
    min: i64,
    max: i64,
}

impl EntitiesOfRangeIterable {
    /// Creates the range iterable over `min..=max` local ids.
    #[must_use]
    pub const fn new(type_id: i32, min: i64, max: i64) -> Self {
        Self { type_id, min, max }
    }
}

impl EntityIterable for EntitiesOfRangeIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        Box::new(EntityIndexIterator {
            cursor: Some(txn.entity_index(self.type_id)),
            type_id: self.type_id,
            min: self.min,
            max: self.max,
            started: false,
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::EntitiesOfRange {
            type_id: self.type_id,
            min: self.min,
            max: self.max,
        }
    }
}

/// Walks an entity index cursor, clipping to a local id range.
struct EntityIndexIterator {
    cursor: Option<Box<dyn Cursor>>,
    type_id: i32,
    min: i64,
    max: i64,
    started: bool,
}

impl Iterator for EntityIndexIterator {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let cursor = self.cursor.as_mut()?;
        let positioned = if self.started {
            cursor.next()
        } else {
            self.started = true;
            cursor.get_search_key_range(&encode_long(self.min))
        };
        if !positioned {
            self.dispose();
            return None;
        }
        let decoded = decode_long(self.cursor.as_ref()?.key());
        let Some(local_id) = decoded else {
            self.dispose();
            return None;
        };
        if local_id > self.max {
            self.dispose();
            return None;
        }
        Some(EntityId::new(self.type_id, local_id))
    }
}

impl EntityIterator for EntityIndexIterator {
    fn dispose(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }
}

impl Drop for EntityIndexIterator {
    fn drop(&mut self) {
        self.dispose();
    }
}
