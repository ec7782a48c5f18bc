//! Property-indexed iteration.
//!
//! The property index is keyed by the order-preserving value encoding
//! with one duplicate per entity holding that value, so walking keys in
//! byte order walks values in [`PropertyValue`] order, and duplicates
//! come out ascending by local id.

use super::binding::{PropertyValue, decode_long};
use super::cursor::Cursor;
use super::entity_id::EntityId;
use super::handle::IterableHandle;
use super::iterable::{EntityIterable, EntityIterator};
use super::store::StoreTransaction;

/// Entities of one type whose property equals a value, ascending by
/// local id.
#[derive(Debug, Clone)]
pub struct PropertyValueIterable {
    type_id: i32,
    property_id: i32,
    value: PropertyValue,
}

impl PropertyValueIterable {
    /// Creates the equality query `property_id == value` over
    /// `type_id` entities.
    #[must_use]
    pub const fn new(type_id: i32, property_id: i32, value: PropertyValue) -> Self {
        Self {
            type_id,
            property_id,
            value,
        }
    }
}

impl EntityIterable for PropertyValueIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        let mut cursor = txn.property_index(self.type_id, self.property_id);
        let matched = cursor.get_search_key(&self.value.to_key_bytes());
        Box::new(PropertyIndexIterator {
            cursor: Some(cursor),
            type_id: self.type_id,
            upper: None,
            pending: matched,
            single_key: true,
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::PropertyValue {
            type_id: self.type_id,
            property_id: self.property_id,
            value: self.value.clone(),
        }
    }
}

/// Entities of one type whose property lies in an inclusive value
/// range, ascending by value then local id.
#[derive(Debug, Clone)]
pub struct PropertyRangeIterable {
    type_id: i32,
    property_id: i32,
    min: PropertyValue,
    max: PropertyValue,
}

impl PropertyRangeIterable {
    /// Creates the range query `min <= property_id <= max` over
    /// `type_id` entities.
    #[must_use]
    pub const fn new(type_id: i32, property_id: i32, min: PropertyValue, max: PropertyValue) -> Self {
        Self {
            type_id,
            property_id,
            min,
            max,
        }
    }
}

impl EntityIterable for PropertyRangeIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        let mut cursor = txn.property_index(self.type_id, self.property_id);
        let matched = cursor.get_search_key_range(&self.min.to_key_bytes());
        Box::new(PropertyIndexIterator {
            cursor: Some(cursor),
            type_id: self.type_id,
            upper: Some(self.max.to_key_bytes()),
            pending: matched,
            single_key: false,
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::PropertyRange {
            type_id: self.type_id,
            property_id: self.property_id,
            min: self.min.clone(),
            max: self.max.clone(),
        }
    }
}

/// Entities of one type that have a property set at all, ascending by
/// value then local id.
#[derive(Debug, Clone, Copy)]
pub struct EntitiesWithPropertyIterable {
    type_id: i32,
    property_id: i32,
}

impl EntitiesWithPropertyIterable {
    /// Creates the "has `property_id`" query over `type_id` entities.
    #[must_use]
    pub const fn new(type_id: i32, property_id: i32) -> Self {
        Self {
            type_id,
            property_id,
        }
    }
}

impl EntityIterable for EntitiesWithPropertyIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        let mut cursor = txn.property_index(self.type_id, self.property_id);
        let matched = cursor.next();
        Box::new(PropertyIndexIterator {
            cursor: Some(cursor),
            type_id: self.type_id,
            upper: None,
            pending: matched,
            single_key: false,
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::EntitiesWithProperty {
            type_id: self.type_id,
            property_id: self.property_id,
        }
    }
}

/// Walks a property index cursor: one key's duplicates, or every key
/// up to an optional inclusive upper bound.
struct PropertyIndexIterator {
    cursor: Option<Box<dyn Cursor>>,
    type_id: i32,
    upper: Option<Vec<u8>>,
    pending: bool,
    single_key: bool,
}

impl Iterator for PropertyIndexIterator {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let cursor = self.cursor.as_mut()?;
        let positioned = if self.pending {
            self.pending = false;
            true
        } else if self.single_key {
            cursor.next_dup()
        } else {
            cursor.next()
        };
        if !positioned {
            self.dispose();
            return None;
        }
        if let Some(upper) = &self.upper {
            if self.cursor.as_ref()?.key() > upper.as_slice() {
                self.dispose();
                return None;
            }
        }
        let decoded = decode_long(self.cursor.as_ref()?.value());
        let Some(local_id) = decoded else {
            self.dispose();
            return None;
        };
        Some(EntityId::new(self.type_id, local_id))
    }
}

impl EntityIterator for PropertyIndexIterator {
    fn dispose(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }
}

impl Drop for PropertyIndexIterator {
    fn drop(&mut self) {
        self.dispose();
    }
}
