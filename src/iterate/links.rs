//! Link-driven iteration.

use super::binding::{decode_entity_id, decode_link_key, decode_long, reverse_link_key};
use super::cursor::Cursor;
use super::entity_id::EntityId;
use super::handle::IterableHandle;
use super::iterable::{EntityIterable, EntityIterator};
use super::store::StoreTransaction;

/// Entities of one type having at least one outgoing link of a given
/// id, ascending by local id.
///
/// The link index is keyed `(source local id, link id)` with one
/// duplicate per target, so the walk skips duplicate targets with
/// `next_no_dup` and filters on the decoded link component. A source
/// matches at most one key for the wanted link, so sources come out
/// deduplicated and ascending.
#[derive(Debug, Clone, Copy)]
pub struct EntitiesWithLinkIterable {
    type_id: i32,
    link_id: i32,
}

impl EntitiesWithLinkIterable {
    /// Creates the iterable for `type_id` entities having `link_id`.
    #[must_use]
    pub const fn new(type_id: i32, link_id: i32) -> Self {
        Self { type_id, link_id }
    }
}

impl EntityIterable for EntitiesWithLinkIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        Box::new(LinkIndexIterator {
            cursor: Some(txn.link_index(self.type_id)),
            type_id: self.type_id,
            link_id: self.link_id,
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::EntitiesWithLink {
            type_id: self.type_id,
            link_id: self.link_id,
        }
    }
}

struct LinkIndexIterator {
    cursor: Option<Box<dyn Cursor>>,
    type_id: i32,
    link_id: i32,
}

impl Iterator for LinkIndexIterator {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        loop {
            let cursor = self.cursor.as_mut()?;
            if !cursor.next_no_dup() {
                self.dispose();
                return None;
            }
            if let Some((source, link)) = decode_link_key(cursor.key()) {
                if link == self.link_id {
                    return Some(EntityId::new(self.type_id, source));
                }
            }
        }
    }
}

impl EntityIterator for LinkIndexIterator {
    fn dispose(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }
}

impl Drop for LinkIndexIterator {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Entities of one type linking to a given target via a given link,
/// ascending by local id.
///
/// Seeks the reverse index at `(link id, target)` and walks the
/// duplicates, each a linking source's local id.
#[derive(Debug, Clone, Copy)]
pub struct EntityToLinksIterable {
    type_id: i32,
    link_id: i32,
    target: EntityId,
}

impl EntityToLinksIterable {
    /// Creates the iterable for `type_id` entities linking to `target`
    /// via `link_id`.
    #[must_use]
    pub const fn new(type_id: i32, link_id: i32, target: EntityId) -> Self {
        Self {
            type_id,
            link_id,
            target,
        }
    }

    /// Opens a descending iterator over the same sources.
    ///
    /// The last duplicate is found by seeking the first key past the
    /// target and stepping back; when no such key exists the index's
    /// last entry is the one.
    pub fn iter_reverse<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        let mut cursor = txn.reverse_link_index(self.type_id);
        let key = reverse_link_key(self.link_id, self.target);
        let mut past = key.clone();
        past.push(0);
        let positioned = if cursor.get_search_key_range(&past) {
            cursor.prev()
        } else {
            cursor.last()
        };
        let matched = positioned && cursor.key() == key.as_slice();
        Box::new(ReverseLinksIterator {
            cursor: Some(cursor),
            type_id: self.type_id,
            pending: matched,
        })
    }
}

impl EntityIterable for EntityToLinksIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        let mut cursor = txn.reverse_link_index(self.type_id);
        let matched = cursor.get_search_key(&reverse_link_key(self.link_id, self.target));
        Box::new(TargetLinksIterator {
            cursor: Some(cursor),
            type_id: self.type_id,
            pending: matched,
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::EntityToLinks {
            type_id: self.type_id,
            link_id: self.link_id,
            target: self.target,
        }
    }
}

struct TargetLinksIterator {
    cursor: Option<Box<dyn Cursor>>,
    type_id: i32,
    /// The seek already positioned on the first duplicate.
    pending: bool,
}

impl Iterator for TargetLinksIterator {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let cursor = self.cursor.as_mut()?;
        let positioned = if self.pending {
            self.pending = false;
            true
        } else {
            cursor.next_dup()
        };
        if !positioned {
            self.dispose();
            return None;
        }
        let decoded = decode_long(self.cursor.as_ref()?.value());
        let Some(local_id) = decoded else {
            self.dispose();
            return None;
        };
        Some(EntityId::new(self.type_id, local_id))
    }
}

impl EntityIterator for TargetLinksIterator {
    fn dispose(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }
}

impl Drop for TargetLinksIterator {
    fn drop(&mut self) {
        self.dispose();
    }
}

struct ReverseLinksIterator {
    cursor: Option<Box<dyn Cursor>>,
    type_id: i32,
    pending: bool,
}

impl Iterator for ReverseLinksIterator {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let cursor = self.cursor.as_mut()?;
        let positioned = if self.pending {
            self.pending = false;
            true
        } else {
            cursor.prev_dup()
        };
        if !positioned {
            self.dispose();
            return None;
        }
        let decoded = decode_long(self.cursor.as_ref()?.value());
        let Some(local_id) = decoded else {
            self.dispose();
            return None;
        };
        Some(EntityId::new(self.type_id, local_id))
    }
}

impl EntityIterator for ReverseLinksIterator {
    fn dispose(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }
}

impl Drop for ReverseLinksIterator {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Current targets of one entity's link, ascending by target id. Used
/// by the select decorators; one instance owns one forward cursor.
pub(crate) struct LinkTargetsIterator {
    cursor: Option<Box<dyn Cursor>>,
    pending: bool,
}

impl LinkTargetsIterator {
    pub(crate) fn open(txn: &StoreTransaction<'_>, source: EntityId, link_id: i32) -> Self {
        let mut cursor = txn.link_index(source.type_id);
        let matched =
            cursor.get_search_key(&super::binding::link_key(source.local_id, link_id));
        Self {
            cursor: Some(cursor),
            pending: matched,
        }
    }

    pub(crate) fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }
}

impl Iterator for LinkTargetsIterator {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let cursor = self.cursor.as_mut()?;
        let positioned = if self.pending {
            self.pending = false;
            true
        } else {
            cursor.next_dup()
        };
        if !positioned {
            self.close();
            return None;
        }
        let decoded = decode_entity_id(self.cursor.as_ref()?.value());
        if decoded.is_none() {
            self.close();
        }
        decoded
    }
}

impl Drop for LinkTargetsIterator {
    fn drop(&mut self) {
        self.close();
    }
}
