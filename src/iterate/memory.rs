//! In-memory reference backend.
//!
//! [`MemoryEntityStore`] keeps every index as a sorted dup-multimap
//! behind an `Arc`, so an open cursor holds a frozen snapshot while
//! later mutations clone-on-write the affected index. It implements
//! [`StoreSource`] and is what the engine's tests (and any embedder
//! without a real storage backend) run against.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::binding::{
    PropertyValue, encode_entity_id, encode_long, link_key, reverse_link_key,
};
use super::cursor::Cursor;
use super::entity_id::EntityId;
use super::store::StoreSource;

type Index = BTreeMap<Vec<u8>, Vec<Vec<u8>>>;
type IndexSnapshot = Arc<Index>;

fn insert_dup(index: &mut IndexSnapshot, key: Vec<u8>, value: Vec<u8>) {
    let index = Arc::make_mut(index);
    let duplicates = index.entry(key).or_default();
    if let Err(position) = duplicates.binary_search(&value) {
        duplicates.insert(position, value);
    }
}

fn remove_dup(index: &mut IndexSnapshot, key: &[u8], value: &[u8]) -> bool {
    let index = Arc::make_mut(index);
    let Some(duplicates) = index.get_mut(key) else {
        return false;
    };
    let Ok(position) = duplicates.binary_search_by(|dup| dup.as_slice().cmp(value)) else {
        return false;
    };
    duplicates.remove(position);
    if duplicates.is_empty() {
        index.remove(key);
    }
    true
}

// ============================================================
// Cursor
// ============================================================

enum CursorState {
    Unpositioned,
    Positioned { key: Vec<u8>, dup: usize },
    Closed,
}

/// Cursor over one frozen index snapshot.
pub struct MemoryCursor {
    index: IndexSnapshot,
    state: CursorState,
}

impl MemoryCursor {
    fn new(index: IndexSnapshot) -> Self {
        Self {
            index,
            state: CursorState::Unpositioned,
        }
    }

    fn duplicates(&self, key: &[u8]) -> usize {
        self.index.get(key).map_or(0, Vec::len)
    }

    fn position_first_dup(&mut self, key: Vec<u8>) -> bool {
        self.state = CursorState::Positioned { key, dup: 0 };
        true
    }

    fn position_last_dup(&mut self, key: Vec<u8>) -> bool {
        let dup = self.duplicates(&key).saturating_sub(1);
        self.state = CursorState::Positioned { key, dup };
        true
    }

    fn following_key(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.index
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(next, _)| next.clone())
    }

    fn preceding_key(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.index
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
            .next_back()
            .map(|(previous, _)| previous.clone())
    }
}

impl Cursor for MemoryCursor {
    fn next(&mut self) -> bool {
        match &self.state {
            CursorState::Closed => false,
            CursorState::Unpositioned => match self.index.keys().next().cloned() {
                Some(first) => self.position_first_dup(first),
                None => false,
            },
            CursorState::Positioned { key, dup } => {
                if dup + 1 < self.duplicates(key) {
                    let key = key.clone();
                    let dup = dup + 1;
                    self.state = CursorState::Positioned { key, dup };
                    true
                } else {
                    match self.following_key(&key.clone()) {
                        Some(next) => self.position_first_dup(next),
                        None => {
                            self.state = CursorState::Unpositioned;
                            false
                        }
                    }
                }
            }
        }
    }

    fn prev(&mut self) -> bool {
        match &self.state {
            CursorState::Closed | CursorState::Unpositioned => false,
            CursorState::Positioned { key, dup } => {
                if *dup > 0 {
                    let key = key.clone();
                    let dup = dup - 1;
                    self.state = CursorState::Positioned { key, dup };
                    true
                } else {
                    match self.preceding_key(&key.clone()) {
                        Some(previous) => self.position_last_dup(previous),
                        None => {
                            self.state = CursorState::Unpositioned;
                            false
                        }
                    }
                }
            }
        }
    }

    fn next_dup(&mut self) -> bool {
        match &self.state {
            CursorState::Positioned { key, dup } if dup + 1 < self.duplicates(key) => {
                let key = key.clone();
                let dup = dup + 1;
                self.state = CursorState::Positioned { key, dup };
                true
            }
            _ => false,
        }
    }

    fn prev_dup(&mut self) -> bool {
        match &self.state {
            CursorState::Positioned { key, dup } if *dup > 0 => {
                let key = key.clone();
                let dup = dup - 1;
                self.state = CursorState::Positioned { key, dup };
                true
            }
            _ => false,
        }
    }

    fn next_no_dup(&mut self) -> bool {
        match &self.state {
            CursorState::Closed => false,
            CursorState::Unpositioned => self.next(),
            CursorState::Positioned { key, .. } => match self.following_key(&key.clone()) {
                Some(next) => self.position_first_dup(next),
                None => {
                    self.state = CursorState::Unpositioned;
                    false
                }
            },
        }
    }

    fn prev_no_dup(&mut self) -> bool {
        match &self.state {
            CursorState::Closed | CursorState::Unpositioned => false,
            CursorState::Positioned { key, .. } => match self.preceding_key(&key.clone()) {
                Some(previous) => self.position_last_dup(previous),
                None => {
                    self.state = CursorState::Unpositioned;
                    false
                }
            },
        }
    }

    fn get_search_key(&mut self, key: &[u8]) -> bool {
        if matches!(self.state, CursorState::Closed) {
            return false;
        }
        if self.index.contains_key(key) {
            self.position_first_dup(key.to_vec())
        } else {
            self.state = CursorState::Unpositioned;
            false
        }
    }

    fn get_search_key_range(&mut self, key: &[u8]) -> bool {
        if matches!(self.state, CursorState::Closed) {
            return false;
        }
        match self
            .index
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next()
            .map(|(found, _)| found.clone())
        {
            Some(found) => self.position_first_dup(found),
            None => {
                self.state = CursorState::Unpositioned;
                false
            }
        }
    }

    fn last(&mut self) -> bool {
        if matches!(self.state, CursorState::Closed) {
            return false;
        }
        match self.index.keys().next_back().cloned() {
            Some(last) => self.position_last_dup(last),
            None => {
                self.state = CursorState::Unpositioned;
                false
            }
        }
    }

    fn key(&self) -> &[u8] {
        match &self.state {
            CursorState::Positioned { key, .. } => key,
            _ => &[],
        }
    }

    fn value(&self) -> &[u8] {
        match &self.state {
            CursorState::Positioned { key, dup } => self
                .index
                .get(key)
                .and_then(|duplicates| duplicates.get(*dup))
                .map_or(&[][..], Vec::as_slice),
            _ => &[],
        }
    }

    fn close(&mut self) {
        self.state = CursorState::Closed;
    }
}

// ============================================================
// Store
// ============================================================

#[derive(Default)]
struct StoreState {
    next_local_id: FxHashMap<i32, i64>,
    entities: FxHashMap<i32, IndexSnapshot>,
    properties: FxHashMap<(i32, i32), IndexSnapshot>,
    links: FxHashMap<i32, IndexSnapshot>,
    reverse_links: FxHashMap<i32, IndexSnapshot>,
    property_values: FxHashMap<(EntityId, i32), PropertyValue>,
    link_records: Vec<(EntityId, i32, EntityId)>,
}

fn snapshot<K: std::hash::Hash + Eq>(
    indexes: &FxHashMap<K, IndexSnapshot>,
    id: &K,
) -> IndexSnapshot {
    indexes
        .get(id)
        .cloned()
        .unwrap_or_else(|| Arc::new(Index::new()))
}

/// Reference [`StoreSource`] keeping all indexes in memory.
#[derive(Default)]
pub struct MemoryEntityStore {
    state: RwLock<StoreState>,
}

impl MemoryEntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an entity of `type_id`, assigning the next local id.
    pub fn new_entity(&self, type_id: i32) -> EntityId {
        let mut state = self.state.write();
        let local_id = {
            let counter = state.next_local_id.entry(type_id).or_insert(1);
            let assigned = *counter;
            *counter += 1;
            assigned
        };
        let index = state.entities.entry(type_id).or_default();
        insert_dup(index, encode_long(local_id), Vec::new());
        EntityId::new(type_id, local_id)
    }

    /// Removes `id` with its properties and links. Returns `false` for
    /// an unknown entity.
    pub fn delete_entity(&self, id: EntityId) -> bool {
        let mut state = self.state.write();
        let Some(index) = state.entities.get_mut(&id.type_id) else {
            return false;
        };
        if !remove_dup(index, &encode_long(id.local_id), &[]) {
            return false;
        }
        let properties: Vec<i32> = state
            .property_values
            .keys()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, property_id)| *property_id)
            .collect();
        for property_id in properties {
            Self::unset_property(&mut state, id, property_id);
        }
        let records: Vec<(EntityId, i32, EntityId)> = state
            .link_records
            .iter()
            .filter(|(source, _, target)| *source == id || *target == id)
            .copied()
            .collect();
        for (source, link_id, target) in records {
            Self::unlink(&mut state, source, link_id, target);
        }
        true
    }

    /// Returns `true` if `id` exists.
    #[must_use]
    pub fn exists(&self, id: EntityId) -> bool {
        let state = self.state.read();
        state
            .entities
            .get(&id.type_id)
            .is_some_and(|index| index.contains_key(&encode_long(id.local_id)))
    }

    /// Sets `property_id` of `id` to `value`, replacing a prior value.
    pub fn set_property(&self, id: EntityId, property_id: i32, value: PropertyValue) {
        let mut state = self.state.write();
        Self::unset_property(&mut state, id, property_id);
        let index = state.properties.entry((id.type_id, property_id)).or_default();
        insert_dup(index, value.to_key_bytes(), encode_long(id.local_id));
        state.property_values.insert((id, property_id), value);
    }

    /// Deletes `property_id` of `id`. Absent properties are a no-op.
    pub fn delete_property(&self, id: EntityId, property_id: i32) -> bool {
        let mut state = self.state.write();
        Self::unset_property(&mut state, id, property_id)
    }

    /// The current value of `property_id` of `id`.
    #[must_use]
    pub fn get_property(&self, id: EntityId, property_id: i32) -> Option<PropertyValue> {
        let state = self.state.read();
        state.property_values.get(&(id, property_id)).cloned()
    }

    /// Adds a `link_id` link from `source` to `target`. Duplicate adds
    /// are a no-op.
    pub fn add_link(&self, source: EntityId, link_id: i32, target: EntityId) {
        let mut state = self.state.write();
        let forward = state.links.entry(source.type_id).or_default();
        insert_dup(
            forward,
            link_key(source.local_id, link_id),
            encode_entity_id(target),
        );
        let reverse = state.reverse_links.entry(source.type_id).or_default();
        insert_dup(
            reverse,
            reverse_link_key(link_id, target),
            encode_long(source.local_id),
        );
        if !state
            .link_records
            .contains(&(source, link_id, target))
        {
            state.link_records.push((source, link_id, target));
        }
    }

    /// Deletes one link. Returns `false` when it did not exist.
    pub fn delete_link(&self, source: EntityId, link_id: i32, target: EntityId) -> bool {
        let mut state = self.state.write();
        Self::unlink(&mut state, source, link_id, target)
    }

    fn unset_property(state: &mut StoreState, id: EntityId, property_id: i32) -> bool {
        let Some(previous) = state.property_values.remove(&(id, property_id)) else {
            return false;
        };
        if let Some(index) = state.properties.get_mut(&(id.type_id, property_id)) {
            remove_dup(index, &previous.to_key_bytes(), &encode_long(id.local_id));
        }
        true
    }

    fn unlink(state: &mut StoreState, source: EntityId, link_id: i32, target: EntityId) -> bool {
        let Some(position) = state
            .link_records
            .iter()
            .position(|record| *record == (source, link_id, target))
        else {
            return false;
        };
        state.link_records.remove(position);
        if let Some(forward) = state.links.get_mut(&source.type_id) {
            remove_dup(
                forward,
                &link_key(source.local_id, link_id),
                &encode_entity_id(target),
            );
        }
        if let Some(reverse) = state.reverse_links.get_mut(&source.type_id) {
            remove_dup(
                reverse,
                &reverse_link_key(link_id, target),
                &encode_long(source.local_id),
            );
        }
        true
    }
}

impl StoreSource for MemoryEntityStore {
    fn entity_index(&self, type_id: i32) -> Box<dyn Cursor> {
        let state = self.state.read();
        Box::new(MemoryCursor::new(snapshot(&state.entities, &type_id)))
    }

    fn property_index(&self, type_id: i32, property_id: i32) -> Box<dyn Cursor> {
        let state = self.state.read();
        Box::new(MemoryCursor::new(snapshot(
            &state.properties,
            &(type_id, property_id),
        )))
    }

    fn link_index(&self, type_id: i32) -> Box<dyn Cursor> {
        let state = self.state.read();
        Box::new(MemoryCursor::new(snapshot(&state.links, &type_id)))
    }

    fn reverse_link_index(&self, type_id: i32) -> Box<dyn Cursor> {
        let state = self.state.read();
        Box::new(MemoryCursor::new(snapshot(&state.reverse_links, &type_id)))
    }

    fn entity_exists(&self, id: EntityId) -> bool {
        self.exists(id)
    }
}

impl std::fmt::Debug for MemoryEntityStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        formatter
            .debug_struct("MemoryEntityStore")
            .field("types", &state.entities.len())
            .field("links", &state.link_records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::binding::{decode_long, encode_long};
    use super::super::store::StoreSource;
    use super::{MemoryEntityStore, PropertyValue};
    use rstest::rstest;

    #[rstest]
    fn test_entity_index_is_snapshot() {
        let store = MemoryEntityStore::new();
        let first = store.new_entity(0);
        let mut cursor = store.entity_index(0);
        store.new_entity(0);
        let mut seen = Vec::new();
        while cursor.next() {
            seen.push(decode_long(cursor.key()).unwrap());
        }
        assert_eq!(seen, vec![first.local_id]);
        let mut fresh = store.entity_index(0);
        let mut count = 0;
        while fresh.next() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[rstest]
    fn test_search_miss_is_unpositioned() {
        let store = MemoryEntityStore::new();
        store.new_entity(0);
        let mut cursor = store.entity_index(0);
        assert!(!cursor.get_search_key(&encode_long(42)));
        assert!(cursor.key().is_empty());
        assert!(cursor.get_search_key_range(&encode_long(0)));
    }

    #[rstest]
    fn test_duplicate_navigation() {
        let store = MemoryEntityStore::new();
        let issue = store.new_entity(0);
        let board1 = store.new_entity(1);
        let board2 = store.new_entity(1);
        store.add_link(issue, 7, board1);
        store.add_link(issue, 7, board2);

        let mut cursor = store.link_index(0);
        assert!(cursor.next());
        assert!(cursor.next_dup());
        assert!(!cursor.next_dup());
        assert!(cursor.prev_dup());
        assert!(!cursor.prev_dup());
        cursor.close();
        cursor.close();
        assert!(!cursor.next());
    }

    #[rstest]
    fn test_delete_entity_cleans_indexes() {
        let store = MemoryEntityStore::new();
        let issue = store.new_entity(0);
        let board = store.new_entity(1);
        store.set_property(issue, 3, PropertyValue::String("issue1".into()));
        store.add_link(issue, 7, board);
        assert!(store.delete_entity(issue));
        assert!(!store.exists(issue));
        let mut properties = store.property_index(0, 3);
        assert!(!properties.next());
        let mut links = store.link_index(0);
        assert!(!links.next());
    }
}
