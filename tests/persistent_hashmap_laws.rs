//! Property-based tests for PersistentHashMap and PersistentHashSet.

use evergreen::persistent::{PersistentHashMap, PersistentHashSet};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

// =============================================================================
// Strategies for Generating Test Data
// =============================================================================

/// A mixed edit script: `Ok((key, value))` puts, `Err(key)` removes.
fn edit_script(max_len: usize) -> impl Strategy<Value = Vec<Result<(u16, i32), u16>>> {
    prop::collection::vec(
        prop_oneof![
            (any::<u16>(), any::<i32>()).prop_map(Ok),
            any::<u16>().prop_map(Err),
        ],
        0..max_len,
    )
}

// =============================================================================
// Map Model Laws
// =============================================================================

proptest! {
    /// Law: after any edit script, the map agrees with a `HashMap`
    /// model entry for entry.
    #[test]
    fn prop_map_matches_hashmap_model(script in edit_script(64)) {
        let mut model: HashMap<u16, i32> = HashMap::new();
        let map = PersistentHashMap::new();
        let mut write = map.begin_write();
        for edit in script {
            match edit {
                Ok((key, value)) => {
                    prop_assert_eq!(write.put(key, value), model.insert(key, value));
                }
                Err(key) => {
                    prop_assert_eq!(write.remove(&key), model.remove(&key));
                }
            }
        }
        prop_assert!(write.end_write());

        let snapshot = map.begin_read();
        prop_assert_eq!(snapshot.len(), model.len());
        for (key, value) in &model {
            prop_assert_eq!(snapshot.get(key), Some(value));
        }
        for (key, value) in snapshot.iter() {
            prop_assert_eq!(model.get(key), Some(value));
        }
    }

    /// Law: a snapshot taken before an edit script never observes it.
    #[test]
    fn prop_snapshot_isolation(
        initial in prop::collection::hash_map(any::<u16>(), any::<i32>(), 0..32),
        script in edit_script(32)
    ) {
        let map = PersistentHashMap::new();
        let mut write = map.begin_write();
        for (key, value) in &initial {
            write.put(*key, *value);
        }
        prop_assert!(write.end_write());

        let frozen = map.begin_read();
        let mut write = map.begin_write();
        for edit in script {
            match edit {
                Ok((key, value)) => {
                    write.put(key, value);
                }
                Err(key) => {
                    write.remove(&key);
                }
            }
        }
        prop_assert!(write.end_write());

        prop_assert_eq!(frozen.len(), initial.len());
        for (key, value) in &initial {
            prop_assert_eq!(frozen.get(key), Some(value));
        }
    }
}

// =============================================================================
// Set Model Laws
// =============================================================================

proptest! {
    /// Law: the set agrees with a `HashSet` model after any script of
    /// adds and removes.
    #[test]
    fn prop_set_matches_hashset_model(
        script in prop::collection::vec(
            prop_oneof![any::<u16>().prop_map(Ok), any::<u16>().prop_map(Err)],
            0..64
        )
    ) {
        let mut model: HashSet<u16> = HashSet::new();
        let set = PersistentHashSet::new();
        let mut write = set.begin_write();
        for edit in script {
            match edit {
                Ok(element) => prop_assert_eq!(write.add(element), model.insert(element)),
                Err(element) => prop_assert_eq!(write.remove(&element), model.remove(&element)),
            }
        }
        prop_assert!(write.end_write());

        let snapshot = set.begin_read();
        prop_assert_eq!(snapshot.len(), model.len());
        for element in &model {
            prop_assert!(snapshot.contains(element));
        }
        let held: HashSet<u16> = snapshot.iter().copied().collect();
        prop_assert_eq!(held, model);
    }
}
