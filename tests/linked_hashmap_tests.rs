//! Unit tests for PersistentLinkedHashMap: stamp ordering, touch
//! behaviour, and bounded eviction.

use evergreen::persistent::PersistentLinkedHashMap;
use rstest::rstest;
use std::sync::Arc;

// =============================================================================
// Basic Operation Tests
// =============================================================================

#[rstest]
fn test_put_get_remove() {
    let map = PersistentLinkedHashMap::new();
    let mut write = map.begin_write();
    write.put("a", 1);
    write.put("b", 2);
    assert_eq!(write.get_no_touch(&"a"), Some(&1));
    assert_eq!(write.remove(&"a"), Some(1));
    assert_eq!(write.remove(&"a"), None);
    assert!(write.end_write());

    let snapshot = map.begin_read();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get(&"b"), Some(&2));
    assert!(!snapshot.contains_key(&"a"));
}

#[rstest]
fn test_iteration_follows_insertion_order() {
    let map = PersistentLinkedHashMap::new();
    let mut write = map.begin_write();
    for (key, value) in [("c", 3), ("a", 1), ("b", 2)] {
        write.put(key, value);
    }
    assert!(write.end_write());

    let snapshot = map.begin_read();
    let order: Vec<&str> = snapshot.iter().map(|(key, _)| *key).collect();
    assert_eq!(order, vec!["c", "a", "b"]);
    assert_eq!(snapshot.eldest(), Some((&"c", &3)));
}

#[rstest]
fn test_reinsert_moves_entry_to_youngest() {
    let map = PersistentLinkedHashMap::new();
    let mut write = map.begin_write();
    write.put("a", 1);
    write.put("b", 2);
    write.put("a", 10);
    assert!(write.end_write());

    let snapshot = map.begin_read();
    let order: Vec<&str> = snapshot.iter().map(|(key, _)| *key).collect();
    assert_eq!(order, vec!["b", "a"]);
    assert_eq!(snapshot.get(&"a"), Some(&10));
}

// =============================================================================
// Touch Tests
// =============================================================================

#[rstest]
fn test_get_restamps_lagging_entry() {
    let map = PersistentLinkedHashMap::new();
    let mut write = map.begin_write();
    for key in 0..8 {
        write.put(key, ());
    }
    // Key 0 lags by far more than half the map; a touched get moves it
    // to the youngest position.
    assert_eq!(write.get(&0), Some(&()));
    assert!(write.end_write());

    let snapshot = map.begin_read();
    let order: Vec<i32> = snapshot.iter().map(|(key, _)| *key).collect();
    assert_eq!(order, vec![1, 2, 3, 4, 5, 6, 7, 0]);
}

#[rstest]
fn test_get_leaves_recent_entry_in_place() {
    let map = PersistentLinkedHashMap::new();
    let mut write = map.begin_write();
    for key in 0..8 {
        write.put(key, ());
    }
    // The youngest entry never lags, so a get does not reorder.
    assert_eq!(write.get(&7), Some(&()));
    assert!(write.end_write());

    let snapshot = map.begin_read();
    let order: Vec<i32> = snapshot.iter().map(|(key, _)| *key).collect();
    assert_eq!(order, (0..8).collect::<Vec<_>>());
}

// =============================================================================
// Eviction Tests
// =============================================================================

#[rstest]
fn test_eviction_keeps_most_recent_entries() {
    let map = PersistentLinkedHashMap::with_eviction(Arc::new(|len, _, _| len > 3));
    let mut write = map.begin_write();
    for key in 0..10 {
        write.put(key, ());
    }
    assert!(write.end_write());

    let snapshot = map.begin_read();
    assert_eq!(snapshot.len(), 3);
    let order: Vec<i32> = snapshot.iter().map(|(key, _)| *key).collect();
    assert_eq!(order, vec![7, 8, 9]);
}

#[rstest]
fn test_eviction_spares_touched_entry() {
    let map = PersistentLinkedHashMap::with_eviction(Arc::new(|len, _, _| len > 4));
    let mut write = map.begin_write();
    for key in 0..4 {
        write.put(key, ());
    }
    // Touching 0 moves it past 1..3, so the next puts evict those
    // instead of it.
    assert_eq!(write.get(&0), Some(&()));
    write.put(4, ());
    write.put(5, ());
    assert!(write.end_write());

    let snapshot = map.begin_read();
    assert!(snapshot.contains_key(&0));
    assert!(!snapshot.contains_key(&1));
    assert!(!snapshot.contains_key(&2));
}

#[rstest]
fn test_eviction_is_capped_per_put() {
    // A predicate that always holds cannot loop forever; one put stops
    // after the internal cap.
    let map = PersistentLinkedHashMap::with_eviction(Arc::new(|_, _, _| true));
    let mut write = map.begin_write();
    for key in 0..100 {
        write.put(key, ());
    }
    assert!(write.end_write());
    // Each put evicts at most the cap, so the map stays small but is
    // never driven negative or wedged.
    assert!(map.size() <= 100);
}

// =============================================================================
// Commit Tests
// =============================================================================

#[rstest]
fn test_conflicting_writer_fails() {
    let map = PersistentLinkedHashMap::new();
    let mut first = map.begin_write();
    let mut second = map.begin_write();
    first.put(1, ());
    second.put(2, ());
    assert!(first.end_write());
    assert!(!second.end_write());
    assert_eq!(map.size(), 1);
}
