//! Unit tests for PersistentHashMap.

use evergreen::persistent::PersistentHashMap;
use rstest::rstest;

// =============================================================================
// Basic Construction Tests
// =============================================================================

#[rstest]
fn test_new_map_is_empty() {
    let map: PersistentHashMap<String, i32> = PersistentHashMap::new();
    assert_eq!(map.size(), 0);
    assert!(map.begin_read().is_empty());
}

// =============================================================================
// Put and Get Tests
// =============================================================================

#[rstest]
fn test_put_and_get() {
    let map = PersistentHashMap::new();
    let mut write = map.begin_write();
    assert_eq!(write.put("one".to_string(), 1), None);
    assert_eq!(write.put("two".to_string(), 2), None);
    assert!(write.end_write());

    let snapshot = map.begin_read();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get("one"), Some(&1));
    assert_eq!(snapshot.get("two"), Some(&2));
    assert_eq!(snapshot.get("three"), None);
}

#[rstest]
fn test_put_replaces_and_returns_previous() {
    let map = PersistentHashMap::new();
    let mut write = map.begin_write();
    assert_eq!(write.put("key".to_string(), 1), None);
    assert_eq!(write.put("key".to_string(), 2), Some(1));
    assert!(write.end_write());
    assert_eq!(map.size(), 1);
    assert_eq!(map.begin_read().get("key"), Some(&2));
}

#[rstest]
fn test_remove_returns_value() {
    let map = PersistentHashMap::new();
    let mut write = map.begin_write();
    write.put("key".to_string(), 1);
    assert_eq!(write.remove("key"), Some(1));
    assert_eq!(write.remove("key"), None);
    assert!(write.end_write());
    assert!(map.begin_read().is_empty());
}

// =============================================================================
// Snapshot Isolation Tests
// =============================================================================

#[rstest]
fn test_snapshot_unaffected_by_later_commit() {
    let map = PersistentHashMap::new();
    let mut write = map.begin_write();
    write.put(1, "a");
    assert!(write.end_write());

    let before = map.begin_read();
    let mut write = map.begin_write();
    write.put(1, "b");
    write.put(2, "c");
    assert!(write.end_write());

    assert_eq!(before.get(&1), Some(&"a"));
    assert!(!before.contains_key(&2));
    assert_eq!(map.begin_read().get(&1), Some(&"b"));
}

#[rstest]
fn test_conflicting_writer_fails() {
    let map = PersistentHashMap::new();
    let mut first = map.begin_write();
    let mut second = map.begin_write();
    first.put(1, 1);
    second.put(2, 2);
    assert!(first.end_write());
    assert!(!second.end_write());
    assert_eq!(map.size(), 1);
}

// =============================================================================
// Collision and Scale Tests
// =============================================================================

#[rstest]
fn test_many_keys_survive_round_trip() {
    let map = PersistentHashMap::new();
    let mut write = map.begin_write();
    for key in 0..2000u64 {
        write.put(key, key * 2);
    }
    assert!(write.end_write());

    let snapshot = map.begin_read();
    assert_eq!(snapshot.len(), 2000);
    for key in 0..2000u64 {
        assert_eq!(snapshot.get(&key), Some(&(key * 2)));
    }
}

#[rstest]
fn test_iteration_visits_every_entry_once() {
    let map = PersistentHashMap::new();
    let mut write = map.begin_write();
    for key in 0..100u64 {
        write.put(key, ());
    }
    assert!(write.end_write());

    let snapshot = map.begin_read();
    let mut seen: Vec<u64> = snapshot.iter().map(|(key, _)| *key).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..100).collect::<Vec<_>>());
}
