//! Unit tests for the long-keyed map specializations:
//! PersistentLong23TreeMap and PersistentBitTreeLongMap.

use evergreen::persistent::{PersistentBitTreeLongMap, PersistentLong23TreeMap};
use rstest::rstest;

// =============================================================================
// Long 2-3 Tree Map Tests
// =============================================================================

#[rstest]
fn test_long_map_put_get_remove() {
    let map = PersistentLong23TreeMap::new();
    let mut write = map.begin_write();
    write.put(3, "three");
    write.put(1, "one");
    write.put(2, "two");
    assert_eq!(write.remove(2), Some("two"));
    assert_eq!(write.remove(2), None);
    assert!(write.end_write());

    let snapshot = map.begin_read();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get(1), Some(&"one"));
    assert_eq!(snapshot.get(3), Some(&"three"));
    assert!(!snapshot.contains_key(2));
}

#[rstest]
fn test_long_map_put_replaces_value() {
    let map = PersistentLong23TreeMap::new();
    let mut write = map.begin_write();
    write.put(5, 'a');
    write.put(5, 'b');
    assert!(write.end_write());
    assert_eq!(map.size(), 1);
    assert_eq!(map.begin_read().get(5), Some(&'b'));
}

#[rstest]
fn test_long_map_orders_by_key() {
    let map = PersistentLong23TreeMap::new();
    let mut write = map.begin_write();
    for key in [9i64, -4, 0, 100, 7] {
        write.put(key, key * 10);
    }
    assert!(write.end_write());

    let snapshot = map.begin_read();
    let keys: Vec<i64> = snapshot.iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec![-4, 0, 7, 9, 100]);
    assert_eq!(snapshot.minimum(), Some((-4, &-40)));

    let keys: Vec<i64> = snapshot.rev_iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec![100, 9, 7, 0, -4]);
}

#[rstest]
#[case(-10, vec![-4, 0, 7, 9, 100])]
#[case(1, vec![7, 9, 100])]
#[case(7, vec![7, 9, 100])]
#[case(101, vec![])]
fn test_long_map_tail_iteration(#[case] from: i64, #[case] expected: Vec<i64>) {
    let map = PersistentLong23TreeMap::new();
    let mut write = map.begin_write();
    for key in [9i64, -4, 0, 100, 7] {
        write.put(key, ());
    }
    assert!(write.end_write());
    let snapshot = map.begin_read();
    let keys: Vec<i64> = snapshot.tail_iter(from).map(|(key, _)| key).collect();
    assert_eq!(keys, expected);
}

#[rstest]
fn test_long_map_conflicting_writer_fails() {
    let map = PersistentLong23TreeMap::new();
    let mut first = map.begin_write();
    let mut second = map.begin_write();
    first.put(1, ());
    second.put(2, ());
    assert!(first.end_write());
    assert!(!second.end_write());
    assert_eq!(map.size(), 1);
}

// =============================================================================
// Bit Tree Long Map Tests
// =============================================================================

#[rstest]
fn test_bit_map_dense_keys_share_one_bucket() {
    let map = PersistentBitTreeLongMap::new();
    let mut write = map.begin_write();
    for key in 0..1024i64 {
        write.put(key, ());
    }
    assert!(write.end_write());

    let snapshot = map.begin_read();
    assert_eq!(snapshot.len(), 1024);
    let keys: Vec<i64> = snapshot.iter().map(|(key, _)| key).collect();
    assert_eq!(keys, (0..1024).collect::<Vec<_>>());
}

#[rstest]
fn test_bit_map_sparse_and_negative_keys() {
    let map = PersistentBitTreeLongMap::new();
    let mut write = map.begin_write();
    for key in [-5000i64, -1, 0, 1023, 1024, 1_000_000] {
        write.put(key, key);
    }
    assert!(write.end_write());

    let snapshot = map.begin_read();
    assert_eq!(snapshot.minimum(), Some(-5000));
    let keys: Vec<i64> = snapshot.iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec![-5000, -1, 0, 1023, 1024, 1_000_000]);
    for key in keys {
        assert_eq!(snapshot.get(key), Some(&key));
    }
}

#[rstest]
fn test_bit_map_tail_resumes_inside_bucket() {
    let map = PersistentBitTreeLongMap::new();
    let mut write = map.begin_write();
    for key in (0..2048i64).step_by(7) {
        write.put(key, ());
    }
    assert!(write.end_write());

    let snapshot = map.begin_read();
    let keys: Vec<i64> = snapshot.tail_iter(1000).map(|(key, _)| key).collect();
    let expected: Vec<i64> = (0..2048).step_by(7).filter(|key| *key >= 1000).collect();
    assert_eq!(keys, expected);
}

#[rstest]
fn test_bit_map_remove_and_reinsert() {
    let map = PersistentBitTreeLongMap::new();
    let mut write = map.begin_write();
    write.put(10, 'x');
    write.put(2000, 'y');
    assert_eq!(write.remove(10), Some('x'));
    assert_eq!(write.remove(10), None);
    write.put(10, 'z');
    assert!(write.end_write());

    let snapshot = map.begin_read();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get(10), Some(&'z'));
    assert_eq!(snapshot.get(2000), Some(&'y'));
}

#[rstest]
fn test_bit_map_snapshot_isolation() {
    let map = PersistentBitTreeLongMap::new();
    let mut write = map.begin_write();
    write.put(1, ());
    assert!(write.end_write());

    let frozen = map.begin_read();
    let mut write = map.begin_write();
    write.put(2, ());
    write.remove(1);
    assert!(write.end_write());

    assert!(frozen.contains_key(1));
    assert!(!frozen.contains_key(2));
    assert!(map.begin_read().contains_key(2));
}
