//! Unit tests for Persistent23Tree: snapshot/write-view lifecycle,
//! optimistic commits, and ordered iteration.

use evergreen::persistent::{ImmutableTree, Persistent23Tree};
use rstest::rstest;

// =============================================================================
// Basic Construction Tests
// =============================================================================

#[rstest]
fn test_new_tree_is_empty() {
    let tree: Persistent23Tree<i32> = Persistent23Tree::new();
    assert_eq!(tree.size(), 0);
    assert!(tree.begin_read().is_empty());
}

#[rstest]
fn test_empty_snapshot_has_no_extremes() {
    let snapshot: ImmutableTree<i32> = ImmutableTree::empty();
    assert_eq!(snapshot.minimum(), None);
    assert_eq!(snapshot.maximum(), None);
    assert_eq!(snapshot.iter().next(), None);
}

// =============================================================================
// Write View Tests
// =============================================================================

#[rstest]
fn test_add_and_commit() {
    let tree = Persistent23Tree::new();
    let mut write = tree.begin_write();
    assert!(write.add(3));
    assert!(write.add(1));
    assert!(write.add(2));
    assert!(write.end_write());

    let snapshot = tree.begin_read();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[rstest]
fn test_add_duplicate_reports_replacement() {
    let tree = Persistent23Tree::new();
    let mut write = tree.begin_write();
    assert!(write.add(7));
    assert!(!write.add(7));
    assert!(write.end_write());
    assert_eq!(tree.size(), 1);
}

#[rstest]
fn test_remove_returns_stored_key() {
    let tree = Persistent23Tree::new();
    let mut write = tree.begin_write();
    for key in 0..10 {
        write.add(key);
    }
    assert_eq!(write.remove(&4), Some(4));
    assert_eq!(write.remove(&4), None);
    assert!(write.end_write());
    assert_eq!(tree.size(), 9);
    assert!(!tree.begin_read().contains(&4));
}

#[rstest]
fn test_uncommitted_write_is_invisible() {
    let tree = Persistent23Tree::new();
    let mut write = tree.begin_write();
    write.add(1);
    assert_eq!(tree.size(), 0);
    assert!(write.end_write());
    assert_eq!(tree.size(), 1);
}

// =============================================================================
// Optimistic Commit Tests
// =============================================================================

#[rstest]
fn test_conflicting_writer_fails_to_commit() {
    let tree = Persistent23Tree::new();
    let mut first = tree.begin_write();
    let mut second = tree.begin_write();
    first.add(1);
    second.add(2);
    assert!(first.end_write());
    assert!(!second.end_write());

    // The loser's change never landed; a retry off the new root works.
    assert_eq!(tree.size(), 1);
    let mut retry = tree.begin_write();
    retry.add(2);
    assert!(retry.end_write());
    assert_eq!(
        tree.begin_read().iter().copied().collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[rstest]
fn test_stale_view_fails_even_without_edits() {
    let tree = Persistent23Tree::new();
    let stale = tree.begin_write();
    let mut other = tree.begin_write();
    other.add(1);
    assert!(other.end_write());
    // The stale view's base root is gone, so its commit is refused.
    assert!(!stale.end_write());
    assert_eq!(tree.size(), 1);
}

// =============================================================================
// Snapshot Isolation Tests
// =============================================================================

#[rstest]
fn test_snapshot_survives_later_commits() {
    let tree = Persistent23Tree::new();
    let mut write = tree.begin_write();
    write.add(1);
    write.add(2);
    assert!(write.end_write());

    let before = tree.begin_read();
    let mut write = tree.begin_write();
    write.add(3);
    write.remove(&1);
    assert!(write.end_write());

    assert_eq!(before.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(
        tree.begin_read().iter().copied().collect::<Vec<_>>(),
        vec![2, 3]
    );
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[rstest]
fn test_reverse_iteration() {
    let tree = Persistent23Tree::new();
    let mut write = tree.begin_write();
    for key in [5, 3, 8, 1, 9] {
        write.add(key);
    }
    assert!(write.end_write());
    assert_eq!(
        tree.begin_read().rev_iter().copied().collect::<Vec<_>>(),
        vec![9, 8, 5, 3, 1]
    );
}

#[rstest]
#[case(0, vec![10, 20, 30])]
#[case(15, vec![20, 30])]
#[case(20, vec![20, 30])]
#[case(31, vec![])]
fn test_tail_iteration_starts_at_bound(#[case] from: i32, #[case] expected: Vec<i32>) {
    let tree = Persistent23Tree::new();
    let mut write = tree.begin_write();
    for key in [10, 20, 30] {
        write.add(key);
    }
    assert!(write.end_write());
    let snapshot = tree.begin_read();
    assert_eq!(
        snapshot.tail_iter(&from).copied().collect::<Vec<_>>(),
        expected
    );
}

#[rstest]
fn test_extremes_track_contents() {
    let tree = Persistent23Tree::new();
    let mut write = tree.begin_write();
    for key in [5, 3, 8] {
        write.add(key);
    }
    assert!(write.end_write());
    let snapshot = tree.begin_read();
    assert_eq!(snapshot.minimum(), Some(&3));
    assert_eq!(snapshot.maximum(), Some(&8));
}

// =============================================================================
// Structural Invariant Tests
// =============================================================================

#[rstest]
fn test_invariants_hold_through_churn() {
    let tree = Persistent23Tree::new();
    let mut write = tree.begin_write();
    for key in 0..256 {
        write.add(key * 37 % 251);
        write.snapshot().check_invariants();
    }
    for key in (0..256).step_by(3) {
        write.remove(&(key * 37 % 251));
        write.snapshot().check_invariants();
    }
    assert!(write.end_write());
    tree.begin_read().check_invariants();
}
