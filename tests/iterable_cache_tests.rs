//! Tests for the query-result cache: materialization, incremental
//! patching of single-type results, and event-driven invalidation.

use std::sync::Arc;

use evergreen::iterate::{
    CachedIterable, ConcatIterable, EntitiesOfRangeIterable, EntitiesOfTypeIterable, EntityId,
    EntityIterable, EntityStore, IntersectionIterable, IterableHandle, MemoryEntityStore,
    MinusIterable, PropertyValue, PropertyValueIterable, SelectManyIterable, UnionIterable,
};
use rstest::rstest;

const ISSUE: i32 = 0;
const BOARD: i32 = 1;
const PROP_NAME: i32 = 1;
const LINK_ON_BOARD: i32 = 10;

fn store_with_issues(count: i64) -> (EntityStore<MemoryEntityStore>, Vec<EntityId>) {
    let store = EntityStore::new(MemoryEntityStore::new(), 64);
    let issues = (0..count).map(|_| store.source().new_entity(ISSUE)).collect();
    (store, issues)
}

// =============================================================================
// Materialization Tests
// =============================================================================

#[rstest]
fn test_iterate_materializes_once() {
    let (store, issues) = store_with_issues(3);
    let all = EntitiesOfTypeIterable::new(ISSUE);
    assert_eq!(store.cached_results(), 0);

    let first: Vec<EntityId> = store.begin_transaction().iterate(&all).collect();
    assert_eq!(first, issues);
    assert_eq!(store.cached_results(), 1);

    // The second run is served from the cached instance; the count
    // stays put and the contents match.
    let second: Vec<EntityId> = store.begin_transaction().iterate(&all).collect();
    assert_eq!(second, issues);
    assert_eq!(store.cached_results(), 1);
}

#[rstest]
fn test_distinct_handles_get_distinct_cache_slots() {
    let (store, _) = store_with_issues(2);
    store.source().new_entity(BOARD);

    let txn = store.begin_transaction();
    let _: Vec<EntityId> = txn.iterate(&EntitiesOfTypeIterable::new(ISSUE)).collect();
    let _: Vec<EntityId> = txn.iterate(&EntitiesOfTypeIterable::new(BOARD)).collect();
    assert_eq!(store.cached_results(), 2);

    let cached = txn.cached(&IterableHandle::EntitiesOfType { type_id: ISSUE });
    assert_eq!(cached.map(|instance| instance.len()), Some(2));
    assert!(
        txn.cached(&IterableHandle::EntitiesOfType { type_id: 99 })
            .is_none()
    );
}

#[rstest]
fn test_cached_count_avoids_iteration() {
    let (store, _) = store_with_issues(5);
    let all = EntitiesOfTypeIterable::new(ISSUE);
    let txn = store.begin_transaction();
    let _: Vec<EntityId> = txn.iterate(&all).collect();
    assert_eq!(all.count(&txn), 5);
}

#[rstest]
fn test_order_sensitive_queries_bypass_the_cache() {
    let (store, issues) = store_with_issues(3);
    let boards: Vec<EntityId> = (0..2).map(|_| store.source().new_entity(BOARD)).collect();
    store.source().add_link(issues[0], LINK_ON_BOARD, boards[0]);
    store.source().add_link(issues[1], LINK_ON_BOARD, boards[0]);
    store.source().add_link(issues[1], LINK_ON_BOARD, boards[1]);
    store.source().add_link(issues[2], LINK_ON_BOARD, boards[0]);

    // Flattened link targets repeat and arrive in source order; the
    // cache holds deduplicated ascending sets, so these queries must
    // never be served from it.
    let per_issue =
        SelectManyIterable::new(Arc::new(EntitiesOfTypeIterable::new(ISSUE)), LINK_ON_BOARD);
    let txn = store.begin_transaction();
    let expected = vec![boards[0], boards[0], boards[1], boards[0]];
    assert_eq!(per_issue.iter(&txn).collect::<Vec<_>>(), expected);
    assert_eq!(txn.iterate(&per_issue).collect::<Vec<_>>(), expected);
    assert_eq!(store.cached_results(), 0);

    // Same for concatenation, which keeps duplicates across its halves.
    let stacked = ConcatIterable::new(
        Arc::new(EntitiesOfTypeIterable::new(ISSUE)),
        Arc::new(EntitiesOfTypeIterable::new(ISSUE)),
    );
    let doubled: Vec<EntityId> = txn.iterate(&stacked).collect();
    assert_eq!(doubled.len(), issues.len() * 2);
    assert_eq!(store.cached_results(), 0);
}

// =============================================================================
// Incremental Update Tests
// =============================================================================

#[rstest]
fn test_entity_added_patches_cached_single_type_result() {
    let (store, mut issues) = store_with_issues(2);
    let all = EntitiesOfTypeIterable::new(ISSUE);
    let _: Vec<EntityId> = store.begin_transaction().iterate(&all).collect();

    let added = store.source().new_entity(ISSUE);
    store.on_entity_added(added);
    issues.push(added);

    // Still one cached instance, now carrying the new id.
    assert_eq!(store.cached_results(), 1);
    let txn = store.begin_transaction();
    assert_eq!(txn.iterate(&all).collect::<Vec<_>>(), issues);
    // Equivalent to a fresh scan.
    assert_eq!(all.iter(&txn).collect::<Vec<_>>(), issues);
}

#[rstest]
fn test_entity_removed_patches_cached_single_type_result() {
    let (store, issues) = store_with_issues(3);
    let all = EntitiesOfTypeIterable::new(ISSUE);
    let _: Vec<EntityId> = store.begin_transaction().iterate(&all).collect();

    store.source().delete_entity(issues[1]);
    store.on_entity_removed(issues[1]);

    assert_eq!(store.cached_results(), 1);
    let survivors: Vec<EntityId> = store.begin_transaction().iterate(&all).collect();
    assert_eq!(survivors, vec![issues[0], issues[2]]);
}

#[rstest]
fn test_foreign_type_change_leaves_cached_result_alone() {
    let (store, issues) = store_with_issues(2);
    let all = EntitiesOfTypeIterable::new(ISSUE);
    let _: Vec<EntityId> = store.begin_transaction().iterate(&all).collect();

    let board = store.source().new_entity(BOARD);
    store.on_entity_added(board);

    assert_eq!(store.cached_results(), 1);
    assert_eq!(
        store.begin_transaction().iterate(&all).collect::<Vec<_>>(),
        issues
    );
}

#[rstest]
fn test_entity_added_drops_mixed_cached_result() {
    let (store, _) = store_with_issues(2);
    store.source().new_entity(BOARD);

    // A union across types materializes as a frozen mixed result.
    let both = UnionIterable::new(
        Arc::new(EntitiesOfTypeIterable::new(ISSUE)),
        Arc::new(EntitiesOfTypeIterable::new(BOARD)),
    );
    let before: Vec<EntityId> = store.begin_transaction().iterate(&both).collect();
    assert_eq!(store.cached_results(), 1);

    let added = store.source().new_entity(ISSUE);
    store.on_entity_added(added);
    assert_eq!(store.cached_results(), 0);

    // The next run re-materializes with the new entity present.
    let after: Vec<EntityId> = store.begin_transaction().iterate(&both).collect();
    assert_eq!(after.len(), before.len() + 1);
    assert!(after.contains(&added));
}

#[rstest]
fn test_entity_added_outside_range_drops_cached_intersection() {
    let (store, issues) = store_with_issues(3);
    let narrowed = IntersectionIterable::new(
        Arc::new(EntitiesOfTypeIterable::new(ISSUE)),
        Arc::new(EntitiesOfRangeIterable::new(ISSUE, 1, 2)),
    );
    let before: Vec<EntityId> = store.begin_transaction().iterate(&narrowed).collect();
    assert_eq!(before, vec![issues[0], issues[1]]);
    assert_eq!(store.cached_results(), 1);

    // The new id is of the intersected type but falls outside the
    // range, so it must not show up; the composite result cannot be
    // patched in place and gets dropped instead.
    let outside = store.source().new_entity(ISSUE);
    store.on_entity_added(outside);
    assert_eq!(store.cached_results(), 0);

    let txn = store.begin_transaction();
    let after: Vec<EntityId> = txn.iterate(&narrowed).collect();
    assert_eq!(after, narrowed.iter(&txn).collect::<Vec<_>>());
    assert_eq!(after, vec![issues[0], issues[1]]);
}

#[rstest]
fn test_entity_removed_drops_cached_minus() {
    let (store, issues) = store_with_issues(3);
    let trimmed = MinusIterable::new(
        Arc::new(EntitiesOfTypeIterable::new(ISSUE)),
        Arc::new(EntitiesOfRangeIterable::new(ISSUE, 2, 2)),
    );
    let before: Vec<EntityId> = store.begin_transaction().iterate(&trimmed).collect();
    assert_eq!(before, vec![issues[0], issues[2]]);
    assert_eq!(store.cached_results(), 1);

    store.source().delete_entity(issues[0]);
    store.on_entity_removed(issues[0]);
    assert_eq!(store.cached_results(), 0);

    let txn = store.begin_transaction();
    let after: Vec<EntityId> = txn.iterate(&trimmed).collect();
    assert_eq!(after, trimmed.iter(&txn).collect::<Vec<_>>());
    assert_eq!(after, vec![issues[2]]);
}

#[rstest]
fn test_entity_added_patches_cached_range_result() {
    let (store, mut issues) = store_with_issues(3);
    let head = EntitiesOfRangeIterable::new(ISSUE, 1, 100);
    let tail = EntitiesOfRangeIterable::new(ISSUE, 1, 2);
    let txn = store.begin_transaction();
    let _: Vec<EntityId> = txn.iterate(&head).collect();
    let _: Vec<EntityId> = txn.iterate(&tail).collect();
    assert_eq!(store.cached_results(), 2);

    // A range scan decides membership by the id alone: the covering
    // range is patched in place, the non-covering one is untouched.
    let added = store.source().new_entity(ISSUE);
    store.on_entity_added(added);
    issues.push(added);
    assert_eq!(store.cached_results(), 2);

    let txn = store.begin_transaction();
    assert_eq!(txn.iterate(&head).collect::<Vec<_>>(), issues);
    assert_eq!(
        txn.iterate(&tail).collect::<Vec<_>>(),
        vec![issues[0], issues[1]]
    );
}

// =============================================================================
// Invalidation Tests
// =============================================================================

#[rstest]
fn test_property_change_invalidates_property_queries_only() {
    let (store, issues) = store_with_issues(2);
    store
        .source()
        .set_property(issues[0], PROP_NAME, PropertyValue::String("a".to_string()));

    let by_name =
        PropertyValueIterable::new(ISSUE, PROP_NAME, PropertyValue::String("a".to_string()));
    let all = EntitiesOfTypeIterable::new(ISSUE);
    let txn = store.begin_transaction();
    let _: Vec<EntityId> = txn.iterate(&by_name).collect();
    let _: Vec<EntityId> = txn.iterate(&all).collect();
    assert_eq!(store.cached_results(), 2);

    store
        .source()
        .set_property(issues[1], PROP_NAME, PropertyValue::String("a".to_string()));
    store.on_property_changed(ISSUE, PROP_NAME);

    // The property query is gone, the type scan survives.
    let txn = store.begin_transaction();
    assert!(
        txn.cached(&IterableHandle::PropertyValue {
            type_id: ISSUE,
            property_id: PROP_NAME,
            value: PropertyValue::String("a".to_string()),
        })
        .is_none()
    );
    assert_eq!(store.cached_results(), 1);
    assert_eq!(txn.iterate(&by_name).collect::<Vec<_>>(), issues);
}

#[rstest]
fn test_unrelated_property_change_is_ignored() {
    let (store, issues) = store_with_issues(1);
    store
        .source()
        .set_property(issues[0], PROP_NAME, PropertyValue::String("a".to_string()));
    let by_name =
        PropertyValueIterable::new(ISSUE, PROP_NAME, PropertyValue::String("a".to_string()));
    let _: Vec<EntityId> = store.begin_transaction().iterate(&by_name).collect();
    assert_eq!(store.cached_results(), 1);

    store.on_property_changed(ISSUE, PROP_NAME + 1);
    store.on_property_changed(BOARD, PROP_NAME);
    assert_eq!(store.cached_results(), 1);
}

#[rstest]
fn test_link_adjustment_invalidates_link_queries() {
    let (store, issues) = store_with_issues(2);
    let board = store.source().new_entity(BOARD);
    store.source().add_link(issues[0], LINK_ON_BOARD, board);

    let linked = evergreen::iterate::EntitiesWithLinkIterable::new(ISSUE, LINK_ON_BOARD);
    let all = EntitiesOfTypeIterable::new(ISSUE);
    let txn = store.begin_transaction();
    assert_eq!(txn.iterate(&linked).collect::<Vec<_>>(), vec![issues[0]]);
    let _: Vec<EntityId> = txn.iterate(&all).collect();
    assert_eq!(store.cached_results(), 2);

    store.source().add_link(issues[1], LINK_ON_BOARD, board);
    store.on_link_adjusted(ISSUE, LINK_ON_BOARD);
    assert_eq!(store.cached_results(), 1);

    let txn = store.begin_transaction();
    assert_eq!(txn.iterate(&linked).collect::<Vec<_>>(), issues);
}

// =============================================================================
// Cached Instance Tests
// =============================================================================

#[rstest]
fn test_single_type_instance_is_updatable() {
    let handle = IterableHandle::EntitiesOfType { type_id: ISSUE };
    let ids = [EntityId::new(ISSUE, 1), EntityId::new(ISSUE, 2)];
    let instance = CachedIterable::from_iterator(handle, &mut ids.iter().copied());
    assert!(instance.is_updatable());
    assert_eq!(instance.len(), 2);
    assert!(instance.contains(ids[0]));

    let mut update = instance.begin_update().unwrap();
    assert!(update.add_entity(EntityId::new(ISSUE, 5)));
    assert!(update.remove_entity(ids[0]));
    assert!(update.end_update());

    let after: Vec<EntityId> = instance.iter().collect();
    assert_eq!(after, vec![ids[1], EntityId::new(ISSUE, 5)]);
}

#[rstest]
fn test_update_rejects_foreign_type() {
    let handle = IterableHandle::EntitiesOfType { type_id: ISSUE };
    let ids = [EntityId::new(ISSUE, 1)];
    let instance = CachedIterable::from_iterator(handle, &mut ids.iter().copied());

    let mut update = instance.begin_update().unwrap();
    assert!(!update.add_entity(EntityId::new(BOARD, 1)));
    assert!(!update.remove_entity(EntityId::new(BOARD, 1)));
    assert!(update.end_update());
    assert_eq!(instance.len(), 1);
}

#[rstest]
fn test_empty_single_type_result_stays_updatable() {
    let handle = IterableHandle::EntitiesOfType { type_id: ISSUE };
    let instance = CachedIterable::from_iterator(handle, &mut std::iter::empty());
    assert!(instance.is_empty());
    assert!(instance.is_updatable());

    let mut update = instance.begin_update().unwrap();
    assert!(update.add_entity(EntityId::new(ISSUE, 1)));
    assert!(update.end_update());
    assert_eq!(instance.len(), 1);
}

#[rstest]
fn test_mixed_instance_is_frozen() {
    let handle = IterableHandle::Union {
        left: Box::new(IterableHandle::EntitiesOfType { type_id: ISSUE }),
        right: Box::new(IterableHandle::EntitiesOfType { type_id: BOARD }),
    };
    let ids = [
        EntityId::new(BOARD, 1),
        EntityId::new(ISSUE, 2),
        EntityId::new(ISSUE, 2),
        EntityId::new(ISSUE, 1),
    ];
    let instance = CachedIterable::from_iterator(handle, &mut ids.iter().copied());
    assert!(!instance.is_updatable());
    assert!(instance.begin_update().is_none());

    // Mixed results are sorted and deduplicated on materialization.
    let held: Vec<EntityId> = instance.iter().collect();
    assert_eq!(
        held,
        vec![
            EntityId::new(ISSUE, 1),
            EntityId::new(ISSUE, 2),
            EntityId::new(BOARD, 1),
        ]
    );
}
