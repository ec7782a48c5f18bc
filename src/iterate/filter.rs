//! Link base filtered through another iterable.

use std::sync::Arc;

use tracing::debug;

use super::binary::IntersectionIterable;
use super::entity_id::{EntityId, EntityIdSet};
use super::handle::IterableHandle;
use super::iterable::{EntityIterable, EntityIterator};
use super::store::StoreTransaction;

/// Restricts a link iterable to the ids produced by a filter iterable.
///
/// The filter is materialized into an [`EntityIdSet`] first, so the
/// base streams through an O(1) membership test. Filters are typically
/// small; for ones that are not, a materialization limit diverts the
/// query into a plain sorted-merge intersection instead.
pub struct FilterLinksIterable {
    base: Arc<dyn EntityIterable>,
    filter: Arc<dyn EntityIterable>,
    materialization_limit: Option<usize>,
}

impl FilterLinksIterable {
    /// Filters `base` through `filter` with unbounded materialization.
    #[must_use]
    pub fn new(base: Arc<dyn EntityIterable>, filter: Arc<dyn EntityIterable>) -> Self {
        Self {
            base,
            filter,
            materialization_limit: None,
        }
    }

    /// Caps how many filter ids are materialized before falling back
    /// to a merge intersection.
    #[must_use]
    pub fn with_materialization_limit(mut self, limit: usize) -> Self {
        self.materialization_limit = Some(limit);
        self
    }
}

impl EntityIterable for FilterLinksIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        let mut filter = self.filter.iter(txn);
        let mut members = EntityIdSet::new();
        // The merge fallback needs both inputs ascending; without that
        // the filter is materialized in full regardless of the limit.
        let limit = if self.base.is_sorted_by_id() && self.filter.is_sorted_by_id() {
            self.materialization_limit.unwrap_or(usize::MAX)
        } else {
            usize::MAX
        };
        let mut overflowed = false;
        for id in filter.by_ref() {
            if members.len() >= limit {
                overflowed = true;
                break;
            }
            members.add(id);
        }
        filter.dispose();
        if overflowed {
            debug!(limit, "filter exceeded materialization limit, merging instead");
            return IntersectionIterable::merge(
                self.base.iter(txn),
                self.filter.iter(txn),
            );
        }
        Box::new(FilterLinksIterator {
            base: self.base.iter(txn),
            members,
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::FilterLinks {
            base: Box::new(self.base.handle()),
            filter: Box::new(self.filter.handle()),
        }
    }

    /// Membership filtering keeps the base order.
    fn is_sorted_by_id(&self) -> bool {
        self.base.is_sorted_by_id()
    }

    /// Not worth caching while the filter side is already served from
    /// the cache: the filtered result would just duplicate it.
    fn can_be_cached(&self, txn: &StoreTransaction<'_>) -> bool {
        self.is_sorted_by_id() && txn.cached(&self.filter.handle()).is_none()
    }
}

struct FilterLinksIterator<'t> {
    base: Box<dyn EntityIterator + 't>,
    members: EntityIdSet,
}

impl Iterator for FilterLinksIterator<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        loop {
            let id = self.base.next()?;
            if self.members.contains(id) {
                return Some(id);
            }
        }
    }
}

impl EntityIterator for FilterLinksIterator<'_> {
    fn dispose(&mut self) {
        self.base.dispose();
    }
}
