//! Flattening and duplicate-suppressing decorators.

use std::sync::Arc;

use super::entity_id::{EntityId, EntityIdSet};
use super::handle::IterableHandle;
use super::iterable::{EntityIterable, EntityIterator};
use super::links::LinkTargetsIterator;
use super::store::StoreTransaction;

/// Suppresses repeats lazily, preserving first-seen order.
///
/// The seen set grows with the distinct count only, so memory stays
/// bounded by the result size rather than the traversal size.
pub struct DistinctIterable {
    source: Arc<dyn EntityIterable>,
}

impl DistinctIterable {
    /// Decorates `source` with duplicate suppression.
    #[must_use]
    pub fn new(source: Arc<dyn EntityIterable>) -> Self {
        Self { source }
    }
}

impl EntityIterable for DistinctIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        Box::new(DistinctIterator {
            source: self.source.iter(txn),
            seen: EntityIdSet::new(),
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::Distinct {
            source: Box::new(self.source.handle()),
        }
    }

    /// Suppression keeps the source order, so the output ascends
    /// exactly when the source does.
    fn is_sorted_by_id(&self) -> bool {
        self.source.is_sorted_by_id()
    }
}

pub(crate) struct DistinctIterator<'t> {
    source: Box<dyn EntityIterator + 't>,
    seen: EntityIdSet,
}

impl<'t> DistinctIterator<'t> {
    pub(crate) fn new(source: Box<dyn EntityIterator + 't>) -> Self {
        Self {
            source,
            seen: EntityIdSet::new(),
        }
    }
}

impl Iterator for DistinctIterator<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        loop {
            let id = self.source.next()?;
            if self.seen.add(id) {
                return Some(id);
            }
        }
    }
}

impl EntityIterator for DistinctIterator<'_> {
    fn dispose(&mut self) {
        self.source.dispose();
    }
}

/// Streams every `link_id` target of every source entity, duplicates
/// preserved (the full multiset of the one-to-many traversal).
///
/// One auxiliary forward link cursor is opened per source entity; the
/// decorator owns it and closes it independent of the base iterator's
/// lifecycle.
pub struct SelectManyIterable {
    source: Arc<dyn EntityIterable>,
    link_id: i32,
}

impl SelectManyIterable {
    /// Decorates `source` with `link_id` target flattening.
    #[must_use]
    pub fn new(source: Arc<dyn EntityIterable>, link_id: i32) -> Self {
        Self { source, link_id }
    }
}

impl EntityIterable for SelectManyIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        Box::new(SelectManyIterator {
            txn: *txn,
            source: self.source.iter(txn),
            link_id: self.link_id,
            targets: None,
            seen: None,
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::SelectMany {
            source: Box::new(self.source.handle()),
            link_id: self.link_id,
        }
    }

    /// Targets come out grouped per source entity, not globally
    /// ascending, and repeats are part of the result.
    fn is_sorted_by_id(&self) -> bool {
        false
    }
}

/// [`SelectManyIterable`] with lazy suppression of already-yielded
/// targets.
pub struct SelectDistinctIterable {
    source: Arc<dyn EntityIterable>,
    link_id: i32,
}

impl SelectDistinctIterable {
    /// Decorates `source` with distinct `link_id` target flattening.
    #[must_use]
    pub fn new(source: Arc<dyn EntityIterable>, link_id: i32) -> Self {
        Self { source, link_id }
    }
}

impl EntityIterable for SelectDistinctIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        Box::new(SelectManyIterator {
            txn: *txn,
            source: self.source.iter(txn),
            link_id: self.link_id,
            targets: None,
            seen: Some(EntityIdSet::new()),
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::SelectDistinct {
            source: Box::new(self.source.handle()),
            link_id: self.link_id,
        }
    }

    /// First-seen target order, not ascending id order.
    fn is_sorted_by_id(&self) -> bool {
        false
    }
}

struct SelectManyIterator<'t> {
    txn: StoreTransaction<'t>,
    source: Box<dyn EntityIterator + 't>,
    link_id: i32,
    targets: Option<LinkTargetsIterator>,
    /// `Some` in the distinct variant.
    seen: Option<EntityIdSet>,
}

impl Iterator for SelectManyIterator<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        loop {
            if let Some(targets) = self.targets.as_mut() {
                if let Some(target) = targets.next() {
                    if let Some(seen) = self.seen.as_mut() {
                        if !seen.add(target) {
                            continue;
                        }
                    }
                    return Some(target);
                }
                if let Some(mut exhausted) = self.targets.take() {
                    exhausted.close();
                }
            }
            let source = self.source.next()?;
            self.targets = Some(LinkTargetsIterator::open(&self.txn, source, self.link_id));
        }
    }
}

impl EntityIterator for SelectManyIterator<'_> {
    fn dispose(&mut self) {
        if let Some(mut targets) = self.targets.take() {
            targets.close();
        }
        self.source.dispose();
    }
}
