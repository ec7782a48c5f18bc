//! Binary set operations over id sequences.
//!
//! Union, intersection and minus merge lazily when both inputs yield
//! ascending ids, which every source iterable in this module does.
//! Over an unsorted input (a concat or flattening decorator) they
//! switch strategy: union concatenates and suppresses repeats lazily,
//! intersection and minus materialize the right side into a membership
//! set and sift the left side through it. Concat makes no ordering
//! assumption and preserves duplicates.

use std::sync::Arc;

use super::entity_id::{EntityId, EntityIdSet};
use super::handle::IterableHandle;
use super::iterable::{EntityIterable, EntityIterator};
use super::select::DistinctIterator;
use super::store::StoreTransaction;

/// Sorted merge of two ascending id sequences; ids present in both
/// appear once.
pub struct UnionIterable {
    left: Arc<dyn EntityIterable>,
    right: Arc<dyn EntityIterable>,
}

impl UnionIterable {
    /// Merges `left` and `right`.
    #[must_use]
    pub fn new(left: Arc<dyn EntityIterable>, right: Arc<dyn EntityIterable>) -> Self {
        Self { left, right }
    }
}

impl EntityIterable for UnionIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        if self.is_sorted_by_id() {
            return Box::new(MergeIterator {
                left: Peeking::new(self.left.iter(txn)),
                right: Peeking::new(self.right.iter(txn)),
                operation: Operation::Union,
            });
        }
        // An unsorted input breaks the merge; concatenate and suppress
        // repeats lazily instead.
        Box::new(DistinctIterator::new(Box::new(ConcatIterator {
            left: Some(self.left.iter(txn)),
            right: Some(self.right.iter(txn)),
        })))
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::Union {
            left: Box::new(self.left.handle()),
            right: Box::new(self.right.handle()),
        }
    }

    fn is_sorted_by_id(&self) -> bool {
        self.left.is_sorted_by_id() && self.right.is_sorted_by_id()
    }
}

/// Ids present in both ascending inputs.
pub struct IntersectionIterable {
    left: Arc<dyn EntityIterable>,
    right: Arc<dyn EntityIterable>,
}

impl IntersectionIterable {
    /// Intersects `left` with `right`.
    #[must_use]
    pub fn new(left: Arc<dyn EntityIterable>, right: Arc<dyn EntityIterable>) -> Self {
        Self { left, right }
    }

    /// Merge-intersects two already-open ascending iterators.
    pub(crate) fn merge<'t>(
        left: Box<dyn EntityIterator + 't>,
        right: Box<dyn EntityIterator + 't>,
    ) -> Box<dyn EntityIterator + 't> {
        Box::new(MergeIterator {
            left: Peeking::new(left),
            right: Peeking::new(right),
            operation: Operation::Intersection,
        })
    }
}

impl EntityIterable for IntersectionIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        if self.left.is_sorted_by_id() && self.right.is_sorted_by_id() {
            return Box::new(MergeIterator {
                left: Peeking::new(self.left.iter(txn)),
                right: Peeking::new(self.right.iter(txn)),
                operation: Operation::Intersection,
            });
        }
        Box::new(SiftIterator::open(
            self.left.iter(txn),
            &self.right,
            txn,
            true,
        ))
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::Intersection {
            left: Box::new(self.left.handle()),
            right: Box::new(self.right.handle()),
        }
    }

    /// Both strategies keep the left input's order.
    fn is_sorted_by_id(&self) -> bool {
        self.left.is_sorted_by_id()
    }
}

/// Ids of the ascending left input absent from the right one.
pub struct MinusIterable {
    left: Arc<dyn EntityIterable>,
    right: Arc<dyn EntityIterable>,
}

impl MinusIterable {
    /// Subtracts `right` from `left`.
    #[must_use]
    pub fn new(left: Arc<dyn EntityIterable>, right: Arc<dyn EntityIterable>) -> Self {
        Self { left, right }
    }
}

impl EntityIterable for MinusIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        if self.left.is_sorted_by_id() && self.right.is_sorted_by_id() {
            return Box::new(MergeIterator {
                left: Peeking::new(self.left.iter(txn)),
                right: Peeking::new(self.right.iter(txn)),
                operation: Operation::Minus,
            });
        }
        Box::new(SiftIterator::open(
            self.left.iter(txn),
            &self.right,
            txn,
            false,
        ))
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::Minus {
            left: Box::new(self.left.handle()),
            right: Box::new(self.right.handle()),
        }
    }

    /// Both strategies keep the left input's order.
    fn is_sorted_by_id(&self) -> bool {
        self.left.is_sorted_by_id()
    }
}

/// Left sequence followed by the right one, duplicates preserved.
pub struct ConcatIterable {
    left: Arc<dyn EntityIterable>,
    right: Arc<dyn EntityIterable>,
}

impl ConcatIterable {
    /// Concatenates `left` and `right`.
    #[must_use]
    pub fn new(left: Arc<dyn EntityIterable>, right: Arc<dyn EntityIterable>) -> Self {
        Self { left, right }
    }
}

impl EntityIterable for ConcatIterable {
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't> {
        Box::new(ConcatIterator {
            left: Some(self.left.iter(txn)),
            right: Some(self.right.iter(txn)),
        })
    }

    fn handle(&self) -> IterableHandle {
        IterableHandle::Concat {
            left: Box::new(self.left.handle()),
            right: Box::new(self.right.handle()),
        }
    }

    /// The right sequence restarts the id order, and duplicates across
    /// the inputs survive.
    fn is_sorted_by_id(&self) -> bool {
        false
    }
}

// ============================================================
// Iterators
// ============================================================

struct Peeking<'t> {
    source: Box<dyn EntityIterator + 't>,
    head: Option<EntityId>,
}

impl<'t> Peeking<'t> {
    fn new(mut source: Box<dyn EntityIterator + 't>) -> Self {
        let head = source.next();
        Self { source, head }
    }

    fn advance(&mut self) -> Option<EntityId> {
        let current = self.head.take();
        self.head = self.source.next();
        current
    }
}

#[derive(Clone, Copy)]
enum Operation {
    Union,
    Intersection,
    Minus,
}

struct MergeIterator<'t> {
    left: Peeking<'t>,
    right: Peeking<'t>,
    operation: Operation,
}

impl Iterator for MergeIterator<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        loop {
            match (self.left.head, self.right.head) {
                (None, None) => return None,
                (Some(_), None) => {
                    return match self.operation {
                        Operation::Union | Operation::Minus => self.left.advance(),
                        Operation::Intersection => None,
                    };
                }
                (None, Some(_)) => {
                    return match self.operation {
                        Operation::Union => self.right.advance(),
                        Operation::Intersection | Operation::Minus => None,
                    };
                }
                (Some(left), Some(right)) => {
                    if left < right {
                        match self.operation {
                            Operation::Union | Operation::Minus => return self.left.advance(),
                            Operation::Intersection => {
                                self.left.advance();
                            }
                        }
                    } else if right < left {
                        match self.operation {
                            Operation::Union => return self.right.advance(),
                            Operation::Intersection | Operation::Minus => {
                                self.right.advance();
                            }
                        }
                    } else {
                        self.right.advance();
                        match self.operation {
                            Operation::Union | Operation::Intersection => {
                                return self.left.advance();
                            }
                            Operation::Minus => {
                                self.left.advance();
                            }
                        }
                    }
                }
            }
        }
    }
}

impl EntityIterator for MergeIterator<'_> {
    fn dispose(&mut self) {
        self.left.source.dispose();
        self.right.source.dispose();
    }
}

/// Streams the left input through a membership test against the fully
/// materialized right input. `keep_members` selects intersection
/// (keep ids present on the right) or minus (keep ids absent). Output
/// ids are unique in left order.
struct SiftIterator<'t> {
    source: Box<dyn EntityIterator + 't>,
    members: EntityIdSet,
    keep_members: bool,
    yielded: EntityIdSet,
}

impl<'t> SiftIterator<'t> {
    fn open(
        source: Box<dyn EntityIterator + 't>,
        right: &Arc<dyn EntityIterable>,
        txn: &StoreTransaction<'t>,
        keep_members: bool,
    ) -> Self {
        let mut right = right.iter(txn);
        let mut members = EntityIdSet::new();
        for id in right.by_ref() {
            members.add(id);
        }
        right.dispose();
        Self {
            source,
            members,
            keep_members,
            yielded: EntityIdSet::new(),
        }
    }
}

impl Iterator for SiftIterator<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        loop {
            let id = self.source.next()?;
            if self.members.contains(id) == self.keep_members && self.yielded.add(id) {
                return Some(id);
            }
        }
    }
}

impl EntityIterator for SiftIterator<'_> {
    fn dispose(&mut self) {
        self.source.dispose();
    }
}

struct ConcatIterator<'t> {
    left: Option<Box<dyn EntityIterator + 't>>,
    right: Option<Box<dyn EntityIterator + 't>>,
}

impl Iterator for ConcatIterator<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        if let Some(left) = self.left.as_mut() {
            if let Some(id) = left.next() {
                return Some(id);
            }
            if let Some(mut finished) = self.left.take() {
                finished.dispose();
            }
        }
        self.right.as_mut()?.next()
    }
}

impl EntityIterator for ConcatIterator<'_> {
    fn dispose(&mut self) {
        if let Some(mut left) = self.left.take() {
            left.dispose();
        }
        if let Some(mut right) = self.right.take() {
            right.dispose();
        }
    }
}
