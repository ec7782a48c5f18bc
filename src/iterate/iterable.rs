//! Lazy entity sequences.

use super::entity_id::EntityId;
use super::handle::IterableHandle;
use super::store::StoreTransaction;

/// A single-pass stream of entity ids.
///
/// On top of `Iterator`, a stream owns the cursors it opened and must
/// release them through [`dispose`](EntityIterator::dispose), which is
/// idempotent and also runs on drop. A decorator disposing several
/// cursors must close every one even if closing an earlier one failed.
pub trait EntityIterator: Iterator<Item = EntityId> {
    /// Releases owned cursors. Safe to call repeatedly; iteration after
    /// disposal yields nothing.
    fn dispose(&mut self);
}

/// A lazy, restartable description of an entity query.
///
/// An iterable is cheap to construct: it only captures parameters and
/// exposes them as a structural [`IterableHandle`]. Pulling a fresh
/// iterator with [`iter`](EntityIterable::iter) is what touches
/// cursors. Iterables whose results are stable snapshots report
/// [`can_be_cached`](EntityIterable::can_be_cached) so the transaction
/// can materialize them once and serve repeats from the cache.
pub trait EntityIterable: Send + Sync {
    /// Opens a fresh iterator over the current snapshot.
    fn iter<'t>(&self, txn: &StoreTransaction<'t>) -> Box<dyn EntityIterator + 't>;

    /// Structural identity of this query.
    fn handle(&self) -> IterableHandle;

    /// Whether [`iter`](EntityIterable::iter) yields strictly ascending
    /// entity ids. Source iterables walk byte-ordered indexes and
    /// always do; decorators that flatten or concatenate report
    /// `false`, and the sorted-merge operations pick a fallback
    /// strategy off this flag.
    fn is_sorted_by_id(&self) -> bool {
        true
    }

    /// Whether materializing this result into the transaction's cache
    /// is worthwhile and sound. The cache stores ascending id sets, so
    /// anything order- or multiplicity-sensitive must stay out of it.
    fn can_be_cached(&self, txn: &StoreTransaction<'_>) -> bool {
        let _ = txn;
        self.is_sorted_by_id()
    }

    /// Result size, by cached size or by a counting scan.
    fn count(&self, txn: &StoreTransaction<'_>) -> usize {
        if let Some(instance) = txn.cached(&self.handle()) {
            return instance.len();
        }
        let mut iterator = self.iter(txn);
        let counted = iterator.by_ref().count();
        iterator.dispose();
        counted
    }
}

/// An iterator over nothing, used where a search miss makes the whole
/// sequence empty.
pub struct EmptyIterator;

impl Iterator for EmptyIterator {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        None
    }
}

impl EntityIterator for EmptyIterator {
    fn dispose(&mut self) {}
}
