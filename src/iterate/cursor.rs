//! Positional access into an ordered dup-multimap index.
//!
//! This is the engine's only boundary with the storage layer: every
//! iterable consumes indexes exclusively through [`Cursor`]. Keys and
//! values are byte sequences; key order is byte order, which the
//! `binding` encodings make coincide with value order.

/// A positional handle into one index.
///
/// A fresh cursor is unpositioned; every navigation method returns
/// `true` when the cursor lands on an entry and `false` when it ran off
/// the index (leaving it unpositioned). A search miss is a `false`, not
/// an error. `key`/`value` return empty slices while unpositioned.
///
/// One cursor is owned by exactly one iterator at a time; the owner is
/// responsible for [`close`](Cursor::close), which is idempotent.
pub trait Cursor {
    /// Moves to the next entry: the next duplicate of the current key,
    /// or the first duplicate of the next key. From the unpositioned
    /// state, moves to the first entry.
    fn next(&mut self) -> bool;

    /// Moves to the previous entry, mirroring [`next`](Cursor::next).
    fn prev(&mut self) -> bool;

    /// Moves to the next duplicate of the current key only.
    fn next_dup(&mut self) -> bool;

    /// Moves to the previous duplicate of the current key only.
    fn prev_dup(&mut self) -> bool;

    /// Moves to the first duplicate of the next distinct key.
    fn next_no_dup(&mut self) -> bool;

    /// Moves to the last duplicate of the previous distinct key.
    fn prev_no_dup(&mut self) -> bool;

    /// Positions at the first duplicate of exactly `key`.
    fn get_search_key(&mut self, key: &[u8]) -> bool;

    /// Positions at the first entry whose key is `>= key`.
    fn get_search_key_range(&mut self, key: &[u8]) -> bool;

    /// Positions at the last entry of the index.
    fn last(&mut self) -> bool;

    /// Current key, empty while unpositioned.
    fn key(&self) -> &[u8];

    /// Current value, empty while unpositioned.
    fn value(&self) -> &[u8];

    /// Releases the cursor. Safe to call repeatedly; a closed cursor
    /// answers every navigation with `false`.
    fn close(&mut self);
}
