//! Entity identity.

use std::fmt;

use crate::persistent::hamt::HamtMap;

/// Identifier of one entity: the numeric entity type plus the local id
/// within that type.
///
/// Ordering is by type first, then local id, which is the order every
/// sorted iterable in this module yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    /// Numeric entity type.
    pub type_id: i32,
    /// Identifier within the type, assigned ascending.
    pub local_id: i64,
}

impl EntityId {
    /// Creates an id from its two components.
    #[must_use]
    pub const fn new(type_id: i32, local_id: i64) -> Self {
        Self { type_id, local_id }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}-{}", self.type_id, self.local_id)
    }
}

/// Membership set of entity ids backed by the persistent hash trie.
///
/// Used by the distinct and filter decorators: memory stays bounded by
/// the distinct count, and adding is copy-on-write so a snapshot taken
/// mid-stream stays valid.
pub struct EntityIdSet {
    set: HamtMap<EntityId, ()>,
}

impl Default for EntityIdSet {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityIdSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { set: HamtMap::new() }
    }

    /// Adds `id`, returning `true` when it was not present before.
    pub fn add(&mut self, id: EntityId) -> bool {
        let (next, previous) = self.set.insert(id, ());
        self.set = next;
        previous.is_none()
    }

    /// Returns `true` if `id` is a member.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.set.contains_key(&id)
    }

    /// Member count.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns `true` if the set has no members.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

impl Clone for EntityIdSet {
    fn clone(&self) -> Self {
        Self {
            set: self.set.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityId, EntityIdSet};
    use rstest::rstest;

    #[rstest]
    fn test_ordering_is_type_then_local() {
        let mut ids = vec![
            EntityId::new(1, 5),
            EntityId::new(0, 9),
            EntityId::new(1, 2),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                EntityId::new(0, 9),
                EntityId::new(1, 2),
                EntityId::new(1, 5),
            ]
        );
    }

    #[rstest]
    fn test_set_membership() {
        let mut set = EntityIdSet::new();
        assert!(set.add(EntityId::new(0, 1)));
        assert!(!set.add(EntityId::new(0, 1)));
        assert!(set.contains(EntityId::new(0, 1)));
        assert!(!set.contains(EntityId::new(0, 2)));
        assert_eq!(set.len(), 1);
    }
}
