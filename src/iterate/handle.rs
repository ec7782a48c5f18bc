//! Structural identity of iterables.
//!
//! Two iterables describing the same query have equal handles, so the
//! handle (via its 64-bit hash) keys the result cache, and its matcher
//! predicates decide which cached instances a data change event can
//! affect.

use std::hash::{DefaultHasher, Hash, Hasher};

use super::binding::PropertyValue;
use super::entity_id::EntityId;

/// Discriminant of a handle, used by the constructor registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IterableKind {
    /// All entities of one type.
    EntitiesOfType,
    /// Entities of one type within a local id range.
    EntitiesOfRange,
    /// Entities of one type having an outgoing link.
    EntitiesWithLink,
    /// Entities linking to a given target.
    EntityToLinks,
    /// Entities whose property equals a value.
    PropertyValue,
    /// Entities whose property falls in a value range.
    PropertyRange,
    /// Entities having a property at all.
    EntitiesWithProperty,
    /// Sorted merge of two id sequences.
    Union,
    /// Sorted intersection of two id sequences.
    Intersection,
    /// Sorted difference of two id sequences.
    Minus,
    /// Sequential concatenation.
    Concat,
    /// Lazy duplicate suppression.
    Distinct,
    /// Per-entity link target flattening.
    SelectMany,
    /// Flattening with duplicate target suppression.
    SelectDistinct,
    /// Link base filtered through another iterable.
    FilterLinks,
}

/// Structural identity of one iterable: its kind plus every parameter
/// that defines the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IterableHandle {
    /// All entities of `type_id`.
    EntitiesOfType {
        /// Entity type.
        type_id: i32,
    },
    /// Entities of `type_id` with `min <= local_id <= max`.
    EntitiesOfRange {
        /// Entity type.
        type_id: i32,
        /// Inclusive lower local id bound.
        min: i64,
        /// Inclusive upper local id bound.
        max: i64,
    },
    /// Entities of `type_id` having an outgoing `link_id` link.
    EntitiesWithLink {
        /// Source entity type.
        type_id: i32,
        /// Link id.
        link_id: i32,
    },
    /// Entities of `type_id` linking to `target` via `link_id`.
    EntityToLinks {
        /// Source entity type.
        type_id: i32,
        /// Link id.
        link_id: i32,
        /// Link target.
        target: EntityId,
    },
    /// Entities of `type_id` whose `property_id` equals `value`.
    PropertyValue {
        /// Entity type.
        type_id: i32,
        /// Property id.
        property_id: i32,
        /// Matched value.
        value: PropertyValue,
    },
    /// Entities of `type_id` whose `property_id` lies in
    /// `[min, max]`.
    PropertyRange {
        /// Entity type.
        type_id: i32,
        /// Property id.
        property_id: i32,
        /// Inclusive lower value bound.
        min: PropertyValue,
        /// Inclusive upper value bound.
        max: PropertyValue,
    },
    /// Entities of `type_id` that have `property_id` set.
    EntitiesWithProperty {
        /// Entity type.
        type_id: i32,
        /// Property id.
        property_id: i32,
    },
    /// Sorted merge of `left` and `right`.
    Union {
        /// Left operand.
        left: Box<IterableHandle>,
        /// Right operand.
        right: Box<IterableHandle>,
    },
    /// Sorted intersection of `left` and `right`.
    Intersection {
        /// Left operand.
        left: Box<IterableHandle>,
        /// Right operand.
        right: Box<IterableHandle>,
    },
    /// Ids of `left` not present in `right`.
    Minus {
        /// Left operand.
        left: Box<IterableHandle>,
        /// Right operand.
        right: Box<IterableHandle>,
    },
    /// `left` followed by `right`, duplicates preserved.
    Concat {
        /// Left operand.
        left: Box<IterableHandle>,
        /// Right operand.
        right: Box<IterableHandle>,
    },
    /// `source` with repeats suppressed.
    Distinct {
        /// Decorated iterable.
        source: Box<IterableHandle>,
    },
    /// Targets of `link_id` for every entity of `source`.
    SelectMany {
        /// Decorated iterable.
        source: Box<IterableHandle>,
        /// Traversed link id.
        link_id: i32,
    },
    /// Distinct targets of `link_id` for every entity of `source`.
    SelectDistinct {
        /// Decorated iterable.
        source: Box<IterableHandle>,
        /// Traversed link id.
        link_id: i32,
    },
    /// `base` (a link iterable) restricted to ids in `filter`.
    FilterLinks {
        /// Streamed base iterable.
        base: Box<IterableHandle>,
        /// Materialized membership filter.
        filter: Box<IterableHandle>,
    },
}

impl IterableHandle {
    /// Discriminant of this handle.
    #[must_use]
    pub const fn kind(&self) -> IterableKind {
        match self {
            Self::EntitiesOfType { .. } => IterableKind::EntitiesOfType,
            Self::EntitiesOfRange { .. } => IterableKind::EntitiesOfRange,
            Self::EntitiesWithLink { .. } => IterableKind::EntitiesWithLink,
            Self::EntityToLinks { .. } => IterableKind::EntityToLinks,
            Self::PropertyValue { .. } => IterableKind::PropertyValue,
            Self::PropertyRange { .. } => IterableKind::PropertyRange,
            Self::EntitiesWithProperty { .. } => IterableKind::EntitiesWithProperty,
            Self::Union { .. } => IterableKind::Union,
            Self::Intersection { .. } => IterableKind::Intersection,
            Self::Minus { .. } => IterableKind::Minus,
            Self::Concat { .. } => IterableKind::Concat,
            Self::Distinct { .. } => IterableKind::Distinct,
            Self::SelectMany { .. } => IterableKind::SelectMany,
            Self::SelectDistinct { .. } => IterableKind::SelectDistinct,
            Self::FilterLinks { .. } => IterableKind::FilterLinks,
        }
    }

    /// Stable-within-a-process 64-bit structural hash, used as the
    /// cache key. Collisions are disambiguated by comparing handles.
    #[must_use]
    pub fn hash64(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Could creating `id` change this iterable's result?
    #[must_use]
    pub fn is_matched_entity_added(&self, id: EntityId) -> bool {
        match self {
            Self::EntitiesOfType { type_id } => *type_id == id.type_id,
            Self::EntitiesOfRange { type_id, min, max } => {
                *type_id == id.type_id && (*min..=*max).contains(&id.local_id)
            }
            // A fresh entity has no links or properties yet.
            Self::EntitiesWithLink { .. }
            | Self::EntityToLinks { .. }
            | Self::PropertyValue { .. }
            | Self::PropertyRange { .. }
            | Self::EntitiesWithProperty { .. } => false,
            Self::Union { left, right }
            | Self::Intersection { left, right }
            | Self::Minus { left, right }
            | Self::Concat { left, right } => {
                left.is_matched_entity_added(id) || right.is_matched_entity_added(id)
            }
            Self::Distinct { source }
            | Self::SelectMany { source, .. }
            | Self::SelectDistinct { source, .. } => source.is_matched_entity_added(id),
            Self::FilterLinks { base, filter } => {
                base.is_matched_entity_added(id) || filter.is_matched_entity_added(id)
            }
        }
    }

    /// Could removing `id` change this iterable's result?
    #[must_use]
    pub fn is_matched_entity_removed(&self, id: EntityId) -> bool {
        match self {
            Self::EntitiesOfType { type_id } => *type_id == id.type_id,
            Self::EntitiesOfRange { type_id, min, max } => {
                *type_id == id.type_id && (*min..=*max).contains(&id.local_id)
            }
            Self::EntitiesWithLink { type_id, .. }
            | Self::PropertyValue { type_id, .. }
            | Self::PropertyRange { type_id, .. }
            | Self::EntitiesWithProperty { type_id, .. } => *type_id == id.type_id,
            Self::EntityToLinks {
                type_id, target, ..
            } => *type_id == id.type_id || *target == id,
            Self::Union { left, right }
            | Self::Intersection { left, right }
            | Self::Minus { left, right }
            | Self::Concat { left, right } => {
                left.is_matched_entity_removed(id) || right.is_matched_entity_removed(id)
            }
            Self::Distinct { source } => source.is_matched_entity_removed(id),
            // Removing any entity can remove link targets.
            Self::SelectMany { .. } | Self::SelectDistinct { .. } => true,
            Self::FilterLinks { base, filter } => {
                base.is_matched_entity_removed(id) || filter.is_matched_entity_removed(id)
            }
        }
    }

    /// Could adding or deleting a `link_id` link on entities of
    /// `type_id` change this iterable's result?
    #[must_use]
    pub fn is_matched_link_adjusted(&self, type_id: i32, link_id: i32) -> bool {
        match self {
            Self::EntitiesOfType { .. }
            | Self::EntitiesOfRange { .. }
            | Self::PropertyValue { .. }
            | Self::PropertyRange { .. }
            | Self::EntitiesWithProperty { .. } => false,
            Self::EntitiesWithLink {
                type_id: own_type,
                link_id: own_link,
            }
            | Self::EntityToLinks {
                type_id: own_type,
                link_id: own_link,
                ..
            } => *own_type == type_id && *own_link == link_id,
            Self::Union { left, right }
            | Self::Intersection { left, right }
            | Self::Minus { left, right }
            | Self::Concat { left, right } => {
                left.is_matched_link_adjusted(type_id, link_id)
                    || right.is_matched_link_adjusted(type_id, link_id)
            }
            Self::Distinct { source } => source.is_matched_link_adjusted(type_id, link_id),
            Self::SelectMany {
                source,
                link_id: own_link,
            }
            | Self::SelectDistinct {
                source,
                link_id: own_link,
            } => *own_link == link_id || source.is_matched_link_adjusted(type_id, link_id),
            Self::FilterLinks { base, filter } => {
                base.is_matched_link_adjusted(type_id, link_id)
                    || filter.is_matched_link_adjusted(type_id, link_id)
            }
        }
    }

    /// Could changing `property_id` on entities of `type_id` change
    /// this iterable's result?
    #[must_use]
    pub fn is_matched_property_changed(&self, type_id: i32, property_id: i32) -> bool {
        match self {
            Self::EntitiesOfType { .. }
            | Self::EntitiesOfRange { .. }
            | Self::EntitiesWithLink { .. }
            | Self::EntityToLinks { .. } => false,
            Self::PropertyValue {
                type_id: own_type,
                property_id: own_property,
                ..
            }
            | Self::PropertyRange {
                type_id: own_type,
                property_id: own_property,
                ..
            }
            | Self::EntitiesWithProperty {
                type_id: own_type,
                property_id: own_property,
            } => *own_type == type_id && *own_property == property_id,
            Self::Union { left, right }
            | Self::Intersection { left, right }
            | Self::Minus { left, right }
            | Self::Concat { left, right } => {
                left.is_matched_property_changed(type_id, property_id)
                    || right.is_matched_property_changed(type_id, property_id)
            }
            Self::Distinct { source }
            | Self::SelectMany { source, .. }
            | Self::SelectDistinct { source, .. } => {
                source.is_matched_property_changed(type_id, property_id)
            }
            Self::FilterLinks { base, filter } => {
                base.is_matched_property_changed(type_id, property_id)
                    || filter.is_matched_property_changed(type_id, property_id)
            }
        }
    }
}
