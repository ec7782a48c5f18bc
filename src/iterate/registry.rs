//! Explicit table from handle kinds to iterable constructors.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::binary::{ConcatIterable, IntersectionIterable, MinusIterable, UnionIterable};
use super::filter::FilterLinksIterable;
use super::handle::{IterableHandle, IterableKind};
use super::iterable::EntityIterable;
use super::links::{EntitiesWithLinkIterable, EntityToLinksIterable};
use super::property::{
    EntitiesWithPropertyIterable, PropertyRangeIterable, PropertyValueIterable,
};
use super::select::{DistinctIterable, SelectDistinctIterable, SelectManyIterable};
use super::types::{EntitiesOfRangeIterable, EntitiesOfTypeIterable};

/// Builds one iterable from a handle, recursing through the registry
/// for operands.
pub type IterableConstructor =
    Arc<dyn Fn(&IterableRegistry, &IterableHandle) -> Option<Arc<dyn EntityIterable>> + Send + Sync>;

/// Table from iterable kind to constructor.
///
/// Built explicitly once by the composing application; nothing
/// registers itself ambiently. [`IterableRegistry::standard`] carries
/// every kind this module defines.
#[derive(Default)]
pub struct IterableRegistry {
    table: FxHashMap<IterableKind, IterableConstructor>,
}

impl IterableRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the constructor for `kind`.
    pub fn register(&mut self, kind: IterableKind, constructor: IterableConstructor) {
        self.table.insert(kind, constructor);
    }

    /// Reconstructs the iterable a handle describes. `None` when a
    /// kind has no registered constructor.
    #[must_use]
    pub fn instantiate(&self, handle: &IterableHandle) -> Option<Arc<dyn EntityIterable>> {
        let constructor = self.table.get(&handle.kind())?;
        constructor(self, handle)
    }

    /// A registry covering every built-in iterable kind.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(
            IterableKind::EntitiesOfType,
            Arc::new(|_, handle| match handle {
                IterableHandle::EntitiesOfType { type_id } => {
                    Some(Arc::new(EntitiesOfTypeIterable::new(*type_id)))
                }
                _ => None,
            }),
        );
        registry.register(
            IterableKind::EntitiesOfRange,
            Arc::new(|_, handle| match handle {
                IterableHandle::EntitiesOfRange { type_id, min, max } => {
                    Some(Arc::new(EntitiesOfRangeIterable::new(*type_id, *min, *max)))
                }
                _ => None,
            }),
        );
        registry.register(
            IterableKind::EntitiesWithLink,
            Arc::new(|_, handle| match handle {
                IterableHandle::EntitiesWithLink { type_id, link_id } => {
                    Some(Arc::new(EntitiesWithLinkIterable::new(*type_id, *link_id)))
                }
                _ => None,
            }),
        );
        registry.register(
            IterableKind::EntityToLinks,
            Arc::new(|_, handle| match handle {
                IterableHandle::EntityToLinks {
                    type_id,
                    link_id,
                    target,
                } => Some(Arc::new(EntityToLinksIterable::new(
                    *type_id, *link_id, *target,
                ))),
                _ => None,
            }),
        );
        registry.register(
            IterableKind::PropertyValue,
            Arc::new(|_, handle| match handle {
                IterableHandle::PropertyValue {
                    type_id,
                    property_id,
                    value,
                } => Some(Arc::new(PropertyValueIterable::new(
                    *type_id,
                    *property_id,
                    value.clone(),
                ))),
                _ => None,
            }),
        );
        registry.register(
            IterableKind::PropertyRange,
            Arc::new(|_, handle| match handle {
                IterableHandle::PropertyRange {
                    type_id,
                    property_id,
                    min,
                    max,
                } => Some(Arc::new(PropertyRangeIterable::new(
                    *type_id,
                    *property_id,
                    min.clone(),
                    max.clone(),
                ))),
                _ => None,
            }),
        );
        registry.register(
            IterableKind::EntitiesWithProperty,
            Arc::new(|_, handle| match handle {
                IterableHandle::EntitiesWithProperty {
                    type_id,
                    property_id,
                } => Some(Arc::new(EntitiesWithPropertyIterable::new(
                    *type_id,
                    *property_id,
                ))),
                _ => None,
            }),
        );
        registry.register(
            IterableKind::Union,
            Arc::new(|registry, handle| match handle {
                IterableHandle::Union { left, right } => Some(Arc::new(UnionIterable::new(
                    registry.instantiate(left)?,
                    registry.instantiate(right)?,
                ))),
                _ => None,
            }),
        );
        registry.register(
            IterableKind::Intersection,
            Arc::new(|registry, handle| match handle {
                IterableHandle::Intersection { left, right } => {
                    Some(Arc::new(IntersectionIterable::new(
                        registry.instantiate(left)?,
                        registry.instantiate(right)?,
                    )))
                }
                _ => None,
            }),
        );
        registry.register(
            IterableKind::Minus,
            Arc::new(|registry, handle| match handle {
                IterableHandle::Minus { left, right } => Some(Arc::new(MinusIterable::new(
                    registry.instantiate(left)?,
                    registry.instantiate(right)?,
                ))),
                _ => None,
            }),
        );
        registry.register(
            IterableKind::Concat,
            Arc::new(|registry, handle| match handle {
                IterableHandle::Concat { left, right } => Some(Arc::new(ConcatIterable::new(
                    registry.instantiate(left)?,
                    registry.instantiate(right)?,
                ))),
                _ => None,
            }),
        );
        registry.register(
            IterableKind::Distinct,
            Arc::new(|registry, handle| match handle {
                IterableHandle::Distinct { source } => Some(Arc::new(DistinctIterable::new(
                    registry.instantiate(source)?,
                ))),
                _ => None,
            }),
        );
        registry.register(
            IterableKind::SelectMany,
            Arc::new(|registry, handle| match handle {
                IterableHandle::SelectMany { source, link_id } => Some(Arc::new(
                    SelectManyIterable::new(registry.instantiate(source)?, *link_id),
                )),
                _ => None,
            }),
        );
        registry.register(
            IterableKind::SelectDistinct,
            Arc::new(|registry, handle| match handle {
                IterableHandle::SelectDistinct { source, link_id } => Some(Arc::new(
                    SelectDistinctIterable::new(registry.instantiate(source)?, *link_id),
                )),
                _ => None,
            }),
        );
        registry.register(
            IterableKind::FilterLinks,
            Arc::new(|registry, handle| match handle {
                IterableHandle::FilterLinks { base, filter } => Some(Arc::new(
                    FilterLinksIterable::new(
                        registry.instantiate(base)?,
                        registry.instantiate(filter)?,
                    ),
                )),
                _ => None,
            }),
        );
        registry
    }
}

impl std::fmt::Debug for IterableRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("IterableRegistry")
            .field("kinds", &self.table.len())
            .finish()
    }
}
