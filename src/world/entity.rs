use smallvec::SmallVec;
use uuid::Uuid;

use crate::geom::Aabb;

/// Identifier of a world entity (static object, mobile entity or agent body)
pub type EntityId = Uuid;

/// Identifier of a sensing frustum
pub type FrustumId = Uuid;

/// Semantic tags attached to an entity ("tree", "car", "pedestrian", ...)
pub type Tags = SmallVec<[String; 2]>;

/// Entity indexed by a perception tree
///
/// The same type serves for static and mobile entities. Mobile entities are
/// located through their dynamic tree rather than through a field of their
/// own, so an entity never holds a reference into the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldEntity<const D: usize> {
    pub id: EntityId,
    pub bounds: Aabb<D>,
    pub tags: Tags,
}

impl<const D: usize> WorldEntity<D> {
    pub fn new(id: EntityId, bounds: Aabb<D>) -> Self {
        Self {
            id,
            bounds,
            tags: Tags::new(),
        }
    }

    /// Fresh entity with a random identifier
    pub fn spawn(bounds: Aabb<D>) -> Self {
        Self::new(Uuid::new_v4(), bounds)
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Same entity moved to new bounds
    pub fn moved_to(&self, bounds: Aabb<D>) -> Self {
        Self {
            id: self.id,
            bounds,
            tags: self.tags.clone(),
        }
    }
}
