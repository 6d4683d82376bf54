//! Per-body perception results
//!
//! A [`PerceptionList`] is created fresh for every body and tick. It only
//! grows during the pass (percepts are appended, never reordered) and is
//! read-only for the decision layer afterwards.

use hashbrown::HashMap;
use serde::Serialize;

use crate::cull::CullingResult;
use crate::geom::{Aabb, IntersectionType};
use crate::world::body::PerceptionDimension;
use crate::world::entity::{EntityId, FrustumId};
use crate::world::ground::GroundPerception;

/// Bounds of a percept expressed in the body's preferred dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerceivedShape {
    /// Extent along axis 0
    Segment { min: f32, max: f32 },
    /// Extent along axis 0 plus lateral offset of the centre on axis 1
    Curvilinear { min: f32, max: f32, lateral: f32 },
    Rect { min: [f32; 2], max: [f32; 2] },
    /// Shared by 2.5D and 3D
    Box { min: [f32; 3], max: [f32; 3] },
}

impl PerceivedShape {
    /// Project `bounds` into `dimension`. Axes the bounds do not have read as zero.
    pub fn project<const D: usize>(dimension: PerceptionDimension, bounds: &Aabb<D>) -> Self {
        let (x0, x1) = bounds.range(0);
        let (y0, y1) = bounds.range(1);
        match dimension {
            PerceptionDimension::D1 => PerceivedShape::Segment { min: x0, max: x1 },
            PerceptionDimension::D1_5 => PerceivedShape::Curvilinear {
                min: x0,
                max: x1,
                lateral: (y0 + y1) * 0.5,
            },
            PerceptionDimension::D2 => PerceivedShape::Rect {
                min: [x0, y0],
                max: [x1, y1],
            },
            PerceptionDimension::D2_5 | PerceptionDimension::D3 => {
                let (z0, z1) = bounds.range(2);
                PerceivedShape::Box {
                    min: [x0, y0, z0],
                    max: [x1, y1, z1],
                }
            }
        }
    }
}

/// One perceived entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Percept {
    pub entity: EntityId,
    pub tags: Vec<String>,
    /// Classification after sensor physics
    pub classification: IntersectionType,
    /// Frustum that saw the entity
    pub frustum: FrustumId,
    pub shape: PerceivedShape,
}

impl Percept {
    pub fn from_culled<const D: usize>(
        result: &CullingResult<'_, D>,
        frustum: FrustumId,
        dimension: PerceptionDimension,
    ) -> Self {
        Self {
            entity: result.entity.id,
            tags: result.entity.tags.to_vec(),
            classification: result.classification,
            frustum,
            shape: PerceivedShape::project(dimension, &result.entity.bounds),
        }
    }
}

/// Everything one body perceived during a pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerceptionList {
    dimension: PerceptionDimension,
    dynamic: Vec<Percept>,
    statics: Vec<Percept>,
    ground: Option<GroundPerception>,
    /// False when the pass timed out before every task of the body reported
    complete: bool,
}

impl PerceptionList {
    pub fn new(dimension: PerceptionDimension) -> Self {
        Self {
            dimension,
            dynamic: Vec::new(),
            statics: Vec::new(),
            ground: None,
            complete: true,
        }
    }

    pub fn dimension(&self) -> PerceptionDimension {
        self.dimension
    }

    /// 2.5D and 3D lists share their projection, so each serves both.
    pub fn supports(&self, dimension: PerceptionDimension) -> bool {
        use PerceptionDimension::{D2_5, D3};
        self.dimension == dimension || matches!((self.dimension, dimension), (D2_5, D3) | (D3, D2_5))
    }

    pub fn add_static_perception(&mut self, percept: Percept) {
        self.statics.push(percept);
    }

    pub fn add_dynamic_perception(&mut self, percept: Percept) {
        self.dynamic.push(percept);
    }

    pub fn set_ground_perception(&mut self, ground: GroundPerception) {
        self.ground = Some(ground);
    }

    pub(crate) fn mark_incomplete(&mut self) {
        self.complete = false;
    }

    /// Dynamic percepts in insertion order; each call restarts from the first.
    pub fn dynamic_percepts(&self) -> std::slice::Iter<'_, Percept> {
        self.dynamic.iter()
    }

    pub fn static_percepts(&self) -> std::slice::Iter<'_, Percept> {
        self.statics.iter()
    }

    pub fn dynamic_count(&self) -> usize {
        self.dynamic.len()
    }

    pub fn static_count(&self) -> usize {
        self.statics.len()
    }

    pub fn ground_perception(&self) -> Option<&GroundPerception> {
        self.ground.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_empty(&self) -> bool {
        self.dynamic.is_empty() && self.statics.is_empty() && self.ground.is_none()
    }
}

/// Perception lists of one pass, keyed by perceiving body
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerceptionMap {
    lists: HashMap<EntityId, PerceptionList>,
}

impl PerceptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            lists: HashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn insert(&mut self, body: EntityId, list: PerceptionList) {
        self.lists.insert(body, list);
    }

    pub fn get(&self, body: EntityId) -> Option<&PerceptionList> {
        self.lists.get(&body)
    }

    /// List of `body` if it was produced in `dimension`
    pub fn perceptions_of(&self, body: EntityId, dimension: PerceptionDimension) -> Option<&PerceptionList> {
        self.lists.get(&body).filter(|list| list.supports(dimension))
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &PerceptionList)> + '_ {
        self.lists.iter()
    }

    /// Bodies whose perception did not finish in time
    pub fn incomplete(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.lists.iter().filter(|(_, l)| !l.is_complete()).map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn percept(shape: PerceivedShape) -> Percept {
        Percept {
            entity: Uuid::new_v4(),
            tags: vec!["car".into()],
            classification: IntersectionType::Inside,
            frustum: Uuid::new_v4(),
            shape,
        }
    }

    #[test]
    fn test_projection_per_dimension() {
        let b = Aabb::new([1.0, 2.0, 3.0], [4.0, 6.0, 9.0]);
        assert_eq!(
            PerceivedShape::project(PerceptionDimension::D1, &b),
            PerceivedShape::Segment { min: 1.0, max: 4.0 }
        );
        assert_eq!(
            PerceivedShape::project(PerceptionDimension::D1_5, &b),
            PerceivedShape::Curvilinear { min: 1.0, max: 4.0, lateral: 4.0 }
        );
        assert_eq!(
            PerceivedShape::project(PerceptionDimension::D2, &b),
            PerceivedShape::Rect { min: [1.0, 2.0], max: [4.0, 6.0] }
        );
        assert_eq!(
            PerceivedShape::project(PerceptionDimension::D2_5, &b),
            PerceivedShape::project(PerceptionDimension::D3, &b)
        );
    }

    #[test]
    fn test_projection_pads_missing_axes() {
        let flat = Aabb::new([1.0, 2.0], [3.0, 4.0]);
        assert_eq!(
            PerceivedShape::project(PerceptionDimension::D3, &flat),
            PerceivedShape::Box { min: [1.0, 2.0, 0.0], max: [3.0, 4.0, 0.0] }
        );
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let mut list = PerceptionList::new(PerceptionDimension::D1);
        let first = percept(PerceivedShape::Segment { min: 0.0, max: 1.0 });
        let second = percept(PerceivedShape::Segment { min: 2.0, max: 3.0 });
        list.add_static_perception(first.clone());
        list.add_static_perception(second.clone());
        assert_eq!(list.static_count(), 2);
        assert_eq!(list.dynamic_count(), 0);

        let order: Vec<_> = list.static_percepts().map(|p| p.entity).collect();
        assert_eq!(order, vec![first.entity, second.entity]);
        // Restartable
        assert_eq!(list.static_percepts().count(), 2);
        assert!(list.is_complete());
    }

    #[test]
    fn test_supports_shares_3d_projection() {
        let list = PerceptionList::new(PerceptionDimension::D2_5);
        assert!(list.supports(PerceptionDimension::D3));
        assert!(list.supports(PerceptionDimension::D2_5));
        assert!(!list.supports(PerceptionDimension::D2));
    }

    #[test]
    fn test_map_perceptions_of() {
        let body = Uuid::new_v4();
        let mut map = PerceptionMap::new();
        let mut list = PerceptionList::new(PerceptionDimension::D2);
        list.set_ground_perception(GroundPerception {
            position: crate::util::vec2::Vec2::new(1.0, 2.0),
            height: 0.5,
            cell: None,
        });
        map.insert(body, list);

        assert!(map.perceptions_of(body, PerceptionDimension::D2).is_some());
        assert!(map.perceptions_of(body, PerceptionDimension::D1).is_none());
        assert!(map.perceptions_of(Uuid::new_v4(), PerceptionDimension::D2).is_none());
        assert_eq!(map.get(body).unwrap().ground_perception().unwrap().height, 0.5);
        assert_eq!(map.incomplete().count(), 0);
    }

    #[test]
    fn test_map_serializes() {
        let mut map = PerceptionMap::new();
        let mut list = PerceptionList::new(PerceptionDimension::D1);
        list.add_dynamic_perception(percept(PerceivedShape::Segment { min: 0.0, max: 1.0 }));
        map.insert(Uuid::new_v4(), list);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"kind\":\"segment\""));
        assert!(json.contains("\"car\""));
    }
}
