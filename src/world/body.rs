//! Agent bodies: the perceivers of the perception pass
//!
//! A body owns one frustum per sensor and two optional filters:
//! - the physical perception alterator models sensor physics (fog, occlusion,
//!   noise) by adjusting the intersection classification of a percept;
//! - the interest filter models attention by discarding percepts.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geom::{Aabb, Frustum, IntersectionType};
use crate::util::vec2::Vec2;
use crate::world::entity::{EntityId, FrustumId, WorldEntity};

/// Mathematical dimension in which a body wants its percepts expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerceptionDimension {
    /// Position along a single axis
    D1,
    /// Curvilinear position plus lateral offset (road-bound agents)
    D1_5,
    /// Planar
    D2,
    /// Planar plus elevation
    D2_5,
    /// Full 3D
    D3,
}

impl PerceptionDimension {
    pub const ALL: [PerceptionDimension; 5] = [
        PerceptionDimension::D1,
        PerceptionDimension::D1_5,
        PerceptionDimension::D2,
        PerceptionDimension::D2_5,
        PerceptionDimension::D3,
    ];
}

impl fmt::Display for PerceptionDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PerceptionDimension::D1 => "1d",
            PerceptionDimension::D1_5 => "1.5d",
            PerceptionDimension::D2 => "2d",
            PerceptionDimension::D2_5 => "2.5d",
            PerceptionDimension::D3 => "3d",
        };
        f.write_str(name)
    }
}

impl FromStr for PerceptionDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(PerceptionDimension::D1),
            "1.5d" | "1d5" => Ok(PerceptionDimension::D1_5),
            "2d" => Ok(PerceptionDimension::D2),
            "2.5d" | "2d5" => Ok(PerceptionDimension::D2_5),
            "3d" => Ok(PerceptionDimension::D3),
            other => Err(format!("unknown perception dimension '{}'", other)),
        }
    }
}

/// Sensor physics applied to every culled entity before the interest filter
pub trait PhysicalPerceptionAlterator<const D: usize>: Send + Sync {
    fn alter(
        &self,
        bounds: &Aabb<D>,
        entity: &WorldEntity<D>,
        classification: IntersectionType,
        frustum: FrustumId,
    ) -> IntersectionType;
}

impl<const D: usize, F> PhysicalPerceptionAlterator<D> for F
where
    F: Fn(&Aabb<D>, &WorldEntity<D>, IntersectionType, FrustumId) -> IntersectionType + Send + Sync,
{
    fn alter(
        &self,
        bounds: &Aabb<D>,
        entity: &WorldEntity<D>,
        classification: IntersectionType,
        frustum: FrustumId,
    ) -> IntersectionType {
        self(bounds, entity, classification, frustum)
    }
}

/// Attention filter: only accepted entities become percepts
pub trait InterestFilter<const D: usize>: Send + Sync {
    fn accept(
        &self,
        bounds: &Aabb<D>,
        entity: &WorldEntity<D>,
        classification: IntersectionType,
        frustum: FrustumId,
    ) -> bool;
}

impl<const D: usize, F> InterestFilter<D> for F
where
    F: Fn(&Aabb<D>, &WorldEntity<D>, IntersectionType, FrustumId) -> bool + Send + Sync,
{
    fn accept(
        &self,
        bounds: &Aabb<D>,
        entity: &WorldEntity<D>,
        classification: IntersectionType,
        frustum: FrustumId,
    ) -> bool {
        self(bounds, entity, classification, frustum)
    }
}

/// Interest filter keeping only entities carrying one of the given tags
#[derive(Debug, Clone, Default)]
pub struct TagInterest {
    tags: Vec<String>,
}

impl TagInterest {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

impl<const D: usize> InterestFilter<D> for TagInterest {
    fn accept(
        &self,
        _bounds: &Aabb<D>,
        entity: &WorldEntity<D>,
        _classification: IntersectionType,
        _frustum: FrustumId,
    ) -> bool {
        self.tags.iter().any(|t| entity.has_tag(t))
    }
}

/// Alterator that hides entities beyond a range from a reference point,
/// e.g. fog limiting visibility
#[derive(Debug, Clone)]
pub struct RangeLimit<const D: usize> {
    pub origin: [f32; D],
    pub range: f32,
}

impl<const D: usize> PhysicalPerceptionAlterator<D> for RangeLimit<D> {
    fn alter(
        &self,
        bounds: &Aabb<D>,
        _entity: &WorldEntity<D>,
        classification: IntersectionType,
        _frustum: FrustumId,
    ) -> IntersectionType {
        if bounds.distance_sq_to_point(&self.origin) > self.range * self.range {
            IntersectionType::Outside
        } else {
            classification
        }
    }
}

/// Perceiving body as seen by the perception algorithms
pub trait AgentBody<const D: usize>: Send + Sync {
    fn id(&self) -> EntityId;

    fn frustums(&self) -> &[Arc<dyn Frustum<D>>];

    fn perception_filter(&self) -> Option<Arc<dyn PhysicalPerceptionAlterator<D>>> {
        None
    }

    fn interest_filter(&self) -> Option<Arc<dyn InterestFilter<D>>> {
        None
    }

    /// `None` when the body asks for a dimension the engine cannot provide;
    /// such bodies get no perception.
    fn preferred_dimension(&self) -> Option<PerceptionDimension>;

    /// Ground-sampling position
    fn position_2d(&self) -> Vec2;
}

/// Plain data body, enough for simulations that keep their agents elsewhere
#[derive(Clone)]
pub struct SimpleBody<const D: usize> {
    pub id: EntityId,
    pub position: Vec2,
    pub dimension: Option<PerceptionDimension>,
    pub frustums: Vec<Arc<dyn Frustum<D>>>,
    pub perception_filter: Option<Arc<dyn PhysicalPerceptionAlterator<D>>>,
    pub interest_filter: Option<Arc<dyn InterestFilter<D>>>,
}

impl<const D: usize> SimpleBody<D> {
    pub fn new(id: EntityId, position: Vec2, dimension: PerceptionDimension) -> Self {
        Self {
            id,
            position,
            dimension: Some(dimension),
            frustums: Vec::new(),
            perception_filter: None,
            interest_filter: None,
        }
    }

    pub fn with_frustum(mut self, frustum: impl Frustum<D> + 'static) -> Self {
        self.frustums.push(Arc::new(frustum));
        self
    }

    pub fn with_perception_filter(
        mut self,
        filter: impl PhysicalPerceptionAlterator<D> + 'static,
    ) -> Self {
        self.perception_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_interest_filter(mut self, filter: impl InterestFilter<D> + 'static) -> Self {
        self.interest_filter = Some(Arc::new(filter));
        self
    }

    /// Body asking for a dimension the engine does not provide
    pub fn unsupported(mut self) -> Self {
        self.dimension = None;
        self
    }
}

impl<const D: usize> fmt::Debug for SimpleBody<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleBody")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("dimension", &self.dimension)
            .field("frustums", &self.frustums.len())
            .finish()
    }
}

impl<const D: usize> AgentBody<D> for SimpleBody<D> {
    fn id(&self) -> EntityId {
        self.id
    }

    fn frustums(&self) -> &[Arc<dyn Frustum<D>>] {
        &self.frustums
    }

    fn perception_filter(&self) -> Option<Arc<dyn PhysicalPerceptionAlterator<D>>> {
        self.perception_filter.clone()
    }

    fn interest_filter(&self) -> Option<Arc<dyn InterestFilter<D>>> {
        self.interest_filter.clone()
    }

    fn preferred_dimension(&self) -> Option<PerceptionDimension> {
        self.dimension
    }

    fn position_2d(&self) -> Vec2 {
        self.position
    }
}
