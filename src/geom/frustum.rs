//! Sensing frustums
//!
//! A frustum is the region one sensor of an agent body can perceive. The
//! culler only needs three things from it: an identifier, an enclosing box
//! (used to localize the walk in a tree) and a classification of an arbitrary
//! box against the region.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aabb::Aabb;
use crate::world::entity::FrustumId;

/// Position of a box relative to a frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntersectionType {
    /// No shared point
    Outside,
    /// The box lies entirely inside the frustum
    Inside,
    /// The box entirely encloses the frustum
    Enclosing,
    /// Partial overlap
    Spanning,
}

impl IntersectionType {
    /// Anything but [`IntersectionType::Outside`] is perceivable
    #[inline]
    pub fn is_visible(&self) -> bool {
        !matches!(self, IntersectionType::Outside)
    }
}

/// Geometric sensing region of one sensor
pub trait Frustum<const D: usize>: Send + Sync {
    fn id(&self) -> FrustumId;

    /// Smallest box enclosing the sensing region
    fn bounds(&self) -> Aabb<D>;

    /// Point the sensor looks from. Bottom-up culling starts its walk from the
    /// tree leaf holding this point.
    fn eye(&self) -> [f32; D];

    /// Classify `bounds` against the sensing region.
    fn classify(&self, bounds: &Aabb<D>) -> IntersectionType;
}

/// Axis-aligned sensing region (sector scans, area triggers)
#[derive(Debug, Clone)]
pub struct BoxFrustum<const D: usize> {
    id: FrustumId,
    region: Aabb<D>,
    eye: [f32; D],
}

impl<const D: usize> BoxFrustum<D> {
    pub fn new(region: Aabb<D>) -> Self {
        Self::with_id(Uuid::new_v4(), region)
    }

    pub fn with_id(id: FrustumId, region: Aabb<D>) -> Self {
        Self {
            id,
            region,
            eye: region.center(),
        }
    }

    /// Override the eye, which by default sits at the region centre.
    pub fn with_eye(mut self, eye: [f32; D]) -> Self {
        self.eye = eye;
        self
    }

    pub fn region(&self) -> &Aabb<D> {
        &self.region
    }
}

impl<const D: usize> Frustum<D> for BoxFrustum<D> {
    fn id(&self) -> FrustumId {
        self.id
    }

    fn bounds(&self) -> Aabb<D> {
        self.region
    }

    fn eye(&self) -> [f32; D] {
        self.eye
    }

    fn classify(&self, bounds: &Aabb<D>) -> IntersectionType {
        if self.region.is_disjoint(bounds) {
            IntersectionType::Outside
        } else if self.region.contains(bounds) {
            IntersectionType::Inside
        } else if bounds.contains(&self.region) {
            IntersectionType::Enclosing
        } else {
            IntersectionType::Spanning
        }
    }
}

/// Omnidirectional range sensor: everything within `radius` of the eye
#[derive(Debug, Clone)]
pub struct SphericalFrustum<const D: usize> {
    id: FrustumId,
    eye: [f32; D],
    radius: f32,
}

impl<const D: usize> SphericalFrustum<D> {
    pub fn new(eye: [f32; D], radius: f32) -> Self {
        Self::with_id(Uuid::new_v4(), eye, radius)
    }

    pub fn with_id(id: FrustumId, eye: [f32; D], radius: f32) -> Self {
        Self {
            id,
            eye,
            radius: radius.abs(),
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl<const D: usize> Frustum<D> for SphericalFrustum<D> {
    fn id(&self) -> FrustumId {
        self.id
    }

    fn bounds(&self) -> Aabb<D> {
        Aabb::around(self.eye, self.radius)
    }

    fn eye(&self) -> [f32; D] {
        self.eye
    }

    fn classify(&self, bounds: &Aabb<D>) -> IntersectionType {
        let r_sq = self.radius * self.radius;
        if bounds.distance_sq_to_point(&self.eye) > r_sq {
            IntersectionType::Outside
        } else if bounds.max_distance_sq_to_point(&self.eye) <= r_sq {
            IntersectionType::Inside
        } else if bounds.contains(&self.bounds()) {
            IntersectionType::Enclosing
        } else {
            IntersectionType::Spanning
        }
    }
}
