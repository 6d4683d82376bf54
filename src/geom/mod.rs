//! Geometry primitives consumed by the perception trees and culler

pub mod aabb;
pub mod frustum;

pub use aabb::{Aabb, Aabb2, Aabb3};
pub use frustum::{BoxFrustum, Frustum, IntersectionType, SphericalFrustum};
