//! Situated Perception Library
//!
//! Frustum culling of agent sensors against spatial partition trees.
//!
//! # Modules
//!
//! - `tree` - static and dynamic BSP trees with binary or icosep zones
//! - `cull` - lazy culling of one frustum against one tree
//! - `perception` - per-tick perception pass (sequential, parallel, parallel-hybrid)
//! - `scenario` - random worlds for the simulation binary and benches

pub mod config;
pub mod cull;
pub mod geom;
pub mod metrics;
pub mod perception;
pub mod scenario;
pub mod tree;
pub mod util;
pub mod world;
