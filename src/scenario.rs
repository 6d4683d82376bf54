//! Random worlds for the simulation binary, benches and tests
//!
//! A scenario scatters static entities over a box-shaped world and places
//! perceiving bodies, each with a mobile entity of its own (same identifier)
//! and two sensors: an omnidirectional range sensor and a forward box.

use std::sync::Arc;

use rand::Rng;
use uuid::Uuid;

use crate::geom::{Aabb, BoxFrustum, Frustum, SphericalFrustum};
use crate::tree::{
    DynamicTree, ExtentMedian, ManipulatorError, StaticTree, TreeBuilder, TreeManipulator, ZoneShape,
};
use crate::util::vec2::Vec2;
use crate::world::body::{AgentBody, PerceptionDimension, SimpleBody};
use crate::world::entity::WorldEntity;

const STATIC_TAGS: [&str; 4] = ["tree", "building", "rock", "sign"];

/// Size of each body's own entity
const BODY_HALF_EXTENT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Edge length of the cubic world
    pub world_size: f32,
    pub static_count: usize,
    pub body_count: usize,
    /// Largest static entity edge
    pub max_entity_size: f32,
    /// Range of the spherical sensor; the box sensor reaches as far ahead
    pub sensor_range: f32,
    pub dimension: PerceptionDimension,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            world_size: 1000.0,
            static_count: 2000,
            body_count: 200,
            max_entity_size: 8.0,
            sensor_range: 40.0,
            dimension: PerceptionDimension::D2,
        }
    }
}

/// Scatter `count` entities with edges up to `max_size` inside `world`.
pub fn random_entities<const D: usize, R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    world: &Aabb<D>,
    max_size: f32,
) -> Vec<WorldEntity<D>> {
    (0..count)
        .map(|i| {
            let corner = random_point(rng, world);
            let mut far = corner;
            for value in far.iter_mut() {
                *value += rng.gen_range(0.0..=max_size.max(0.0));
            }
            WorldEntity::spawn(Aabb::new(corner, far)).with_tag(STATIC_TAGS[i % STATIC_TAGS.len()])
        })
        .collect()
}

fn random_point<const D: usize, R: Rng + ?Sized>(rng: &mut R, world: &Aabb<D>) -> [f32; D] {
    let mut p = world.min;
    for (axis, value) in p.iter_mut().enumerate() {
        let (lo, hi) = world.range(axis);
        if hi > lo {
            *value = rng.gen_range(lo..hi);
        }
    }
    p
}

/// Body of a scenario, with its current centre
#[derive(Debug, Clone)]
pub struct ScenarioBody<const D: usize> {
    pub body: SimpleBody<D>,
    pub center: [f32; D],
    /// Frustum identifiers, kept across moves
    sensor_ids: [Uuid; 2],
}

impl<const D: usize> ScenarioBody<D> {
    fn new(center: [f32; D], range: f32, dimension: PerceptionDimension) -> Self {
        let mut body = Self {
            body: SimpleBody::new(Uuid::new_v4(), Vec2::from_point(&center), dimension),
            center,
            sensor_ids: [Uuid::new_v4(), Uuid::new_v4()],
        };
        body.place(center, range);
        body
    }

    fn place(&mut self, center: [f32; D], range: f32) {
        self.center = center;
        self.body.position = Vec2::from_point(&center);

        let mut ahead_min = center;
        let mut ahead_max = center;
        for axis in 0..D {
            if axis == 0 {
                ahead_max[axis] += range;
            } else {
                ahead_min[axis] -= range * 0.5;
                ahead_max[axis] += range * 0.5;
            }
        }
        let around: Arc<dyn Frustum<D>> = Arc::new(SphericalFrustum::with_id(self.sensor_ids[0], center, range));
        let ahead: Arc<dyn Frustum<D>> =
            Arc::new(BoxFrustum::with_id(self.sensor_ids[1], Aabb::new(ahead_min, ahead_max)).with_eye(center));
        self.body.frustums = vec![around, ahead];
    }

    /// Mobile entity standing for this body in the dynamic tree
    pub fn entity(&self) -> WorldEntity<D> {
        WorldEntity::new(self.body.id, Aabb::around(self.center, BODY_HALF_EXTENT)).with_tag("agent")
    }
}

/// Random world with static entities and perceiving bodies
#[derive(Debug, Clone)]
pub struct Scenario<const D: usize> {
    pub config: ScenarioConfig,
    pub world: Aabb<D>,
    pub statics: Vec<WorldEntity<D>>,
    pub bodies: Vec<ScenarioBody<D>>,
}

impl<const D: usize> Scenario<D> {
    pub fn generate<R: Rng + ?Sized>(config: ScenarioConfig, rng: &mut R) -> Self {
        let world = Aabb::new([0.0; D], [config.world_size; D]);
        let statics = random_entities(rng, config.static_count, &world, config.max_entity_size);
        let bodies = (0..config.body_count)
            .map(|_| ScenarioBody::new(random_point(rng, &world), config.sensor_range, config.dimension))
            .collect();
        Self {
            config,
            world,
            statics,
            bodies,
        }
    }

    pub fn population(&self) -> Vec<Arc<dyn AgentBody<D>>> {
        self.bodies
            .iter()
            .map(|b| Arc::new(b.body.clone()) as Arc<dyn AgentBody<D>>)
            .collect()
    }

    pub fn static_tree<Z: ZoneShape>(&self, splitting_count: usize) -> StaticTree<D, Z> {
        TreeBuilder::new(splitting_count, ExtentMedian).build_within(self.statics.clone(), self.world)
    }

    pub fn dynamic_tree<Z: ZoneShape>(&self, splitting_count: usize) -> Result<DynamicTree<D, Z>, ManipulatorError> {
        let mut tree = DynamicTree::new(splitting_count);
        for body in &self.bodies {
            tree.insert(body.entity())?;
        }
        Ok(tree)
    }

    /// Random-walk every body by up to `max_step` per axis, clamped to the
    /// world. Returns the moved mobile entities, ready for relocation.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R, max_step: f32) -> Vec<WorldEntity<D>> {
        let range = self.config.sensor_range;
        let world = self.world;
        let step = max_step.abs();
        self.bodies
            .iter_mut()
            .map(|body| {
                let mut center = body.center;
                for (axis, value) in center.iter_mut().enumerate() {
                    let (lo, hi) = world.range(axis);
                    *value = (*value + rng.gen_range(-step..=step)).clamp(lo, hi);
                }
                body.place(center, range);
                body.entity()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Binary;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small() -> ScenarioConfig {
        ScenarioConfig {
            world_size: 100.0,
            static_count: 50,
            body_count: 5,
            max_entity_size: 3.0,
            sensor_range: 10.0,
            dimension: PerceptionDimension::D2,
        }
    }

    #[test]
    fn test_random_entities_stay_near_world() {
        let mut rng = StdRng::seed_from_u64(1);
        let world = Aabb::new([0.0, 0.0], [10.0, 10.0]);
        let entities = random_entities(&mut rng, 100, &world, 2.0);
        let grown = Aabb::new([0.0, 0.0], [12.0, 12.0]);
        assert_eq!(entities.len(), 100);
        assert!(entities.iter().all(|e| grown.contains(&e.bounds)));
    }

    #[test]
    fn test_generate_is_seeded() {
        let a: Scenario<2> = Scenario::generate(small(), &mut StdRng::seed_from_u64(9));
        let b: Scenario<2> = Scenario::generate(small(), &mut StdRng::seed_from_u64(9));
        let bounds = |s: &Scenario<2>| s.statics.iter().map(|e| e.bounds).collect::<Vec<_>>();
        assert_eq!(bounds(&a), bounds(&b));
        assert_eq!(a.bodies.len(), 5);
        assert!(a.bodies.iter().all(|b| b.body.frustums.len() == 2));
    }

    #[test]
    fn test_step_keeps_sensor_ids() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut scenario: Scenario<2> = Scenario::generate(small(), &mut rng);
        let before: Vec<_> = scenario.bodies[0].body.frustums.iter().map(|f| f.id()).collect();
        let moved = scenario.step(&mut rng, 5.0);
        let after: Vec<_> = scenario.bodies[0].body.frustums.iter().map(|f| f.id()).collect();
        assert_eq!(before, after);
        assert_eq!(moved.len(), 5);
        assert_eq!(moved[0].id, scenario.bodies[0].body.id);
        assert!(scenario.world.contains_point(&scenario.bodies[0].center));
    }

    #[test]
    fn test_trees_from_scenario() {
        let scenario: Scenario<2> = Scenario::generate(small(), &mut StdRng::seed_from_u64(4));
        let statics = scenario.static_tree::<Binary>(4);
        let dynamic = scenario.dynamic_tree::<Binary>(2).unwrap();
        assert_eq!(statics.len(), 50);
        assert_eq!(dynamic.len(), 5);
        assert!(dynamic.check_locations());
    }
}
