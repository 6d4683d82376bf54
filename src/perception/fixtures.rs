//! Shared test worlds and helpers for the perception tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hashbrown::{HashMap, HashSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use uuid::Uuid;

use super::list::PerceptionMap;
use super::PerceptionScene;
use crate::geom::{Aabb, BoxFrustum, IntersectionType};
use crate::scenario::{Scenario, ScenarioConfig};
use crate::tree::{Binary, Icosep};
use crate::util::vec2::Vec2;
use crate::world::body::{AgentBody, PerceptionDimension, SimpleBody};
use crate::world::entity::{EntityId, FrustumId, WorldEntity};
use crate::world::ground::{FlatGround, GroundPerception};

pub struct World {
    pub scene: PerceptionScene<2>,
    pub bodies: Vec<Arc<dyn AgentBody<2>>>,
    pub scenario: Scenario<2>,
}

/// Seeded 200x200 world: icosep static tree, binary dynamic tree holding one
/// entity per body, optional flat ground.
pub fn world(bodies: usize, statics: usize, with_ground: bool) -> World {
    let config = ScenarioConfig {
        world_size: 200.0,
        static_count: statics,
        body_count: bodies,
        max_entity_size: 5.0,
        sensor_range: 30.0,
        dimension: PerceptionDimension::D2,
    };
    let mut rng = StdRng::seed_from_u64(42);
    let scenario: Scenario<2> = Scenario::generate(config, &mut rng);

    let static_tree = Arc::new(scenario.static_tree::<Icosep>(4));
    let dynamic_tree = match scenario.dynamic_tree::<Binary>(2) {
        Ok(tree) => Arc::new(tree),
        Err(e) => panic!("fixture bodies are unique: {}", e),
    };
    let mut scene = PerceptionScene::new(static_tree, dynamic_tree);
    if with_ground {
        scene = scene.with_ground(Arc::new(FlatGround::new(0.0)));
    }

    World {
        scene,
        bodies: scenario.population(),
        scenario,
    }
}

fn everything() -> BoxFrustum<2> {
    BoxFrustum::new(Aabb::new([-1000.0, -1000.0], [1000.0, 1000.0]))
}

pub fn unsupported_body() -> Arc<dyn AgentBody<2>> {
    let body = SimpleBody::new(Uuid::new_v4(), Vec2::new(10.0, 10.0), PerceptionDimension::D2)
        .with_frustum(everything())
        .unsupported();
    Arc::new(body)
}

/// Body whose interest filter panics on the first candidate
pub fn panicking_body() -> Arc<dyn AgentBody<2>> {
    let body = SimpleBody::new(Uuid::new_v4(), Vec2::new(10.0, 10.0), PerceptionDimension::D2)
        .with_frustum(everything())
        .with_interest_filter(
            |_: &Aabb<2>, _: &WorldEntity<2>, _: IntersectionType, _: FrustumId| -> bool {
                panic!("filter exploded")
            },
        );
    Arc::new(body)
}

/// Body whose interest filter takes `delay` per candidate
pub fn slow_body(delay: Duration) -> Arc<dyn AgentBody<2>> {
    let body = SimpleBody::new(Uuid::new_v4(), Vec2::new(10.0, 10.0), PerceptionDimension::D2)
        .with_frustum(everything())
        .with_interest_filter(
            move |_: &Aabb<2>, _: &WorldEntity<2>, _: IntersectionType, _: FrustumId| -> bool {
                std::thread::sleep(delay);
                true
            },
        );
    Arc::new(body)
}

/// Order-independent view of one perception list
#[derive(Debug, Clone, PartialEq)]
pub struct BodySets {
    pub statics: HashSet<(EntityId, FrustumId)>,
    pub dynamic: HashSet<(EntityId, FrustumId)>,
    pub ground: Option<GroundPerception>,
    pub complete: bool,
}

pub fn per_body_sets(map: &PerceptionMap) -> HashMap<EntityId, BodySets> {
    map.iter()
        .map(|(body, list)| {
            let sets = BodySets {
                statics: list.static_percepts().map(|p| (p.entity, p.frustum)).collect(),
                dynamic: list.dynamic_percepts().map(|p| (p.entity, p.frustum)).collect(),
                ground: list.ground_perception().copied(),
                complete: list.is_complete(),
            };
            (*body, sets)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub warnings: usize,
    pub errors: usize,
}

struct CountingLayer {
    warnings: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl<S: Subscriber> Layer<S> for CountingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level == Level::WARN {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        } else if level == Level::ERROR {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` with a subscriber counting the warnings and errors logged on this thread.
pub fn count_events<T>(f: impl FnOnce() -> T) -> (T, EventCounts) {
    let warnings = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(CountingLayer {
        warnings: warnings.clone(),
        errors: errors.clone(),
    });
    let result = tracing::subscriber::with_default(subscriber, f);
    let counts = EventCounts {
        warnings: warnings.load(Ordering::SeqCst),
        errors: errors.load(Ordering::SeqCst),
    };
    (result, counts)
}
