//! Perception pass: what every agent body perceives this tick
//!
//! For each (body, frustum) the pass culls the static tree, culls the
//! dynamic tree (without the body itself) and samples the ground, then merges
//! everything into one [`PerceptionList`] per body.
//!
//! Three strategies produce the same per-body sets:
//! - `Sequential`: everything on the calling thread, in plan order;
//! - `Parallel`: one task per (body, frustum, kind) on a worker pool, with a
//!   bounded wait;
//! - `Hybrid`: parallel, walking the dynamic tree bottom-up from the body's
//!   own leaf.

pub mod list;
pub mod parallel;
pub mod sequential;
pub mod task;

#[cfg(test)]
pub(crate) mod fixtures;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::PerceptionConfig;
use crate::metrics::PerceptionMetrics;
use crate::tree::PerceptionTree;
use crate::world::body::AgentBody;
use crate::world::ground::Ground;

pub use list::{PerceivedShape, Percept, PerceptionList, PerceptionMap};
pub use parallel::{ParallelPerception, PoolError};
pub use sequential::SequentialPerception;
pub use task::{CullingPolicy, TaskError, TaskKind};

/// Read-only world state of one pass
#[derive(Clone)]
pub struct PerceptionScene<const D: usize> {
    pub static_tree: Arc<dyn PerceptionTree<D>>,
    pub dynamic_tree: Arc<dyn PerceptionTree<D>>,
    pub ground: Option<Arc<dyn Ground>>,
}

impl<const D: usize> PerceptionScene<D> {
    pub fn new<S, T>(static_tree: Arc<S>, dynamic_tree: Arc<T>) -> Self
    where
        S: PerceptionTree<D> + 'static,
        T: PerceptionTree<D> + 'static,
    {
        Self {
            static_tree,
            dynamic_tree,
            ground: None,
        }
    }

    pub fn with_ground(mut self, ground: Arc<dyn Ground>) -> Self {
        self.ground = Some(ground);
        self
    }
}

impl<const D: usize> fmt::Debug for PerceptionScene<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerceptionScene")
            .field("static_entities", &self.static_tree.entity_count())
            .field("dynamic_entities", &self.dynamic_tree.entity_count())
            .field("ground", &self.ground.is_some())
            .finish()
    }
}

/// Strategy-independent entry point of the perception pass
pub trait PerceptionAlgorithm<const D: usize>: Send {
    fn strategy(&self) -> PerceptionStrategy;

    /// Compute the perception list of every body of `population`.
    ///
    /// Never fails: unsupported bodies are skipped, failed tasks are logged
    /// and a timed-out pass returns whatever completed.
    fn compute_perceptions(
        &mut self,
        population: &[Arc<dyn AgentBody<D>>],
        scene: &PerceptionScene<D>,
    ) -> PerceptionMap;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerceptionStrategy {
    Sequential,
    Parallel,
    Hybrid,
}

impl PerceptionStrategy {
    pub fn culling_policy(&self) -> CullingPolicy {
        match self {
            PerceptionStrategy::Sequential | PerceptionStrategy::Parallel => CullingPolicy::TOP_DOWN,
            PerceptionStrategy::Hybrid => CullingPolicy::HYBRID,
        }
    }
}

impl fmt::Display for PerceptionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerceptionStrategy::Sequential => f.write_str("sequential"),
            PerceptionStrategy::Parallel => f.write_str("parallel"),
            PerceptionStrategy::Hybrid => f.write_str("hybrid"),
        }
    }
}

impl FromStr for PerceptionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(PerceptionStrategy::Sequential),
            "parallel" => Ok(PerceptionStrategy::Parallel),
            "hybrid" | "parallel-hybrid" => Ok(PerceptionStrategy::Hybrid),
            other => Err(format!("unknown perception strategy '{}'", other)),
        }
    }
}

/// Build the algorithm selected by `config`.
pub fn create_algorithm<const D: usize>(
    config: &PerceptionConfig,
    metrics: Arc<PerceptionMetrics>,
) -> Box<dyn PerceptionAlgorithm<D>> {
    match config.strategy {
        PerceptionStrategy::Sequential => Box::new(SequentialPerception::new(metrics)),
        PerceptionStrategy::Parallel => Box::new(ParallelPerception::new(
            config.worker_threads,
            config.task_timeout,
            metrics,
        )),
        PerceptionStrategy::Hybrid => Box::new(ParallelPerception::hybrid(
            config.worker_threads,
            config.task_timeout,
            metrics,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{self, per_body_sets, World};
    use super::*;
    use crate::tree::Icosep;

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Hybrid".parse::<PerceptionStrategy>(), Ok(PerceptionStrategy::Hybrid));
        assert_eq!("parallel-hybrid".parse::<PerceptionStrategy>(), Ok(PerceptionStrategy::Hybrid));
        assert_eq!(PerceptionStrategy::Sequential.to_string(), "sequential");
        assert!("gpu".parse::<PerceptionStrategy>().is_err());
    }

    #[test]
    fn test_create_algorithm_honours_strategy() {
        let metrics = Arc::new(PerceptionMetrics::new());
        for strategy in [
            PerceptionStrategy::Sequential,
            PerceptionStrategy::Parallel,
            PerceptionStrategy::Hybrid,
        ] {
            let config = PerceptionConfig {
                strategy,
                worker_threads: 2,
                ..PerceptionConfig::default()
            };
            let algorithm = create_algorithm::<2>(&config, metrics.clone());
            assert_eq!(algorithm.strategy(), strategy);
        }
    }

    #[test]
    fn test_strategies_are_equivalent() {
        let World { scene, bodies, .. } = fixtures::world(40, 300, true);
        let metrics = Arc::new(PerceptionMetrics::new());

        let mut algorithms: Vec<Box<dyn PerceptionAlgorithm<2>>> = [
            PerceptionStrategy::Sequential,
            PerceptionStrategy::Parallel,
            PerceptionStrategy::Hybrid,
        ]
        .into_iter()
        .map(|strategy| {
            let config = PerceptionConfig {
                strategy,
                worker_threads: 4,
                ..PerceptionConfig::default()
            };
            create_algorithm::<2>(&config, metrics.clone())
        })
        .collect();

        let reference = algorithms[0].compute_perceptions(&bodies, &scene);
        assert_eq!(reference.len(), 40);
        let expected = per_body_sets(&reference);
        assert!(expected.values().any(|s| !s.statics.is_empty()));
        assert!(expected.values().any(|s| !s.dynamic.is_empty()));

        for algorithm in algorithms.iter_mut().skip(1) {
            let map = algorithm.compute_perceptions(&bodies, &scene);
            assert_eq!(per_body_sets(&map), expected, "{} differs", algorithm.strategy());
        }
    }

    fn all_strategies(metrics: &Arc<PerceptionMetrics>) -> Vec<Box<dyn PerceptionAlgorithm<2>>> {
        [
            PerceptionStrategy::Sequential,
            PerceptionStrategy::Parallel,
            PerceptionStrategy::Hybrid,
        ]
        .into_iter()
        .map(|strategy| {
            let config = PerceptionConfig {
                strategy,
                worker_threads: 2,
                ..PerceptionConfig::default()
            };
            create_algorithm::<2>(&config, metrics.clone())
        })
        .collect()
    }

    fn assert_no_self_percepts(map: &PerceptionMap, bodies: &[Arc<dyn AgentBody<2>>], strategy: PerceptionStrategy) {
        for body in bodies {
            let list = map.get(body.id()).unwrap();
            assert!(
                list.dynamic_percepts().all(|p| p.entity != body.id()),
                "{} lets a body perceive itself",
                strategy
            );
        }
    }

    #[test]
    fn test_body_never_perceives_itself() {
        let World { scene, bodies, .. } = fixtures::world(20, 50, false);
        let metrics = Arc::new(PerceptionMetrics::new());

        for mut algorithm in all_strategies(&metrics) {
            let map = algorithm.compute_perceptions(&bodies, &scene);
            assert_eq!(map.len(), 20);
            assert_no_self_percepts(&map, &bodies, algorithm.strategy());
        }
    }

    #[test]
    fn test_self_exclusion_with_icosep_dynamic_tree() {
        let World { scene, bodies, scenario } = fixtures::world(20, 50, false);
        let dynamic = Arc::new(scenario.dynamic_tree::<Icosep>(2).unwrap());
        let scene = PerceptionScene {
            dynamic_tree: dynamic,
            ..scene
        };
        let metrics = Arc::new(PerceptionMetrics::new());

        let mut reference = None;
        for mut algorithm in all_strategies(&metrics) {
            let map = algorithm.compute_perceptions(&bodies, &scene);
            assert_no_self_percepts(&map, &bodies, algorithm.strategy());
            let sets = per_body_sets(&map);
            match &reference {
                None => reference = Some(sets),
                Some(expected) => assert_eq!(&sets, expected, "{} differs", algorithm.strategy()),
            }
        }
        assert!(reference.unwrap().values().any(|s| !s.dynamic.is_empty()));
    }

    #[test]
    fn test_unsupported_body_is_skipped() {
        let World { scene, mut bodies, .. } = fixtures::world(3, 20, true);
        let unsupported = fixtures::unsupported_body();
        bodies.push(unsupported.clone());
        let metrics = Arc::new(PerceptionMetrics::new());
        let mut algorithm = SequentialPerception::new(metrics.clone());

        let map = algorithm.compute_perceptions(&bodies, &scene);
        assert_eq!(map.len(), 3);
        assert!(map.get(unsupported.id()).is_none());
        assert_eq!(metrics.snapshot().bodies_skipped, 1);
    }
}
