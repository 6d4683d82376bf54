use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::list::PerceptionMap;
use super::task::{CullingPolicy, PassPlan};
use super::{PerceptionAlgorithm, PerceptionScene, PerceptionStrategy};
use crate::metrics::PerceptionMetrics;
use crate::world::body::AgentBody;

/// Perception pass on the calling thread, in plan order
#[derive(Debug)]
pub struct SequentialPerception {
    policy: CullingPolicy,
    metrics: Arc<PerceptionMetrics>,
}

impl SequentialPerception {
    pub fn new(metrics: Arc<PerceptionMetrics>) -> Self {
        Self {
            policy: CullingPolicy::TOP_DOWN,
            metrics,
        }
    }

    /// Same pass with another tree walk, e.g. [`CullingPolicy::HYBRID`]
    pub fn with_policy(mut self, policy: CullingPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Run every task of `plan` inline and merge the outcomes.
pub(crate) fn run_inline<const D: usize>(
    plan: &PassPlan<D>,
    scene: &PerceptionScene<D>,
    metrics: &PerceptionMetrics,
) -> PerceptionMap {
    let outcomes = plan.tasks.iter().map(|task| Some(task.run_guarded(scene))).collect();
    plan.merge(outcomes, metrics)
}

impl<const D: usize> PerceptionAlgorithm<D> for SequentialPerception {
    fn strategy(&self) -> PerceptionStrategy {
        PerceptionStrategy::Sequential
    }

    fn compute_perceptions(
        &mut self,
        population: &[Arc<dyn AgentBody<D>>],
        scene: &PerceptionScene<D>,
    ) -> PerceptionMap {
        let started = Instant::now();
        let plan = PassPlan::new(population, scene, self.policy, &self.metrics);
        PerceptionMetrics::add(&self.metrics.tasks_submitted, plan.task_count());

        let map = run_inline(&plan, scene, &self.metrics);

        let elapsed = started.elapsed();
        self.metrics.record_pass(elapsed);
        debug!(
            strategy = "sequential",
            bodies = plan.body_count(),
            tasks = plan.task_count(),
            elapsed_us = elapsed.as_micros() as u64,
            "Perception pass complete"
        );
        map
    }
}
