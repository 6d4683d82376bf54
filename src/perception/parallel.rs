//! Worker-pool perception pass (Parallel and Hybrid strategies)
//!
//! Every task is spawned on a fixed-size rayon pool and reports through a
//! channel. The driver blocks on the channel with a deadline:
//! - all tasks reported: outcomes merged in plan order;
//! - deadline elapsed: one warning, the pool is dropped without joining its
//!   workers (a fresh pool is built on the next pass) and bodies with
//!   missing outcomes come back incomplete. Late outcomes are discarded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, info, warn};

use super::list::PerceptionMap;
use super::sequential::run_inline;
use super::task::{CullingPolicy, PassPlan, TaskOutcome};
use super::{PerceptionAlgorithm, PerceptionScene, PerceptionStrategy};
use crate::metrics::PerceptionMetrics;
use crate::world::body::AgentBody;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Failed to build perception worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

fn build_pool(workers: usize) -> Result<ThreadPool, PoolError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("perception-worker-{}", i))
        .build()?;
    Ok(pool)
}

pub struct ParallelPerception {
    strategy: PerceptionStrategy,
    policy: CullingPolicy,
    workers: usize,
    timeout: Duration,
    /// `None` after a timeout or a failed build, rebuilt on the next pass
    pool: Option<ThreadPool>,
    metrics: Arc<PerceptionMetrics>,
}

impl ParallelPerception {
    /// Top-down culling of both trees
    pub fn new(workers: usize, timeout: Duration, metrics: Arc<PerceptionMetrics>) -> Self {
        Self::with_policy(PerceptionStrategy::Parallel, CullingPolicy::TOP_DOWN, workers, timeout, metrics)
    }

    /// Top-down on the static tree, bottom-up on the dynamic tree
    pub fn hybrid(workers: usize, timeout: Duration, metrics: Arc<PerceptionMetrics>) -> Self {
        Self::with_policy(PerceptionStrategy::Hybrid, CullingPolicy::HYBRID, workers, timeout, metrics)
    }

    fn with_policy(
        strategy: PerceptionStrategy,
        policy: CullingPolicy,
        workers: usize,
        timeout: Duration,
        metrics: Arc<PerceptionMetrics>,
    ) -> Self {
        let mut algorithm = Self {
            strategy,
            policy,
            workers: workers.max(1),
            timeout,
            pool: None,
            metrics,
        };
        algorithm.ensure_pool();
        algorithm
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// False between a timeout and the next pass
    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }

    fn ensure_pool(&mut self) {
        if self.pool.is_some() {
            return;
        }
        match build_pool(self.workers) {
            Ok(pool) => {
                info!(workers = self.workers, strategy = %self.strategy, "Perception worker pool created");
                PerceptionMetrics::add(&self.metrics.pool_builds, 1);
                self.pool = Some(pool);
            }
            Err(e) => error!("{}, running perception on the calling thread", e),
        }
    }

    /// Spawn every task of `plan` and wait for the outcomes until `deadline`
    /// (forever when `None`). Returns the outcomes by task index and whether
    /// the wait timed out.
    fn dispatch<const D: usize>(
        pool: &ThreadPool,
        plan: &Arc<PassPlan<D>>,
        scene: &PerceptionScene<D>,
        deadline: Option<Instant>,
    ) -> (Vec<Option<TaskOutcome>>, bool) {
        let total = plan.task_count();
        let (tx, rx) = crossbeam_channel::unbounded::<TaskOutcome>();

        for index in 0..total {
            let plan = Arc::clone(plan);
            let scene = scene.clone();
            let tx = tx.clone();
            pool.spawn(move || {
                if let Some(task) = plan.tasks.get(index) {
                    // The driver may have given up on this pass already
                    let _ = tx.send(task.run_guarded(&scene));
                }
            });
        }
        drop(tx);

        let mut outcomes: Vec<Option<TaskOutcome>> = (0..total).map(|_| None).collect();
        let mut received = 0;
        while received < total {
            let next = match deadline {
                Some(deadline) => rx.recv_deadline(deadline),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match next {
                Ok(outcome) => {
                    if let Some(slot) = outcomes.get_mut(outcome.index) {
                        if slot.is_none() {
                            received += 1;
                        }
                        *slot = Some(outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return (outcomes, true),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        (outcomes, false)
    }
}

impl<const D: usize> PerceptionAlgorithm<D> for ParallelPerception {
    fn strategy(&self) -> PerceptionStrategy {
        self.strategy
    }

    fn compute_perceptions(
        &mut self,
        population: &[Arc<dyn AgentBody<D>>],
        scene: &PerceptionScene<D>,
    ) -> PerceptionMap {
        let started = Instant::now();
        let plan = Arc::new(PassPlan::new(population, scene, self.policy, &self.metrics));
        PerceptionMetrics::add(&self.metrics.tasks_submitted, plan.task_count());

        self.ensure_pool();
        // Timeouts too large for an Instant mean no deadline
        let deadline = started.checked_add(self.timeout);
        let dispatched = self
            .pool
            .as_ref()
            .map(|pool| Self::dispatch(pool, &plan, scene, deadline));

        let map = match dispatched {
            Some((outcomes, timed_out)) => {
                if timed_out {
                    let pending = outcomes.iter().filter(|o| o.is_none()).count();
                    warn!(
                        strategy = %self.strategy,
                        pending,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Perception pass timed out, discarding worker pool"
                    );
                    PerceptionMetrics::add(&self.metrics.timeouts, 1);
                    // Dropping the pool does not wait for the stuck workers
                    self.pool = None;
                }
                plan.merge(outcomes, &self.metrics)
            }
            None => run_inline(&plan, scene, &self.metrics),
        };

        let elapsed = started.elapsed();
        self.metrics.record_pass(elapsed);
        debug!(
            strategy = %self.strategy,
            bodies = plan.body_count(),
            tasks = plan.task_count(),
            elapsed_us = elapsed.as_micros() as u64,
            "Perception pass complete"
        );
        map
    }
}
