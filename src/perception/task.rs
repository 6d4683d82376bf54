//! Units of work of a perception pass
//!
//! A pass is planned as one task per (body, frustum, kind). Tasks own
//! everything they need (shared handles to the frustum, filters and scene),
//! so they can run on the calling thread or be shipped to a worker pool, and
//! report task-local results merged by the driver.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use super::list::{Percept, PerceptionList, PerceptionMap};
use super::PerceptionScene;
use crate::cull::{FrustumCuller, Traversal};
use crate::geom::Frustum;
use crate::metrics::PerceptionMetrics;
use crate::tree::PerceptionTree;
use crate::util::vec2::Vec2;
use crate::world::body::{AgentBody, InterestFilter, PerceptionDimension, PhysicalPerceptionAlterator};
use crate::world::entity::EntityId;
use crate::world::ground::GroundPerception;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Static,
    Dynamic,
    Ground,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Static => f.write_str("static"),
            TaskKind::Dynamic => f.write_str("dynamic"),
            TaskKind::Ground => f.write_str("ground"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("{kind} perception task of body {body} panicked: {message}")]
    Panicked {
        body: EntityId,
        kind: TaskKind,
        message: String,
    },
}

/// Tree walk used for each tree of the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullingPolicy {
    pub static_traversal: Traversal,
    pub dynamic_traversal: Traversal,
}

impl CullingPolicy {
    pub const TOP_DOWN: CullingPolicy = CullingPolicy {
        static_traversal: Traversal::TopDown,
        dynamic_traversal: Traversal::TopDown,
    };

    /// Bottom-up from the body's own leaf for mobile entities
    pub const HYBRID: CullingPolicy = CullingPolicy {
        static_traversal: Traversal::TopDown,
        dynamic_traversal: Traversal::BottomUp,
    };
}

/// Result of one task
#[derive(Debug, Clone)]
pub enum TaskPayload {
    Static(Vec<Percept>),
    Dynamic(Vec<Percept>),
    Ground(Option<GroundPerception>),
}

/// Report sent back to the driver
#[derive(Debug)]
pub struct TaskOutcome {
    /// Position of the task in the pass plan
    pub index: usize,
    pub result: Result<TaskPayload, TaskError>,
}

pub struct PerceptionTask<const D: usize> {
    index: usize,
    /// Position of the body in the pass plan
    slot: usize,
    body: EntityId,
    dimension: PerceptionDimension,
    kind: TaskKind,
    frustum: Arc<dyn Frustum<D>>,
    alterator: Option<Arc<dyn PhysicalPerceptionAlterator<D>>>,
    interest: Option<Arc<dyn InterestFilter<D>>>,
    position: Vec2,
    traversal: Traversal,
}

impl<const D: usize> PerceptionTask<D> {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn body(&self) -> EntityId {
        self.body
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    fn execute(&self, scene: &PerceptionScene<D>) -> TaskPayload {
        match self.kind {
            TaskKind::Static => TaskPayload::Static(self.cull(scene.static_tree.as_ref(), None)),
            TaskKind::Dynamic => TaskPayload::Dynamic(self.cull(scene.dynamic_tree.as_ref(), Some(self.body))),
            TaskKind::Ground => TaskPayload::Ground(scene.ground.as_ref().and_then(|g| g.sample(self.position))),
        }
    }

    fn cull(&self, tree: &dyn PerceptionTree<D>, exclude: Option<EntityId>) -> Vec<Percept> {
        let start = match self.traversal {
            Traversal::BottomUp => tree.locate(self.body),
            Traversal::TopDown => None,
        };
        let frustum = self.frustum.id();
        FrustumCuller::new(tree, self.frustum.as_ref(), self.traversal, start)
            .with_perception_filter(self.alterator.as_deref())
            .with_interest_filter(self.interest.as_deref())
            .filter(|r| r.visible && Some(r.entity.id) != exclude)
            .map(|r| Percept::from_culled(&r, frustum, self.dimension))
            .collect()
    }

    /// Run the task, turning a panic into a [`TaskError`].
    pub fn run_guarded(&self, scene: &PerceptionScene<D>) -> TaskOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(scene))).map_err(|payload| {
            TaskError::Panicked {
                body: self.body,
                kind: self.kind,
                message: panic_message(payload.as_ref()),
            }
        });
        TaskOutcome {
            index: self.index,
            result,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// Planning and merging
// ============================================================================

/// Body taking part in a pass
#[derive(Debug, Clone, Copy)]
struct BodySlot {
    body: EntityId,
    dimension: PerceptionDimension,
}

/// Task list of one pass plus what is needed to merge the outcomes
pub struct PassPlan<const D: usize> {
    bodies: Vec<BodySlot>,
    pub(crate) tasks: Vec<PerceptionTask<D>>,
}

impl<const D: usize> PassPlan<D> {
    /// Plan the tasks of `population`: bodies in population order, frustums in
    /// body order, then static, dynamic and ground.
    ///
    /// Bodies without a supported dimension are skipped.
    pub fn new(
        population: &[Arc<dyn AgentBody<D>>],
        scene: &PerceptionScene<D>,
        policy: CullingPolicy,
        metrics: &PerceptionMetrics,
    ) -> Self {
        let mut bodies = Vec::with_capacity(population.len());
        let mut tasks = Vec::new();

        for body in population {
            let Some(dimension) = body.preferred_dimension() else {
                debug!(body = %body.id(), "Skipping body with unsupported perception dimension");
                PerceptionMetrics::add(&metrics.bodies_skipped, 1);
                continue;
            };
            let slot = bodies.len();
            bodies.push(BodySlot {
                body: body.id(),
                dimension,
            });

            let alterator = body.perception_filter();
            let interest = body.interest_filter();
            let position = body.position_2d();
            for frustum in body.frustums() {
                let kinds: &[(TaskKind, Traversal)] = &[
                    (TaskKind::Static, policy.static_traversal),
                    (TaskKind::Dynamic, policy.dynamic_traversal),
                    (TaskKind::Ground, Traversal::TopDown),
                ];
                for &(kind, traversal) in kinds {
                    if kind == TaskKind::Ground && scene.ground.is_none() {
                        continue;
                    }
                    tasks.push(PerceptionTask {
                        index: tasks.len(),
                        slot,
                        body: body.id(),
                        dimension,
                        kind,
                        frustum: Arc::clone(frustum),
                        alterator: alterator.clone(),
                        interest: interest.clone(),
                        position,
                        traversal,
                    });
                }
            }
        }

        Self { bodies, tasks }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Merge outcomes in plan order. `outcomes[i]` belongs to task `i`; `None`
    /// marks a task that never reported, whose body ends up incomplete.
    pub fn merge(&self, outcomes: Vec<Option<TaskOutcome>>, metrics: &PerceptionMetrics) -> PerceptionMap {
        let mut lists: Vec<PerceptionList> = self.bodies.iter().map(|b| PerceptionList::new(b.dimension)).collect();

        for (task, outcome) in self.tasks.iter().zip(outcomes) {
            let Some(list) = lists.get_mut(task.slot) else {
                continue;
            };
            let Some(outcome) = outcome else {
                list.mark_incomplete();
                continue;
            };
            match outcome.result {
                Ok(TaskPayload::Static(percepts)) => {
                    PerceptionMetrics::add(&metrics.static_percepts, percepts.len());
                    percepts.into_iter().for_each(|p| list.add_static_perception(p));
                }
                Ok(TaskPayload::Dynamic(percepts)) => {
                    PerceptionMetrics::add(&metrics.dynamic_percepts, percepts.len());
                    percepts.into_iter().for_each(|p| list.add_dynamic_perception(p));
                }
                Ok(TaskPayload::Ground(Some(ground))) => {
                    PerceptionMetrics::add(&metrics.ground_percepts, 1);
                    list.set_ground_perception(ground);
                }
                Ok(TaskPayload::Ground(None)) => {}
                Err(e) => {
                    error!("{}", e);
                    PerceptionMetrics::add(&metrics.tasks_failed, 1);
                    list.mark_incomplete();
                }
            }
        }

        let mut map = PerceptionMap::with_capacity(lists.len());
        for (slot, list) in self.bodies.iter().zip(lists) {
            if !list.is_complete() {
                PerceptionMetrics::add(&metrics.bodies_incomplete, 1);
            }
            map.insert(slot.body, list);
        }
        PerceptionMetrics::add(&metrics.bodies_perceived, self.bodies.len());
        map
    }
}
