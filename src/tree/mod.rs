//! BSP trees indexing world entities for frustum culling
//!
//! One arena-backed tree core, parameterized by a [`ZoneShape`]:
//! - [`StaticTree`]: built once from a complete entity set by the
//!   [`TreeBuilder`](builder::TreeBuilder), read-only afterwards.
//! - [`DynamicTree`]: mobile entities, maintained incrementally through the
//!   [`TreeManipulator`](manipulator::TreeManipulator) capability.
//!
//! Both expose the read-only [`PerceptionTree`] view the culler walks.

pub mod builder;
pub mod manipulator;
pub mod node;
pub mod partition;
pub mod shape;

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use hashbrown::HashMap;
use serde::Serialize;
use slotmap::SlotMap;

use crate::geom::Aabb;
use crate::world::entity::{EntityId, WorldEntity};

pub use builder::TreeBuilder;
pub use manipulator::{ManipulatorError, TreeManipulator};
pub use node::{CutPlane, NodeContent, NodeId, SpatialNode, Zone};
pub use partition::{ExtentMedian, FixedCut, PartitionPolicy, SpatialMedian};
pub use shape::{refine_bounds, Binary, Icosep, TreeShape, ZoneShape};

/// Default maximum number of entities per leaf
pub const DEFAULT_SPLITTING_COUNT: usize = 8;

// ============================================================================
// Read-only traversal view
// ============================================================================

/// What the culler needs from a tree
pub trait PerceptionTree<const D: usize>: Send + Sync {
    fn root(&self) -> Option<NodeId>;

    fn node(&self, id: NodeId) -> Option<&SpatialNode<D>>;

    /// Node currently holding `entity`, for trees that track their entities
    fn locate(&self, _entity: EntityId) -> Option<NodeId> {
        None
    }

    fn entity_count(&self) -> usize;

    /// Deepest node whose bounds contain `point`, following the first
    /// matching child at every level. `None` when the point is outside the
    /// root.
    fn descend_to(&self, point: &[f32; D]) -> Option<NodeId> {
        let mut current = self.root()?;
        if !self.node(current)?.bounds().contains_point(point) {
            return None;
        }
        loop {
            let node = self.node(current)?;
            let next = node
                .children()
                .find(|&(_, child)| {
                    self.node(child)
                        .is_some_and(|c| c.bounds().contains_point(point))
                })
                .map(|(_, child)| child);
            match next {
                Some(child) => current = child,
                None => return Some(current),
            }
        }
    }
}

// ============================================================================
// Tree core
// ============================================================================

/// Shape statistics, for monitoring tree quality
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub nodes: usize,
    pub leaves: usize,
    /// Longest root-to-leaf path, in edges
    pub depth: usize,
    pub entities: usize,
    pub max_leaf_population: usize,
}

/// Structural problems reported by [`SpatialTree::check_invariants`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeInvariantError {
    #[error("Entity {entity} escapes the bounds of node {node:?}")]
    EscapesBounds { entity: EntityId, node: NodeId },
    #[error("Node {0:?} does not point back to its parent")]
    BrokenParentLink(NodeId),
    #[error("Entity {entity} sits on the wrong side of the cut of node {node:?}")]
    WrongZone { entity: EntityId, node: NodeId },
    #[error("Tree holds {found} entities but counts {expected}")]
    CountMismatch { expected: usize, found: usize },
}

/// Arena of nodes shared by static and dynamic trees
#[derive(Clone)]
pub struct SpatialTree<const D: usize, Z: ZoneShape> {
    pub(crate) nodes: SlotMap<NodeId, SpatialNode<D>>,
    pub(crate) root: Option<NodeId>,
    /// Number of indexed entities
    pub(crate) len: usize,
    _shape: PhantomData<Z>,
}

impl<const D: usize, Z: ZoneShape> SpatialTree<D, Z> {
    pub(crate) fn empty() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            len: 0,
            _shape: PhantomData,
        }
    }

    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&SpatialNode<D>> {
        self.nodes.get(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn shape(&self) -> TreeShape {
        Z::KIND
    }

    /// Bounds of the whole tree
    pub fn bounds(&self) -> Option<Aabb<D>> {
        self.root.and_then(|r| self.nodes.get(r)).map(|n| n.bounds)
    }

    /// Every indexed entity, in no particular order
    pub fn entities(&self) -> impl Iterator<Item = &WorldEntity<D>> + '_ {
        self.nodes.values().flat_map(|n| n.entities().iter())
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        let Some(root) = self.root else {
            return stats;
        };

        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            stats.nodes += 1;
            stats.depth = stats.depth.max(depth);
            if node.is_leaf() {
                let population = node.entities().len();
                stats.leaves += 1;
                stats.entities += population;
                stats.max_leaf_population = stats.max_leaf_population.max(population);
            } else {
                stack.extend(node.children().map(|(_, child)| (child, depth + 1)));
            }
        }
        stats
    }

    /// Walk the whole tree and check the structural invariants:
    /// - every entity lies inside the bounds of each of its ancestors;
    /// - children point back to their parent;
    /// - in icosep trees, LEFT/RIGHT entities lie strictly on their side;
    /// - the entity count matches.
    pub fn check_invariants(&self) -> Result<(), TreeInvariantError> {
        let Some(root) = self.root else {
            return if self.len == 0 {
                Ok(())
            } else {
                Err(TreeInvariantError::CountMismatch { expected: self.len, found: 0 })
            };
        };

        let mut found = 0;
        // (node, ancestors including itself)
        let mut stack = vec![(root, vec![root])];
        while let Some((id, path)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            for (_, child) in node.children() {
                let linked = self.nodes.get(child).is_some_and(|c| c.parent == Some(id));
                if !linked {
                    return Err(TreeInvariantError::BrokenParentLink(child));
                }
                let mut child_path = path.clone();
                child_path.push(child);
                stack.push((child, child_path));
            }

            for entity in node.entities() {
                found += 1;
                for &ancestor in &path {
                    let Some(a) = self.nodes.get(ancestor) else {
                        continue;
                    };
                    if !a.bounds.contains(&entity.bounds) {
                        return Err(TreeInvariantError::EscapesBounds { entity: entity.id, node: ancestor });
                    }
                }
                if let Some(zone) = self.misplaced_zone(&path, entity) {
                    return Err(TreeInvariantError::WrongZone { entity: entity.id, node: zone });
                }
            }
        }

        if found != self.len {
            return Err(TreeInvariantError::CountMismatch { expected: self.len, found });
        }
        Ok(())
    }

    /// First ancestor whose cut does not route `entity` towards the path taken
    fn misplaced_zone(&self, path: &[NodeId], entity: &WorldEntity<D>) -> Option<NodeId> {
        if Z::KIND != TreeShape::Icosep {
            return None;
        }
        path.windows(2).find_map(|pair| {
            let parent = self.nodes.get(pair[0])?;
            let child = self.nodes.get(pair[1])?;
            let cut = parent.cut()?;
            let expected = Z::classify(&cut, &entity.bounds);
            (child.zone != Some(expected)).then_some(pair[0])
        })
    }

    /// Attach `node` under `parent` at `zone` (or as root) and return its handle.
    pub(crate) fn attach(&mut self, mut node: SpatialNode<D>, link: Option<(NodeId, Zone)>) -> NodeId {
        node.parent = link.map(|(p, _)| p);
        node.zone = link.map(|(_, z)| z);
        let id = self.nodes.insert(node);
        match link {
            Some((parent, zone)) => {
                if let Some(NodeContent::Split { children, .. }) =
                    self.nodes.get_mut(parent).map(|p| &mut p.content)
                {
                    if let Some(slot) = children.get_mut(zone.index()) {
                        *slot = Some(id);
                    }
                }
            }
            None => self.root = Some(id),
        }
        id
    }
}

impl<const D: usize, Z: ZoneShape> fmt::Debug for SpatialTree<D, Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialTree")
            .field("shape", &Z::KIND)
            .field("nodes", &self.nodes.len())
            .field("entities", &self.len)
            .finish()
    }
}

impl<const D: usize, Z: ZoneShape> PerceptionTree<D> for SpatialTree<D, Z> {
    fn root(&self) -> Option<NodeId> {
        self.root
    }

    fn node(&self, id: NodeId) -> Option<&SpatialNode<D>> {
        self.nodes.get(id)
    }

    fn entity_count(&self) -> usize {
        self.len
    }
}

// ============================================================================
// Static trees
// ============================================================================

/// Immutable tree of static entities, only rebuilt wholesale
#[derive(Debug, Clone)]
pub struct StaticTree<const D: usize, Z: ZoneShape = Binary> {
    core: SpatialTree<D, Z>,
}

impl<const D: usize, Z: ZoneShape> StaticTree<D, Z> {
    pub(crate) fn from_core(core: SpatialTree<D, Z>) -> Self {
        Self { core }
    }

    /// Tree without any entity
    pub fn empty() -> Self {
        Self::from_core(SpatialTree::empty())
    }
}

impl<const D: usize, Z: ZoneShape> Deref for StaticTree<D, Z> {
    type Target = SpatialTree<D, Z>;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl<const D: usize, Z: ZoneShape> PerceptionTree<D> for StaticTree<D, Z> {
    fn root(&self) -> Option<NodeId> {
        self.core.root
    }

    fn node(&self, id: NodeId) -> Option<&SpatialNode<D>> {
        self.core.nodes.get(id)
    }

    fn entity_count(&self) -> usize {
        self.core.len
    }
}

// ============================================================================
// Dynamic trees
// ============================================================================

/// Incrementally maintained tree of mobile entities
///
/// Tracks the node of every entity through generational handles, so a node
/// restructured away by a later refinement or collapse reads as "not found".
/// Cloning is cheap enough for copy-on-write through `Arc::make_mut`.
#[derive(Clone)]
pub struct DynamicTree<const D: usize, Z: ZoneShape = Binary> {
    pub(crate) core: SpatialTree<D, Z>,
    pub(crate) locations: HashMap<EntityId, NodeId>,
    /// Maximum entities per leaf before refinement
    pub(crate) splitting_count: usize,
    pub(crate) policy: Arc<dyn PartitionPolicy<D>>,
    /// When false, refinement leaves ICOSEP children as collectors
    pub(crate) icosep_split: bool,
}

impl<const D: usize, Z: ZoneShape> DynamicTree<D, Z> {
    /// Empty tree cutting at the median of entity centres
    pub fn new(splitting_count: usize) -> Self {
        Self::with_policy(splitting_count, ExtentMedian)
    }

    pub fn with_policy(splitting_count: usize, policy: impl PartitionPolicy<D> + 'static) -> Self {
        Self {
            core: SpatialTree::empty(),
            locations: HashMap::new(),
            splitting_count: splitting_count.max(1),
            policy: Arc::new(policy),
            icosep_split: true,
        }
    }

    /// Same switch as [`TreeBuilder::with_icosep_split`]
    pub fn with_icosep_split(mut self, split: bool) -> Self {
        self.icosep_split = split;
        self
    }

    pub fn splitting_count(&self) -> usize {
        self.splitting_count
    }

    pub fn icosep_split(&self) -> bool {
        self.icosep_split
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.locations.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&WorldEntity<D>> {
        let node = self.core.nodes.get(*self.locations.get(&id)?)?;
        node.entities().iter().find(|e| e.id == id)
    }

    /// Every node handle points at a leaf holding its entity
    pub fn check_locations(&self) -> bool {
        self.locations.len() == self.core.len
            && self.locations.iter().all(|(id, &node)| {
                self.core
                    .nodes
                    .get(node)
                    .is_some_and(|n| n.entities().iter().any(|e| e.id == *id))
            })
    }
}

impl<const D: usize, Z: ZoneShape> Deref for DynamicTree<D, Z> {
    type Target = SpatialTree<D, Z>;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl<const D: usize, Z: ZoneShape> fmt::Debug for DynamicTree<D, Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicTree")
            .field("core", &self.core)
            .field("splitting_count", &self.splitting_count)
            .finish()
    }
}

impl<const D: usize, Z: ZoneShape> PerceptionTree<D> for DynamicTree<D, Z> {
    fn root(&self) -> Option<NodeId> {
        self.core.root
    }

    fn node(&self, id: NodeId) -> Option<&SpatialNode<D>> {
        self.core.nodes.get(id)
    }

    fn locate(&self, entity: EntityId) -> Option<NodeId> {
        self.locations
            .get(&entity)
            .copied()
            .filter(|&node| self.core.nodes.contains_key(node))
    }

    fn entity_count(&self) -> usize {
        self.core.len
    }
}
