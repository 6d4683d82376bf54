//! Batch construction of static trees
//!
//! Top-down partitioning of the complete entity set. A region becomes a leaf
//! once it holds at most `splitting_count` entities or when the partition
//! policy has no productive cut left for it (coincident entities).

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use super::node::{CutPlane, NodeId, SpatialNode, Zone};
use super::partition::{productive_cut, PartitionPolicy};
use super::shape::{child_bounds, ZoneShape};
use super::{SpatialTree, StaticTree, DEFAULT_SPLITTING_COUNT};
use crate::geom::Aabb;
use crate::world::entity::WorldEntity;

/// Region waiting to be turned into a node
struct PendingRegion<const D: usize> {
    link: Option<(NodeId, Zone)>,
    bounds: Aabb<D>,
    /// Indexes into the builder input
    members: Vec<usize>,
    /// Cut that must not be tried again (parent cut of an ICOSEP child)
    excluded: Option<CutPlane>,
}

pub struct TreeBuilder<const D: usize, Z: ZoneShape> {
    splitting_count: usize,
    policy: Arc<dyn PartitionPolicy<D>>,
    /// When false, ICOSEP children stay leaf collectors whatever their size
    icosep_split: bool,
    _shape: PhantomData<Z>,
}

impl<const D: usize, Z: ZoneShape> TreeBuilder<D, Z> {
    /// `splitting_count` is the maximum number of entities per leaf (at least 1).
    pub fn new(splitting_count: usize, policy: impl PartitionPolicy<D> + 'static) -> Self {
        Self::with_shared_policy(splitting_count, Arc::new(policy))
    }

    pub fn with_shared_policy(splitting_count: usize, policy: Arc<dyn PartitionPolicy<D>>) -> Self {
        Self {
            splitting_count: splitting_count.max(1),
            policy,
            icosep_split: true,
            _shape: PhantomData,
        }
    }

    /// Whether ICOSEP children are partitioned further (the default) or
    /// kept as single leaves.
    pub fn with_icosep_split(mut self, split: bool) -> Self {
        self.icosep_split = split;
        self
    }

    /// Build over the union of the entity bounds.
    pub fn build(&self, entities: Vec<WorldEntity<D>>) -> StaticTree<D, Z> {
        self.build_inner(entities, None)
    }

    /// Build with the root covering at least `world_bounds`.
    pub fn build_within(&self, entities: Vec<WorldEntity<D>>, world_bounds: Aabb<D>) -> StaticTree<D, Z> {
        self.build_inner(entities, Some(world_bounds))
    }

    fn build_inner(&self, entities: Vec<WorldEntity<D>>, world_bounds: Option<Aabb<D>>) -> StaticTree<D, Z> {
        let mut core = SpatialTree::<D, Z>::empty();
        let boxes: Vec<Aabb<D>> = entities.iter().map(|e| e.bounds).collect();
        let Some(mut root_bounds) = Aabb::union_all(boxes.iter()) else {
            return StaticTree::from_core(core);
        };
        if let Some(world) = world_bounds {
            root_bounds.expand_to(&world);
        }

        core.len = entities.len();
        let mut slots: Vec<Option<WorldEntity<D>>> = entities.into_iter().map(Some).collect();
        let mut pending = vec![PendingRegion {
            link: None,
            bounds: root_bounds,
            members: (0..boxes.len()).collect(),
            excluded: None,
        }];

        while let Some(region) = pending.pop() {
            let collector = !self.icosep_split && matches!(region.link, Some((_, Zone::Icosep)));
            let split = if region.members.len() > self.splitting_count && !collector {
                let member_boxes: Vec<Aabb<D>> = region.members.iter().map(|&i| boxes[i]).collect();
                productive_cut::<D, Z>(self.policy.as_ref(), &region.bounds, &member_boxes, region.excluded)
            } else {
                None
            };

            let Some((cut, groups)) = split else {
                let leaf_entities = region.members.iter().filter_map(|&i| slots[i].take()).collect();
                core.attach(SpatialNode::leaf(region.bounds, leaf_entities), region.link);
                continue;
            };

            let id = core.attach(SpatialNode::split(region.bounds, cut, Z::ARITY), region.link);
            // Reversed so that LEFT is built first
            for zone in Zone::ALL.iter().take(Z::ARITY).rev().copied() {
                let group = &groups[zone.index()];
                let members: Vec<usize> = group.iter().map(|&p| region.members[p]).collect();
                let Some(member_bounds) = Aabb::union_all(members.iter().map(|&i| &boxes[i])) else {
                    continue;
                };
                pending.push(PendingRegion {
                    link: Some((id, zone)),
                    bounds: child_bounds(&region.bounds, zone, &cut, &member_bounds),
                    members,
                    excluded: (zone == Zone::Icosep).then_some(cut),
                });
            }
        }

        let tree = StaticTree::from_core(core);
        let stats = tree.stats();
        debug!(
            shape = %Z::KIND,
            entities = stats.entities,
            nodes = stats.nodes,
            leaves = stats.leaves,
            depth = stats.depth,
            "Static tree built"
        );
        tree
    }
}

impl<const D: usize, Z: ZoneShape> Default for TreeBuilder<D, Z> {
    fn default() -> Self {
        Self::new(DEFAULT_SPLITTING_COUNT, super::partition::ExtentMedian)
    }
}
