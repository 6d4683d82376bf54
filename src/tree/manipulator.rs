//! Incremental maintenance of dynamic trees
//!
//! Insertion descends along the cut planes, growing node bounds on the way,
//! and refines a leaf in place once its population exceeds the splitting
//! count. Removal collapses parents whose leaf children fit back into a
//! single leaf.

use std::mem;

use smallvec::SmallVec;

use super::node::{NodeContent, NodeId, SpatialNode, Zone};
use super::partition::productive_cut;
use super::shape::{child_bounds, ZoneShape};
use super::DynamicTree;
use crate::geom::Aabb;
use crate::world::entity::{EntityId, WorldEntity};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ManipulatorError {
    #[error("Entity {0} is already in the tree")]
    DuplicateEntity(EntityId),
    #[error("Entity {0} is not in the tree")]
    UnknownEntity(EntityId),
    #[error("Node {0:?} is no longer part of the tree")]
    StaleNode(NodeId),
}

/// Mutation capability of dynamic trees
pub trait TreeManipulator<const D: usize> {
    /// Insert a new entity, returning the node that now holds it.
    fn insert(&mut self, entity: WorldEntity<D>) -> Result<NodeId, ManipulatorError>;

    fn remove(&mut self, id: EntityId) -> Result<WorldEntity<D>, ManipulatorError>;

    /// Split an over-populated leaf in place. Returns false when the node is
    /// not a leaf, fits the splitting count or has no productive cut.
    fn refine(&mut self, node: NodeId) -> bool;

    /// Move a mobile entity to its new bounds.
    fn relocate(&mut self, entity: WorldEntity<D>) -> Result<NodeId, ManipulatorError> {
        self.remove(entity.id)?;
        self.insert(entity)
    }
}

impl<const D: usize, Z: ZoneShape> TreeManipulator<D> for DynamicTree<D, Z> {
    fn insert(&mut self, entity: WorldEntity<D>) -> Result<NodeId, ManipulatorError> {
        if self.locations.contains_key(&entity.id) {
            return Err(ManipulatorError::DuplicateEntity(entity.id));
        }
        let id = entity.id;
        let bounds = entity.bounds;

        let Some(mut current) = self.core.root else {
            let leaf = self.core.attach(SpatialNode::leaf(bounds, vec![entity]), None);
            self.locations.insert(id, leaf);
            self.core.len += 1;
            return Ok(leaf);
        };

        let leaf = loop {
            let node = self
                .core
                .nodes
                .get_mut(current)
                .ok_or(ManipulatorError::StaleNode(current))?;
            node.bounds.expand_to(&bounds);
            let node_bounds = node.bounds;

            match &mut node.content {
                NodeContent::Leaf(entities) => {
                    entities.push(entity);
                    break current;
                }
                NodeContent::Split { cut, children } => {
                    let cut = *cut;
                    let zone = Z::classify(&cut, &bounds);
                    match children.get(zone.index()).copied().flatten() {
                        Some(child) => current = child,
                        None => {
                            let child = SpatialNode::leaf(child_bounds(&node_bounds, zone, &cut, &bounds), vec![entity]);
                            break self.core.attach(child, Some((current, zone)));
                        }
                    }
                }
            }
        };

        self.locations.insert(id, leaf);
        self.core.len += 1;

        let population = self.core.nodes.get(leaf).map_or(0, |n| n.entities().len());
        if population > self.splitting_count {
            self.refine(leaf);
        }
        self.locations
            .get(&id)
            .copied()
            .ok_or(ManipulatorError::UnknownEntity(id))
    }

    fn remove(&mut self, id: EntityId) -> Result<WorldEntity<D>, ManipulatorError> {
        let node_id = self.locations.remove(&id).ok_or(ManipulatorError::UnknownEntity(id))?;
        let node = self
            .core
            .nodes
            .get_mut(node_id)
            .ok_or(ManipulatorError::StaleNode(node_id))?;
        let NodeContent::Leaf(entities) = &mut node.content else {
            return Err(ManipulatorError::StaleNode(node_id));
        };
        let position = entities
            .iter()
            .position(|e| e.id == id)
            .ok_or(ManipulatorError::UnknownEntity(id))?;
        let entity = entities.remove(position);
        let now_empty = entities.is_empty();
        let parent = node.parent;
        self.core.len -= 1;

        if self.core.len == 0 {
            self.core.nodes.clear();
            self.core.root = None;
            return Ok(entity);
        }

        if now_empty {
            if let Some(parent_id) = parent {
                self.detach(node_id);
                self.collapse_upwards(parent_id);
            }
        } else if let Some(parent_id) = parent {
            self.collapse_upwards(parent_id);
        }
        Ok(entity)
    }

    fn refine(&mut self, node_id: NodeId) -> bool {
        let mut refined = false;
        let mut work = vec![node_id];

        while let Some(id) = work.pop() {
            let Some(node) = self.core.nodes.get(id) else {
                continue;
            };
            if !node.is_leaf() || node.entities().len() <= self.splitting_count {
                continue;
            }
            if !self.icosep_split && node.zone == Some(Zone::Icosep) {
                continue;
            }
            let bounds = node.bounds;
            let excluded = match (node.zone, node.parent) {
                (Some(Zone::Icosep), Some(parent)) => self.core.nodes.get(parent).and_then(|p| p.cut()),
                _ => None,
            };
            let boxes: Vec<Aabb<D>> = node.entities().iter().map(|e| e.bounds).collect();
            let Some((cut, groups)) = productive_cut::<D, Z>(self.policy.as_ref(), &bounds, &boxes, excluded) else {
                continue;
            };

            let Some(node) = self.core.nodes.get_mut(id) else {
                continue;
            };
            let split = NodeContent::Split {
                cut,
                children: SmallVec::from_elem(None, Z::ARITY),
            };
            let previous = mem::replace(&mut node.content, split);
            let NodeContent::Leaf(entities) = previous else {
                continue;
            };
            let mut slots: Vec<Option<WorldEntity<D>>> = entities.into_iter().map(Some).collect();

            for zone in Zone::ALL.iter().take(Z::ARITY).copied() {
                let members: Vec<WorldEntity<D>> = groups[zone.index()]
                    .iter()
                    .filter_map(|&p| slots.get_mut(p).and_then(Option::take))
                    .collect();
                let Some(member_bounds) = Aabb::union_all(members.iter().map(|e| &e.bounds)) else {
                    continue;
                };
                let population = members.len();
                let ids: Vec<EntityId> = members.iter().map(|e| e.id).collect();
                let child = SpatialNode::leaf(child_bounds(&bounds, zone, &cut, &member_bounds), members);
                let child_id = self.core.attach(child, Some((id, zone)));
                for entity in ids {
                    self.locations.insert(entity, child_id);
                }
                if population > self.splitting_count {
                    work.push(child_id);
                }
            }
            refined = true;
        }
        refined
    }
}

impl<const D: usize, Z: ZoneShape> DynamicTree<D, Z> {
    /// Drop `node` (and anything under it) from its parent's slots.
    fn detach(&mut self, node: NodeId) {
        let Some(removed) = self.core.nodes.remove(node) else {
            return;
        };
        let mut orphans: Vec<NodeId> = removed.children().map(|(_, c)| c).collect();
        while let Some(orphan) = orphans.pop() {
            if let Some(n) = self.core.nodes.remove(orphan) {
                orphans.extend(n.children().map(|(_, c)| c));
            }
        }
        if let (Some(parent), Some(zone)) = (removed.parent, removed.zone) {
            if let Some(NodeContent::Split { children, .. }) = self.core.nodes.get_mut(parent).map(|p| &mut p.content) {
                if let Some(slot) = children.get_mut(zone.index()) {
                    *slot = None;
                }
            }
        }
    }

    /// Collapse `start` and then its ancestors for as long as they fit a leaf.
    fn collapse_upwards(&mut self, start: NodeId) {
        let mut current = Some(start);
        while let Some(id) = current {
            if !self.try_collapse(id) {
                break;
            }
            current = self.core.nodes.get(id).and_then(|n| n.parent);
        }
    }

    /// Merge the children of `id` back into it when they are all leaves and
    /// their total population fits the splitting count.
    fn try_collapse(&mut self, id: NodeId) -> bool {
        let Some(node) = self.core.nodes.get(id) else {
            return false;
        };
        if node.is_leaf() {
            return false;
        }
        let children: Vec<NodeId> = node.children().map(|(_, c)| c).collect();
        let mut total = 0;
        for &child in &children {
            match self.core.nodes.get(child) {
                Some(c) if c.is_leaf() => total += c.entities().len(),
                _ => return false,
            }
        }
        if total > self.splitting_count {
            return false;
        }

        // Zone order: left, right, icosep
        let mut merged = Vec::with_capacity(total);
        for child in children {
            if let Some(SpatialNode { content: NodeContent::Leaf(entities), .. }) = self.core.nodes.remove(child) {
                merged.extend(entities);
            }
        }
        for entity in &merged {
            self.locations.insert(entity.id, id);
        }
        if let Some(node) = self.core.nodes.get_mut(id) {
            node.content = NodeContent::Leaf(merged);
        }
        true
    }
}
