//! Lazy frustum culling over perception trees
//!
//! [`FrustumCuller`] is a single-use iterator: it walks a tree once for one
//! frustum and yields every entity whose bounds intersect it, after the
//! body's physical alterator and interest filter had their say.
//!
//! Two walks are available:
//! - top-down from the root;
//! - bottom-up from a known node (the perceiver's own leaf, or the leaf
//!   holding the frustum eye), then climbing through the ancestors and
//!   walking the sibling subtrees at each level. Nearby entities come first,
//!   the set is the same.

use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::geom::{Frustum, IntersectionType};
use crate::tree::{NodeId, PerceptionTree, Zone};
use crate::world::body::{InterestFilter, PhysicalPerceptionAlterator};
use crate::world::entity::WorldEntity;

/// Walk order of a culler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Traversal {
    TopDown,
    BottomUp,
}

/// One culled entity
#[derive(Debug, Clone, Copy)]
pub struct CullingResult<'a, const D: usize> {
    pub entity: &'a WorldEntity<D>,
    /// Classification after the physical alterator
    pub classification: IntersectionType,
    pub visible: bool,
}

pub struct FrustumCuller<'a, const D: usize, T: PerceptionTree<D> + ?Sized> {
    tree: &'a T,
    frustum: &'a dyn Frustum<D>,
    alterator: Option<&'a dyn PhysicalPerceptionAlterator<D>>,
    interest: Option<&'a dyn InterestFilter<D>>,
    /// Subtrees left to walk, flagged when already known to be inside
    stack: Vec<(NodeId, bool)>,
    /// Leaf being emitted
    leaf: Option<(&'a [WorldEntity<D>], bool)>,
    cursor: usize,
    /// Bottom-up only: last node whose siblings were queued
    climb_from: Option<NodeId>,
}

impl<'a, const D: usize, T: PerceptionTree<D> + ?Sized> FrustumCuller<'a, D, T> {
    pub fn new(tree: &'a T, frustum: &'a dyn Frustum<D>, traversal: Traversal, start: Option<NodeId>) -> Self {
        match traversal {
            Traversal::TopDown => Self::top_down(tree, frustum),
            Traversal::BottomUp => Self::bottom_up(tree, frustum, start),
        }
    }

    pub fn top_down(tree: &'a T, frustum: &'a dyn Frustum<D>) -> Self {
        Self {
            tree,
            frustum,
            alterator: None,
            interest: None,
            stack: tree.root().map(|root| (root, false)).into_iter().collect(),
            leaf: None,
            cursor: 0,
            climb_from: None,
        }
    }

    /// Walk from `start` outwards. A missing or stale start falls back to the
    /// deepest node holding the frustum eye, then to the root.
    pub fn bottom_up(tree: &'a T, frustum: &'a dyn Frustum<D>, start: Option<NodeId>) -> Self {
        let start = start
            .filter(|&node| tree.node(node).is_some())
            .or_else(|| tree.descend_to(&frustum.eye()))
            .or_else(|| tree.root());
        Self {
            tree,
            frustum,
            alterator: None,
            interest: None,
            stack: start.map(|node| (node, false)).into_iter().collect(),
            leaf: None,
            cursor: 0,
            climb_from: start,
        }
    }

    pub fn with_perception_filter(mut self, alterator: Option<&'a dyn PhysicalPerceptionAlterator<D>>) -> Self {
        self.alterator = alterator;
        self
    }

    pub fn with_interest_filter(mut self, interest: Option<&'a dyn InterestFilter<D>>) -> Self {
        self.interest = interest;
        self
    }

    fn visit(&mut self, id: NodeId, inside_known: bool) {
        let Some(node) = self.tree.node(id) else {
            return;
        };
        let inside = inside_known
            || match self.frustum.classify(node.bounds()) {
                IntersectionType::Outside => return,
                IntersectionType::Inside => true,
                IntersectionType::Enclosing | IntersectionType::Spanning => false,
            };

        if node.is_leaf() {
            self.leaf = Some((node.entities(), inside));
            self.cursor = 0;
        } else {
            let children: SmallVec<[(Zone, NodeId); 3]> = node.children().collect();
            // Reversed so LEFT pops first
            self.stack.extend(children.into_iter().rev().map(|(_, child)| (child, inside)));
        }
    }

    /// Queue the siblings of the current climb node and move one level up.
    fn climb(&mut self) -> bool {
        let Some(from) = self.climb_from.take() else {
            return false;
        };
        let Some(parent_id) = self.tree.node(from).and_then(|n| n.parent()) else {
            return false;
        };
        let Some(parent) = self.tree.node(parent_id) else {
            return false;
        };
        let siblings: SmallVec<[(Zone, NodeId); 3]> =
            parent.children().filter(|&(_, child)| child != from).collect();
        self.stack.extend(siblings.into_iter().rev().map(|(_, child)| (child, false)));
        self.climb_from = Some(parent_id);
        true
    }

    fn evaluate(&self, entity: &'a WorldEntity<D>, inside: bool) -> Option<CullingResult<'a, D>> {
        let raw = if inside {
            IntersectionType::Inside
        } else {
            self.frustum.classify(&entity.bounds)
        };
        if raw == IntersectionType::Outside {
            return None;
        }

        let frustum = self.frustum.id();
        let classification = match self.alterator {
            Some(alterator) => alterator.alter(&entity.bounds, entity, raw, frustum),
            None => raw,
        };
        if let Some(interest) = self.interest {
            if !interest.accept(&entity.bounds, entity, classification, frustum) {
                return None;
            }
        }
        Some(CullingResult {
            entity,
            classification,
            visible: classification.is_visible(),
        })
    }
}

impl<'a, const D: usize, T: PerceptionTree<D> + ?Sized> Iterator for FrustumCuller<'a, D, T> {
    type Item = CullingResult<'a, D>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((entities, inside)) = self.leaf {
                while let Some(entity) = entities.get(self.cursor) {
                    self.cursor += 1;
                    if let Some(result) = self.evaluate(entity, inside) {
                        return Some(result);
                    }
                }
                self.leaf = None;
            }

            if let Some((id, inside)) = self.stack.pop() {
                self.visit(id, inside);
                continue;
            }
            if !self.climb() {
                return None;
            }
        }
    }
}

impl<'a, const D: usize, T: PerceptionTree<D> + ?Sized> FusedIterator for FrustumCuller<'a, D, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Aabb, BoxFrustum, SphericalFrustum};
    use crate::tree::{Binary, DynamicTree, ExtentMedian, Icosep, StaticTree, TreeBuilder, TreeManipulator};
    use crate::world::body::{RangeLimit, TagInterest};
    use crate::world::entity::{EntityId, FrustumId};
    use hashbrown::HashSet;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scenario() -> Vec<WorldEntity<2>> {
        vec![
            WorldEntity::spawn(Aabb::new([0.0, 0.0], [1.0, 1.0])).with_tag("b1"),
            WorldEntity::spawn(Aabb::new([5.0, 5.0], [6.0, 6.0])).with_tag("b2"),
            WorldEntity::spawn(Aabb::new([0.5, 0.5], [1.5, 1.5])).with_tag("b3"),
        ]
    }

    fn tags<'a, I>(results: I) -> HashSet<String>
    where
        I: Iterator<Item = CullingResult<'a, 2>>,
    {
        results
            .filter(|r| r.visible)
            .flat_map(|r| r.entity.tags.iter().cloned())
            .collect()
    }

    fn ids<'a, const D: usize, I>(results: I) -> HashSet<EntityId>
    where
        I: Iterator<Item = CullingResult<'a, D>>,
    {
        results.map(|r| r.entity.id).collect()
    }

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_binary_scenario_culling() {
        let tree: StaticTree<2, Binary> = TreeBuilder::new(1, ExtentMedian).build(scenario());
        let near = BoxFrustum::new(Aabb::new([0.0, 0.0], [2.0, 2.0]));
        let far = BoxFrustum::new(Aabb::new([4.0, 4.0], [7.0, 7.0]));
        assert_eq!(tags(FrustumCuller::top_down(&tree, &near)), set(&["b1", "b3"]));
        assert_eq!(tags(FrustumCuller::top_down(&tree, &far)), set(&["b2"]));
    }

    #[test]
    fn test_icosep_scenario_culling() {
        let tree: StaticTree<2, Icosep> = TreeBuilder::new(1, ExtentMedian).build(scenario());
        let near = BoxFrustum::new(Aabb::new([0.0, 0.0], [2.0, 2.0]));
        assert_eq!(tags(FrustumCuller::top_down(&tree, &near)), set(&["b1", "b3"]));
    }

    #[test]
    fn test_disjoint_frustum_yields_nothing() {
        let tree: StaticTree<2, Binary> = TreeBuilder::new(1, ExtentMedian).build(scenario());
        let away = BoxFrustum::new(Aabb::new([50.0, 50.0], [60.0, 60.0]));
        assert_eq!(FrustumCuller::top_down(&tree, &away).count(), 0);
        assert_eq!(FrustumCuller::bottom_up(&tree, &away, None).count(), 0);
    }

    #[test]
    fn test_enclosing_frustum_yields_everything_as_inside() {
        let tree: StaticTree<2, Binary> = TreeBuilder::new(1, ExtentMedian).build(scenario());
        let all = BoxFrustum::new(Aabb::new([-10.0, -10.0], [10.0, 10.0]));
        let results: Vec<_> = FrustumCuller::top_down(&tree, &all).collect();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.classification == IntersectionType::Inside && r.visible));
    }

    #[test]
    fn test_inside_subtree_skips_entity_tests() {
        struct Counting {
            inner: BoxFrustum<2>,
            calls: AtomicUsize,
        }
        impl Frustum<2> for Counting {
            fn id(&self) -> FrustumId {
                self.inner.id()
            }
            fn bounds(&self) -> Aabb<2> {
                self.inner.bounds()
            }
            fn eye(&self) -> [f32; 2] {
                self.inner.eye()
            }
            fn classify(&self, bounds: &Aabb<2>) -> IntersectionType {
                self.calls.fetch_add(1, Ordering::Relaxed);
                self.inner.classify(bounds)
            }
        }

        let entities: Vec<_> = (0..20)
            .map(|i| WorldEntity::spawn(Aabb::new([i as f32 * 0.1, 0.0], [i as f32 * 0.1 + 0.05, 0.05])))
            .collect();
        let tree: StaticTree<2, Binary> = TreeBuilder::new(32, ExtentMedian).build(entities);
        let frustum = Counting {
            inner: BoxFrustum::new(Aabb::new([-1.0, -1.0], [5.0, 5.0])),
            calls: AtomicUsize::new(0),
        };
        assert_eq!(FrustumCuller::top_down(&tree, &frustum).count(), 20);
        // Root leaf tested once, its entities not at all
        assert_eq!(frustum.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_filters_apply_in_order() {
        let tree: StaticTree<2, Binary> = TreeBuilder::new(1, ExtentMedian).build(scenario());
        let all = BoxFrustum::new(Aabb::new([-10.0, -10.0], [10.0, 10.0]));

        let only_b2 = TagInterest::new(["b2"]);
        let culled: Vec<_> = FrustumCuller::top_down(&tree, &all)
            .with_interest_filter(Some(&only_b2))
            .collect();
        assert_eq!(culled.len(), 1);
        assert!(culled[0].entity.has_tag("b2"));

        // Fog hides B2, which is still yielded but no longer visible
        let fog = RangeLimit { origin: [0.0, 0.0], range: 3.0 };
        let culled: Vec<_> = FrustumCuller::top_down(&tree, &all)
            .with_perception_filter(Some(&fog))
            .collect();
        assert_eq!(culled.len(), 3);
        let hidden: Vec<_> = culled.iter().filter(|r| !r.visible).collect();
        assert_eq!(hidden.len(), 1);
        assert!(hidden[0].entity.has_tag("b2"));
        assert_eq!(hidden[0].classification, IntersectionType::Outside);
    }

    #[test]
    fn test_bottom_up_matches_top_down() {
        let mut rng = StdRng::seed_from_u64(3);
        let world = Aabb::new([0.0, 0.0], [100.0, 100.0]);
        let entities = crate::scenario::random_entities(&mut rng, 400, &world, 4.0);

        let static_tree: StaticTree<2, Icosep> = TreeBuilder::new(4, ExtentMedian).build(entities.clone());
        let mut dynamic: DynamicTree<2, Binary> = DynamicTree::new(4);
        for e in &entities {
            dynamic.insert(e.clone()).unwrap();
        }

        for (i, e) in entities.iter().enumerate().step_by(37) {
            let frustum = SphericalFrustum::new(e.bounds.center(), 5.0 + i as f32 * 0.1);
            let top = ids(FrustumCuller::top_down(&static_tree, &frustum));
            let bottom = ids(FrustumCuller::bottom_up(&static_tree, &frustum, None));
            assert_eq!(top, bottom);

            let start = dynamic.locate(e.id);
            let top = ids(FrustumCuller::top_down(&dynamic, &frustum));
            let bottom = ids(FrustumCuller::bottom_up(&dynamic, &frustum, start));
            assert_eq!(top, bottom);
            assert!(bottom.contains(&e.id));
        }
    }

    #[test]
    fn test_bottom_up_yields_nearby_first() {
        let mut tree: DynamicTree<2, Binary> = DynamicTree::new(1);
        let near = WorldEntity::spawn(Aabb::new([90.0, 90.0], [91.0, 91.0]));
        let own = WorldEntity::spawn(Aabb::new([92.0, 92.0], [93.0, 93.0]));
        tree.insert(WorldEntity::spawn(Aabb::new([0.0, 0.0], [1.0, 1.0]))).unwrap();
        tree.insert(near.clone()).unwrap();
        tree.insert(own.clone()).unwrap();

        let everything = BoxFrustum::new(Aabb::new([-5.0, -5.0], [100.0, 100.0]));
        let first = FrustumCuller::bottom_up(&tree, &everything, tree.locate(own.id))
            .next()
            .unwrap();
        assert_eq!(first.entity.id, own.id);
        assert_eq!(FrustumCuller::bottom_up(&tree, &everything, tree.locate(own.id)).count(), 3);
    }

    #[test]
    fn test_bottom_up_stale_start_falls_back() {
        let mut tree: DynamicTree<2, Binary> = DynamicTree::new(1);
        let a = WorldEntity::spawn(Aabb::new([0.0, 0.0], [1.0, 1.0]));
        let b = WorldEntity::spawn(Aabb::new([10.0, 10.0], [11.0, 11.0]));
        tree.insert(a.clone()).unwrap();
        tree.insert(b).unwrap();
        // Removing A empties its leaf, which is dropped from the arena
        let stale = tree.locate(a.id).unwrap();
        tree.remove(a.id).unwrap();
        assert!(tree.node(stale).is_none());
        let everything = BoxFrustum::new(Aabb::new([-5.0, -5.0], [20.0, 20.0]));
        let dyn_tree: &dyn PerceptionTree<2> = &tree;
        assert_eq!(FrustumCuller::bottom_up(dyn_tree, &everything, Some(stale)).count(), 1);
    }
}
