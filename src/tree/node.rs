use smallvec::SmallVec;

use crate::geom::Aabb;
use crate::world::entity::WorldEntity;

slotmap::new_key_type! {
    /// Generational handle of a tree node. A handle to a node that has since
    /// been removed resolves to nothing instead of to a recycled slot.
    pub struct NodeId;
}

/// Side of a cut plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Left,
    Right,
    /// Straddling the cut plane (icosep trees only)
    Icosep,
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::Left, Zone::Right, Zone::Icosep];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Zone::Left => 0,
            Zone::Right => 1,
            Zone::Icosep => 2,
        }
    }
}

/// Axis-aligned cut plane `x[axis] = coordinate`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutPlane {
    pub axis: usize,
    pub coordinate: f32,
}

impl CutPlane {
    pub fn new(axis: usize, coordinate: f32) -> Self {
        Self { axis, coordinate }
    }
}

/// Child slots indexed by [`Zone::index`]; empty zones stay `None`
pub type ChildSlots = SmallVec<[Option<NodeId>; 3]>;

#[derive(Debug, Clone)]
pub enum NodeContent<const D: usize> {
    /// Ordered entity payload
    Leaf(Vec<WorldEntity<D>>),
    Split { cut: CutPlane, children: ChildSlots },
}

/// Tree node stored in the tree's arena
#[derive(Debug, Clone)]
pub struct SpatialNode<const D: usize> {
    pub(crate) bounds: Aabb<D>,
    pub(crate) parent: Option<NodeId>,
    /// Position in the parent, `None` for the root
    pub(crate) zone: Option<Zone>,
    pub(crate) content: NodeContent<D>,
}

impl<const D: usize> SpatialNode<D> {
    pub(crate) fn leaf(bounds: Aabb<D>, entities: Vec<WorldEntity<D>>) -> Self {
        Self {
            bounds,
            parent: None,
            zone: None,
            content: NodeContent::Leaf(entities),
        }
    }

    pub(crate) fn split(bounds: Aabb<D>, cut: CutPlane, arity: usize) -> Self {
        Self {
            bounds,
            parent: None,
            zone: None,
            content: NodeContent::Split {
                cut,
                children: SmallVec::from_elem(None, arity),
            },
        }
    }

    /// Every entity below this node lies inside these bounds.
    #[inline]
    pub fn bounds(&self) -> &Aabb<D> {
        &self.bounds
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn zone(&self) -> Option<Zone> {
        self.zone
    }

    #[inline]
    pub fn content(&self) -> &NodeContent<D> {
        &self.content
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.content, NodeContent::Leaf(_))
    }

    /// Leaf payload, empty for split nodes
    pub fn entities(&self) -> &[WorldEntity<D>] {
        match &self.content {
            NodeContent::Leaf(entities) => entities,
            NodeContent::Split { .. } => &[],
        }
    }

    pub fn cut(&self) -> Option<CutPlane> {
        match &self.content {
            NodeContent::Leaf(_) => None,
            NodeContent::Split { cut, .. } => Some(*cut),
        }
    }

    pub fn child(&self, zone: Zone) -> Option<NodeId> {
        match &self.content {
            NodeContent::Leaf(_) => None,
            NodeContent::Split { children, .. } => children.get(zone.index()).copied().flatten(),
        }
    }

    /// Existing children in zone order (left, right, icosep)
    pub fn children(&self) -> impl Iterator<Item = (Zone, NodeId)> + '_ {
        let slots: &[Option<NodeId>] = match &self.content {
            NodeContent::Leaf(_) => &[],
            NodeContent::Split { children, .. } => children,
        };
        slots
            .iter()
            .zip(Zone::ALL)
            .filter_map(|(slot, zone)| slot.map(|id| (zone, id)))
    }
}
