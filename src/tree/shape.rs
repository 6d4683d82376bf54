//! Zone shapes: how a node distributes entities around its cut plane
//!
//! - [`Binary`]: two children. Straddling entities follow their centre and the
//!   receiving child grows to hold them.
//! - [`Icosep`]: three children. Straddling entities go to a dedicated ICOSEP
//!   child, so LEFT and RIGHT stay strictly on their side of the plane.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::node::{CutPlane, Zone};
use crate::geom::Aabb;

pub trait ZoneShape: fmt::Debug + Clone + Copy + Default + Send + Sync + 'static {
    /// Child slots per split node
    const ARITY: usize;
    const KIND: TreeShape;

    /// Zone of `bounds` relative to `cut`.
    fn classify<const D: usize>(cut: &CutPlane, bounds: &Aabb<D>) -> Zone;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Binary;

#[derive(Debug, Clone, Copy, Default)]
pub struct Icosep;

impl ZoneShape for Binary {
    const ARITY: usize = 2;
    const KIND: TreeShape = TreeShape::Binary;

    fn classify<const D: usize>(cut: &CutPlane, bounds: &Aabb<D>) -> Zone {
        let (lower, upper) = bounds.range(cut.axis);
        if upper < cut.coordinate {
            Zone::Left
        } else if lower > cut.coordinate {
            Zone::Right
        } else if (lower + upper) * 0.5 < cut.coordinate {
            Zone::Left
        } else {
            Zone::Right
        }
    }
}

impl ZoneShape for Icosep {
    const ARITY: usize = 3;
    const KIND: TreeShape = TreeShape::Icosep;

    fn classify<const D: usize>(cut: &CutPlane, bounds: &Aabb<D>) -> Zone {
        let (lower, upper) = bounds.range(cut.axis);
        if upper < cut.coordinate {
            Zone::Left
        } else if lower > cut.coordinate {
            Zone::Right
        } else {
            Zone::Icosep
        }
    }
}

/// Split `parent` at `cut` and return the part covering `zone`.
///
/// The ICOSEP zone has no bounded geometric sub-region: callers fall back to
/// the bounds of the straddling entities themselves.
pub fn refine_bounds<const D: usize>(parent: &Aabb<D>, zone: Zone, cut: &CutPlane) -> Option<Aabb<D>> {
    if cut.axis >= D {
        return None;
    }
    let coordinate = cut.coordinate.clamp(parent.min[cut.axis], parent.max[cut.axis]);
    let mut child = *parent;
    match zone {
        Zone::Left => child.max[cut.axis] = coordinate,
        Zone::Right => child.min[cut.axis] = coordinate,
        Zone::Icosep => return None,
    }
    Some(child)
}

/// Bounds of a freshly created child: the refined region grown to its members,
/// or exactly the members when the zone cannot be refined.
pub(crate) fn child_bounds<const D: usize>(
    parent: &Aabb<D>,
    zone: Zone,
    cut: &CutPlane,
    members: &Aabb<D>,
) -> Aabb<D> {
    match refine_bounds(parent, zone, cut) {
        Some(region) => region.union(members),
        None => *members,
    }
}

/// Runtime choice between the zone shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeShape {
    Binary,
    Icosep,
}

impl fmt::Display for TreeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeShape::Binary => f.write_str("binary"),
            TreeShape::Icosep => f.write_str("icosep"),
        }
    }
}

impl FromStr for TreeShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(TreeShape::Binary),
            "icosep" => Ok(TreeShape::Icosep),
            other => Err(format!("unknown tree shape '{}'", other)),
        }
    }
}
