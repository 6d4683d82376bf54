//! Partition policies: where to cut a region
//!
//! The builder and the manipulator ask a policy for a cut, try it, and hand it
//! back in `rejected` when it turns out unproductive (every entity landing in
//! the same zone). A policy returns `None` once it has nothing new to offer,
//! which turns the region into a leaf.

use super::node::CutPlane;
use super::shape::ZoneShape;
use crate::geom::Aabb;

pub trait PartitionPolicy<const D: usize>: Send + Sync {
    fn select_cut(&self, region: &Aabb<D>, members: &[Aabb<D>], rejected: &[CutPlane]) -> Option<CutPlane>;
}

/// Cut through the middle of the region, widest axis first
#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialMedian;

impl<const D: usize> PartitionPolicy<D> for SpatialMedian {
    fn select_cut(&self, region: &Aabb<D>, _members: &[Aabb<D>], rejected: &[CutPlane]) -> Option<CutPlane> {
        let mut axes: Vec<usize> = (0..D).collect();
        axes.sort_by(|&a, &b| region.extent(b).total_cmp(&region.extent(a)));

        axes.into_iter()
            .filter(|&axis| region.extent(axis) > 0.0)
            .map(|axis| CutPlane::new(axis, region.center_on(axis)))
            .find(|cut| !rejected.contains(cut))
    }
}

/// Cut at the median of the member centres, on the axis where the centres
/// are most spread out first
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtentMedian;

impl ExtentMedian {
    fn median(values: &mut [f32]) -> f32 {
        values.sort_by(f32::total_cmp);
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) * 0.5
        } else {
            values[mid]
        }
    }
}

impl<const D: usize> PartitionPolicy<D> for ExtentMedian {
    fn select_cut(&self, _region: &Aabb<D>, members: &[Aabb<D>], rejected: &[CutPlane]) -> Option<CutPlane> {
        if members.len() < 2 {
            return None;
        }

        let mut spreads: Vec<(usize, f32)> = (0..D)
            .map(|axis| {
                let (lo, hi) = members.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), b| {
                    let c = b.center_on(axis);
                    (lo.min(c), hi.max(c))
                });
                (axis, hi - lo)
            })
            .filter(|&(_, spread)| spread > 0.0)
            .collect();
        spreads.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut centres = Vec::with_capacity(members.len());
        for (axis, _) in spreads {
            centres.clear();
            centres.extend(members.iter().map(|b| b.center_on(axis)));
            let cut = CutPlane::new(axis, Self::median(&mut centres));
            if !rejected.contains(&cut) {
                return Some(cut);
            }
        }
        None
    }
}

/// Always the same plane; mostly useful to reproduce a known layout
#[derive(Debug, Clone, Copy)]
pub struct FixedCut(pub CutPlane);

impl<const D: usize> PartitionPolicy<D> for FixedCut {
    fn select_cut(&self, _region: &Aabb<D>, _members: &[Aabb<D>], rejected: &[CutPlane]) -> Option<CutPlane> {
        if self.0.axis >= D || rejected.contains(&self.0) {
            None
        } else {
            Some(self.0)
        }
    }
}

/// Upper bound on cuts tried for one region, for policies that never give up
const MAX_CUT_ATTEMPTS: usize = 32;

/// Member positions per zone, indexed by `Zone::index`
pub(crate) type ZoneGroups = [Vec<usize>; 3];

/// Ask `policy` for cuts until one sends members to at least two zones.
///
/// `excluded` is rejected up front (the parent cut of an ICOSEP child).
/// Returns the cut with the positions in `members` grouped by zone, or `None`
/// when the region cannot be split.
pub(crate) fn productive_cut<const D: usize, Z: ZoneShape>(
    policy: &dyn PartitionPolicy<D>,
    region: &Aabb<D>,
    members: &[Aabb<D>],
    excluded: Option<CutPlane>,
) -> Option<(CutPlane, ZoneGroups)> {
    if members.len() < 2 {
        return None;
    }
    let mut rejected: Vec<CutPlane> = excluded.into_iter().collect();

    for _ in 0..MAX_CUT_ATTEMPTS {
        let cut = policy.select_cut(region, members, &rejected)?;
        let mut groups: ZoneGroups = Default::default();
        for (position, bounds) in members.iter().enumerate() {
            groups[Z::classify(&cut, bounds).index()].push(position);
        }
        if groups.iter().filter(|g| !g.is_empty()).count() >= 2 {
            return Some((cut, groups));
        }
        rejected.push(cut);
    }
    None
}
