//! Axis-aligned bounding boxes over `D` dimensions
//!
//! Every bound in the perception trees is an [`Aabb`]: entity extents, node
//! regions and frustum envelopes. Boxes are closed (boundaries belong to the
//! box), so two boxes that only touch still intersect.

/// Closed axis-aligned box with `min[i] <= max[i]` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb<const D: usize> {
    pub min: [f32; D],
    pub max: [f32; D],
}

pub type Aabb2 = Aabb<2>;
pub type Aabb3 = Aabb<3>;

impl<const D: usize> Aabb<D> {
    /// Create a box from two opposite corners, normalising per axis.
    pub fn new(a: [f32; D], b: [f32; D]) -> Self {
        let mut min = a;
        let mut max = b;
        for axis in 0..D {
            if min[axis] > max[axis] {
                std::mem::swap(&mut min[axis], &mut max[axis]);
            }
        }
        Self { min, max }
    }

    /// Degenerate box around a single point
    #[inline]
    pub fn from_point(p: [f32; D]) -> Self {
        Self { min: p, max: p }
    }

    /// Box centred on `center` with the given half extent on every axis
    pub fn around(center: [f32; D], half_extent: f32) -> Self {
        let half = half_extent.abs();
        Self {
            min: center.map(|c| c - half),
            max: center.map(|c| c + half),
        }
    }

    /// Smallest box enclosing every box of the iterator, `None` when empty
    pub fn union_all<'a, I>(boxes: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Aabb<D>>,
    {
        let mut iter = boxes.into_iter();
        let first = *iter.next()?;
        Some(iter.fold(first, |acc, b| acc.union(b)))
    }

    #[inline]
    pub fn center(&self) -> [f32; D] {
        let mut c = [0.0; D];
        for (axis, value) in c.iter_mut().enumerate() {
            *value = (self.min[axis] + self.max[axis]) * 0.5;
        }
        c
    }

    #[inline]
    pub fn center_on(&self, axis: usize) -> f32 {
        (self.min[axis] + self.max[axis]) * 0.5
    }

    #[inline]
    pub fn extent(&self, axis: usize) -> f32 {
        self.max[axis] - self.min[axis]
    }

    pub fn union(&self, other: &Aabb<D>) -> Self {
        let mut out = *self;
        out.expand_to(other);
        out
    }

    /// Grow in place so that `other` fits inside.
    pub fn expand_to(&mut self, other: &Aabb<D>) {
        for axis in 0..D {
            self.min[axis] = self.min[axis].min(other.min[axis]);
            self.max[axis] = self.max[axis].max(other.max[axis]);
        }
    }

    /// True when `other` lies inside or on the boundary of this box.
    pub fn contains(&self, other: &Aabb<D>) -> bool {
        (0..D).all(|axis| self.min[axis] <= other.min[axis] && other.max[axis] <= self.max[axis])
    }

    pub fn contains_point(&self, p: &[f32; D]) -> bool {
        (0..D).all(|axis| self.min[axis] <= p[axis] && p[axis] <= self.max[axis])
    }

    /// True when the boxes share at least one point (touching counts).
    pub fn intersects(&self, other: &Aabb<D>) -> bool {
        (0..D).all(|axis| self.min[axis] <= other.max[axis] && other.min[axis] <= self.max[axis])
    }

    #[inline]
    pub fn is_disjoint(&self, other: &Aabb<D>) -> bool {
        !self.intersects(other)
    }

    /// Squared distance from a point to the nearest point of the box
    pub fn distance_sq_to_point(&self, p: &[f32; D]) -> f32 {
        let mut sum = 0.0;
        for axis in 0..D {
            let d = if p[axis] < self.min[axis] {
                self.min[axis] - p[axis]
            } else if p[axis] > self.max[axis] {
                p[axis] - self.max[axis]
            } else {
                0.0
            };
            sum += d * d;
        }
        sum
    }

    /// Squared distance from a point to the farthest corner of the box
    pub fn max_distance_sq_to_point(&self, p: &[f32; D]) -> f32 {
        let mut sum = 0.0;
        for axis in 0..D {
            let d = (p[axis] - self.min[axis]).abs().max((self.max[axis] - p[axis]).abs());
            sum += d * d;
        }
        sum
    }

    /// Extent along `axis` as `(min, max)`, or `(0, 0)` past the last axis
    #[inline]
    pub fn range(&self, axis: usize) -> (f32, f32) {
        if axis < D {
            (self.min[axis], self.max[axis])
        } else {
            (0.0, 0.0)
        }
    }
}
