use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// 2D position on the ground plane, used for ground sampling and body placement
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Project a `D`-dimensional point onto its first two axes
    pub fn from_point<const D: usize>(p: &[f32; D]) -> Self {
        Self {
            x: p.first().copied().unwrap_or(0.0),
            y: p.get(1).copied().unwrap_or(0.0),
        }
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_point_pads_and_truncates() {
        assert_eq!(Vec2::from_point(&[1.5]), Vec2::new(1.5, 0.0));
        assert_eq!(Vec2::from_point(&[1.5, -2.0, 7.0]), Vec2::new(1.5, -2.0));
    }

    #[test]
    fn test_arithmetic() {
        let v = Vec2::new(1.0, 2.0) + Vec2::new(3.0, 4.0) * 2.0 - Vec2::new(1.0, 1.0);
        assert_eq!(v, Vec2::new(6.0, 9.0));
    }

    #[test]
    fn test_serde() {
        let v = Vec2::new(1.0, 2.0);
        let json = serde_json::to_string(&v).unwrap();
        let back: Vec2 = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
