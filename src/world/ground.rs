//! Ground models sampled by the perception pass
//!
//! Ground perception is a single value per body and tick: what the ground
//! looks like right under the body's 2D position.

use serde::{Deserialize, Serialize};

use crate::util::vec2::Vec2;

/// What a body perceives of the ground under it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundPerception {
    /// Sampled position
    pub position: Vec2,
    /// Ground elevation at `position`
    pub height: f32,
    /// Grid cell `(column, row)` the sample fell in, for gridded grounds
    pub cell: Option<(usize, usize)>,
}

/// Ground collaborator of the perception pass
pub trait Ground: Send + Sync {
    /// Sample the ground at a 2D position, `None` when the position is off the ground.
    fn sample(&self, position: Vec2) -> Option<GroundPerception>;
}

/// Infinite flat ground
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatGround {
    pub height: f32,
}

impl FlatGround {
    pub fn new(height: f32) -> Self {
        Self { height }
    }
}

impl Ground for FlatGround {
    fn sample(&self, position: Vec2) -> Option<GroundPerception> {
        Some(GroundPerception {
            position,
            height: self.height,
            cell: None,
        })
    }
}

/// Heightmap construction errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HeightmapError {
    #[error("Heightmap needs at least 2x2 samples, got {columns}x{rows}")]
    TooSmall { columns: usize, rows: usize },
    #[error("Expected {expected} height samples, got {actual}")]
    SampleCount { expected: usize, actual: usize },
    #[error("Cell size must be positive and finite, got {0}")]
    InvalidCellSize(f32),
}

/// Regular grid of height samples with bilinear interpolation
///
/// Sample `(c, r)` sits at `origin + (c, r) * cell_size`. Positions outside
/// the sampled rectangle are not part of the ground.
#[derive(Debug, Clone)]
pub struct HeightmapGround {
    origin: Vec2,
    cell_size: f32,
    columns: usize,
    rows: usize,
    /// Row-major samples
    heights: Vec<f32>,
}

impl HeightmapGround {
    pub fn new(
        origin: Vec2,
        cell_size: f32,
        columns: usize,
        rows: usize,
        heights: Vec<f32>,
    ) -> Result<Self, HeightmapError> {
        if columns < 2 || rows < 2 {
            return Err(HeightmapError::TooSmall { columns, rows });
        }
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(HeightmapError::InvalidCellSize(cell_size));
        }
        let expected = columns * rows;
        if heights.len() != expected {
            return Err(HeightmapError::SampleCount {
                expected,
                actual: heights.len(),
            });
        }
        Ok(Self {
            origin,
            cell_size,
            columns,
            rows,
            heights,
        })
    }

    /// Heightmap filled from a function of the sample position
    pub fn from_fn<F>(
        origin: Vec2,
        cell_size: f32,
        columns: usize,
        rows: usize,
        f: F,
    ) -> Result<Self, HeightmapError>
    where
        F: Fn(Vec2) -> f32,
    {
        let mut heights = Vec::with_capacity(columns * rows);
        for r in 0..rows {
            for c in 0..columns {
                let p = origin + Vec2::new(c as f32, r as f32) * cell_size;
                heights.push(f(p));
            }
        }
        Self::new(origin, cell_size, columns, rows, heights)
    }

    #[inline]
    fn height_at(&self, column: usize, row: usize) -> f32 {
        self.heights[row * self.columns + column]
    }

    /// World size covered by the samples
    pub fn extent(&self) -> Vec2 {
        Vec2::new(
            (self.columns - 1) as f32 * self.cell_size,
            (self.rows - 1) as f32 * self.cell_size,
        )
    }
}

impl Ground for HeightmapGround {
    fn sample(&self, position: Vec2) -> Option<GroundPerception> {
        let local = position - self.origin;
        let gx = local.x / self.cell_size;
        let gy = local.y / self.cell_size;
        let max_x = (self.columns - 1) as f32;
        let max_y = (self.rows - 1) as f32;
        if !(0.0..=max_x).contains(&gx) || !(0.0..=max_y).contains(&gy) {
            return None;
        }

        // Last row/column samples belong to the preceding cell
        let column = (gx.floor() as usize).min(self.columns - 2);
        let row = (gy.floor() as usize).min(self.rows - 2);
        let tx = gx - column as f32;
        let ty = gy - row as f32;

        let h00 = self.height_at(column, row);
        let h10 = self.height_at(column + 1, row);
        let h01 = self.height_at(column, row + 1);
        let h11 = self.height_at(column + 1, row + 1);
        let bottom = h00 + (h10 - h00) * tx;
        let top = h01 + (h11 - h01) * tx;

        Some(GroundPerception {
            position,
            height: bottom + (top - bottom) * ty,
            cell: Some((column, row)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> HeightmapGround {
        // height = x, over [0, 10] x [0, 10]
        HeightmapGround::from_fn(Vec2::ZERO, 5.0, 3, 3, |p| p.x).unwrap()
    }

    #[test]
    fn test_flat_ground_everywhere() {
        let g = FlatGround::new(2.0);
        let p = g.sample(Vec2::new(-1e6, 1e6)).unwrap();
        assert_eq!(p.height, 2.0);
        assert!(p.cell.is_none());
    }

    #[test]
    fn test_heightmap_bilinear() {
        let g = ramp();
        let p = g.sample(Vec2::new(2.5, 7.0)).unwrap();
        assert!((p.height - 2.5).abs() < 1e-5);
        assert_eq!(p.cell, Some((0, 1)));
    }

    #[test]
    fn test_heightmap_far_edge_is_on_ground() {
        let g = ramp();
        let p = g.sample(Vec2::new(10.0, 10.0)).unwrap();
        assert!((p.height - 10.0).abs() < 1e-5);
        assert_eq!(p.cell, Some((1, 1)));
    }

    #[test]
    fn test_heightmap_outside_is_none() {
        let g = ramp();
        assert!(g.sample(Vec2::new(-0.1, 5.0)).is_none());
        assert!(g.sample(Vec2::new(5.0, 10.1)).is_none());
    }

    #[test]
    fn test_heightmap_validation() {
        assert_eq!(
            HeightmapGround::new(Vec2::ZERO, 1.0, 1, 4, vec![0.0; 4]).unwrap_err(),
            HeightmapError::TooSmall { columns: 1, rows: 4 }
        );
        assert_eq!(
            HeightmapGround::new(Vec2::ZERO, 1.0, 2, 2, vec![0.0; 3]).unwrap_err(),
            HeightmapError::SampleCount { expected: 4, actual: 3 }
        );
        assert!(matches!(
            HeightmapGround::new(Vec2::ZERO, 0.0, 2, 2, vec![0.0; 4]),
            Err(HeightmapError::InvalidCellSize(_))
        ));
        assert_eq!(ramp().extent(), Vec2::new(10.0, 10.0));
    }
}
