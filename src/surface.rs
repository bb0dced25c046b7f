//! Terrain surface queries.
//!
//! The physics integrator only sees terrain through the [`Surface`] trait:
//! a ground position plus heading either resolves to an oriented pose frame
//! or is rejected as lying off the playable surface. [`Heightfield`] is the
//! grid-sampled implementation used by the client.

use glam::{Mat4, Vec3};
use thiserror::Error;

use crate::numeric::{floor_to_index, index_to_f32};
use crate::vector_math::{conformed_frame, surface_normal};

/// Maps ground positions onto the terrain.
#[cfg_attr(test, mockall::automock)]
pub trait Surface: Send + Sync {
    /// Resolves the agent-to-world frame at `(x, y)` facing `heading`.
    ///
    /// Returns `None` when the position lies outside the terrain.
    fn transform(&self, x: f32, y: f32, heading: f32) -> Option<Mat4>;

    /// Resolves the world-to-agent frame, the inverse of [`Self::transform`].
    fn inverse_transform(&self, x: f32, y: f32, heading: f32) -> Option<Mat4> {
        self.transform(x, y, heading).map(|frame| frame.inverse())
    }
}

/// Errors raised when building a [`Heightfield`].
#[derive(Debug, Error, PartialEq)]
pub enum TerrainError {
    /// Fewer than two samples along an axis leave no cell to interpolate.
    #[error("terrain needs at least 2x2 samples, got {rows}x{cols}")]
    TooSmall {
        /// Samples along x.
        rows: usize,
        /// Samples along y.
        cols: usize,
    },
    /// The elevation buffer does not match the grid dimensions.
    #[error("expected {expected} elevation samples, got {actual}")]
    SampleCount {
        /// `rows * cols`.
        expected: usize,
        /// Length of the supplied buffer.
        actual: usize,
    },
    /// Sample spacing must be positive and finite.
    #[error("invalid sample spacing {row_scale}x{col_scale}")]
    Spacing {
        /// Spacing along x.
        row_scale: f32,
        /// Spacing along y.
        col_scale: f32,
    },
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    row: usize,
    col: usize,
    frac_x: f32,
    frac_y: f32,
}

/// Regular grid of elevation samples.
///
/// Sample `(row, col)` sits at ground position `(row * row_scale,
/// col * col_scale)`; elevation between samples is bilinearly interpolated.
#[derive(Debug, Clone, PartialEq)]
pub struct Heightfield {
    rows: usize,
    cols: usize,
    row_scale: f32,
    col_scale: f32,
    elevation: Vec<f32>,
}

impl Heightfield {
    /// Builds a heightfield from row-major elevation samples.
    ///
    /// # Errors
    /// Returns a [`TerrainError`] when the grid is smaller than 2x2, the
    /// buffer length differs from `rows * cols`, or a spacing is not a
    /// positive finite number.
    pub fn new(
        rows: usize,
        cols: usize,
        row_scale: f32,
        col_scale: f32,
        elevation: Vec<f32>,
    ) -> Result<Self, TerrainError> {
        if rows < 2 || cols < 2 {
            return Err(TerrainError::TooSmall { rows, cols });
        }
        let expected = rows.saturating_mul(cols);
        if elevation.len() != expected {
            return Err(TerrainError::SampleCount {
                expected,
                actual: elevation.len(),
            });
        }
        let valid = |scale: f32| scale.is_finite() && scale > 0.0;
        if !(valid(row_scale) && valid(col_scale)) {
            return Err(TerrainError::Spacing {
                row_scale,
                col_scale,
            });
        }
        Ok(Self {
            rows,
            cols,
            row_scale,
            col_scale,
            elevation,
        })
    }

    /// Builds a heightfield whose samples come from `height(row, col)`.
    ///
    /// # Errors
    /// See [`Heightfield::new`].
    pub fn from_fn(
        rows: usize,
        cols: usize,
        row_scale: f32,
        col_scale: f32,
        height: impl Fn(usize, usize) -> f32,
    ) -> Result<Self, TerrainError> {
        let elevation = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| (row, col)))
            .map(|(row, col)| height(row, col))
            .collect();
        Self::new(rows, cols, row_scale, col_scale, elevation)
    }

    /// Builds level terrain at a constant elevation.
    ///
    /// # Errors
    /// See [`Heightfield::new`].
    ///
    /// # Examples
    /// ```
    /// use trundle::surface::{Heightfield, Surface};
    /// let ground = Heightfield::flat(11, 11, 1.0, 1.0, 2.0).unwrap();
    /// assert_eq!(ground.height_at(5.5, 5.5), Some(2.0));
    /// assert!(ground.transform(11.0, 0.0, 0.0).is_none());
    /// ```
    pub fn flat(
        rows: usize,
        cols: usize,
        row_scale: f32,
        col_scale: f32,
        elevation: f32,
    ) -> Result<Self, TerrainError> {
        Self::new(
            rows,
            cols,
            row_scale,
            col_scale,
            vec![elevation; rows.saturating_mul(cols)],
        )
    }

    /// Largest valid ground coordinates `(x, y)`; the domain starts at the
    /// origin.
    #[must_use]
    pub fn extent(&self) -> (f32, f32) {
        (
            index_to_f32(self.rows - 1) * self.row_scale,
            index_to_f32(self.cols - 1) * self.col_scale,
        )
    }

    /// Ground position where new agents are placed: the grid centre.
    #[must_use]
    pub fn spawn_point(&self) -> (f32, f32) {
        (
            index_to_f32(self.rows / 2) * self.row_scale,
            index_to_f32(self.cols / 2) * self.col_scale,
        )
    }

    fn sample(&self, row: usize, col: usize) -> f32 {
        self.elevation
            .get(row * self.cols + col)
            .copied()
            .unwrap_or_default()
    }

    fn cell(&self, x: f32, y: f32) -> Option<Cell> {
        let (max_x, max_y) = self.extent();
        if !(x >= 0.0 && y >= 0.0 && x <= max_x && y <= max_y) {
            return None;
        }
        let u = x / self.row_scale;
        let v = y / self.col_scale;
        // The far edge belongs to the last cell.
        let row = floor_to_index(u)?.min(self.rows - 2);
        let col = floor_to_index(v)?.min(self.cols - 2);
        Some(Cell {
            row,
            col,
            frac_x: u - index_to_f32(row),
            frac_y: v - index_to_f32(col),
        })
    }

    fn corners(&self, cell: Cell) -> [f32; 4] {
        [
            self.sample(cell.row, cell.col),
            self.sample(cell.row + 1, cell.col),
            self.sample(cell.row, cell.col + 1),
            self.sample(cell.row + 1, cell.col + 1),
        ]
    }

    /// Interpolated elevation at `(x, y)`, or `None` off the terrain.
    #[must_use]
    pub fn height_at(&self, x: f32, y: f32) -> Option<f32> {
        let cell = self.cell(x, y)?;
        let [h00, h10, h01, h11] = self.corners(cell);
        let (fx, fy) = (cell.frac_x, cell.frac_y);
        Some(
            h00 * (1.0 - fx) * (1.0 - fy)
                + h10 * fx * (1.0 - fy)
                + h01 * (1.0 - fx) * fy
                + h11 * fx * fy,
        )
    }

    fn normal_at(&self, cell: Cell) -> Option<Vec3> {
        let [h00, h10, h01, h11] = self.corners(cell);
        let (fx, fy) = (cell.frac_x, cell.frac_y);
        let slope_x = ((h10 - h00) * (1.0 - fy) + (h11 - h01) * fy) / self.row_scale;
        let slope_y = ((h01 - h00) * (1.0 - fx) + (h11 - h10) * fx) / self.col_scale;
        surface_normal(slope_x, slope_y)
    }
}

impl Surface for Heightfield {
    fn transform(&self, x: f32, y: f32, heading: f32) -> Option<Mat4> {
        let cell = self.cell(x, y)?;
        let z = self.height_at(x, y)?;
        let normal = self.normal_at(cell)?;
        conformed_frame(Vec3::new(x, y, z), normal, heading)
    }
}
