pub mod export;
pub mod grid;

pub use grid::HeightGrid;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Anything that can answer "how high is the terrain at (x, z)?".
///
/// Implementations must fail with [`SnapError::OutOfBounds`] outside their
/// coverage rather than guessing a value.
///
/// [`SnapError::OutOfBounds`]: crate::error::SnapError::OutOfBounds
pub trait HeightSampler {
    fn height_at(&self, x: f32, z: f32) -> Result<f32>;
}

/// Measured extent of the terrain mesh. Height is the Y axis; the ground
/// plane is X/Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
    pub min_height: f32,
    pub max_height: f32,
}

impl TerrainBounds {
    /// Measure the bounds of all finite points. `None` if there are none.
    pub fn from_points(points: &[[f32; 3]]) -> Option<Self> {
        let mut finite = points
            .iter()
            .filter(|p| p.iter().all(|c| c.is_finite()));

        let first = finite.next()?;
        let mut bounds = Self {
            min_x: first[0],
            max_x: first[0],
            min_z: first[2],
            max_z: first[2],
            min_height: first[1],
            max_height: first[1],
        };

        for [x, y, z] in finite.copied() {
            bounds.min_x = bounds.min_x.min(x);
            bounds.max_x = bounds.max_x.max(x);
            bounds.min_z = bounds.min_z.min(z);
            bounds.max_z = bounds.max_z.max(z);
            bounds.min_height = bounds.min_height.min(y);
            bounds.max_height = bounds.max_height.max(y);
        }

        Some(bounds)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn depth(&self) -> f32 {
        self.max_z - self.min_z
    }

    /// Inclusive planar containment test. NaN is never contained.
    pub fn contains(&self, x: f32, z: f32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_z..=self.max_z).contains(&z)
    }
}
