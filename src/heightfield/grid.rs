use tracing::debug;

use super::{HeightSampler, TerrainBounds};
use crate::config::SnapConfig;
use crate::error::{Result, SnapError};
use crate::mesh::PointCloud;

/// Terrain heights resampled onto a square grid spanning the measured mesh
/// bounds.
///
/// Cell `(ix, iz)` sits at world position
/// `min + (i / (resolution - 1)) * extent` on each axis, so the outermost
/// rows and columns lie exactly on the bounding box edges. Cells are stored
/// row-major (`iz * resolution + ix`) and every cell holds a height.
#[derive(Debug, Clone)]
pub struct HeightGrid {
    resolution: usize,
    bounds: TerrainBounds,
    cells: Vec<f32>,
}

/// Outcome of the build, for logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridBuildStats {
    pub points_used: usize,
    pub cells_measured: usize,
    pub cells_gap_filled: usize,
    pub cells_mean_filled: usize,
    pub passes_run: usize,
}

fn cell_index(value: f32, min: f32, extent: f32, resolution: usize) -> usize {
    let t = ((value - min) / extent).clamp(0.0, 1.0);
    ((t * (resolution - 1) as f32).round() as usize).min(resolution - 1)
}

/// Fill unset cells from their set orthogonal neighbours, reading each pass
/// from a snapshot of the previous one. Returns (cells filled, passes run).
fn fill_gaps(cells: &mut [Option<f32>], resolution: usize, max_passes: usize) -> (usize, usize) {
    let mut total_filled = 0;
    let mut passes = 0;

    while passes < max_passes && cells.iter().any(|c| c.is_none()) {
        let snapshot = cells.to_vec();
        let mut filled = 0;

        for iz in 0..resolution {
            for ix in 0..resolution {
                let idx = iz * resolution + ix;
                if snapshot[idx].is_some() {
                    continue;
                }

                let mut neighbours = [None; 4];
                if ix > 0 {
                    neighbours[0] = snapshot[idx - 1];
                }
                if ix + 1 < resolution {
                    neighbours[1] = snapshot[idx + 1];
                }
                if iz > 0 {
                    neighbours[2] = snapshot[idx - resolution];
                }
                if iz + 1 < resolution {
                    neighbours[3] = snapshot[idx + resolution];
                }

                let (sum, count) = neighbours
                    .iter()
                    .flatten()
                    .fold((0.0f32, 0usize), |(s, n), h| (s + h, n + 1));
                if count > 0 {
                    cells[idx] = Some(sum / count as f32);
                    filled += 1;
                }
            }
        }

        passes += 1;
        total_filled += filled;
        if filled == 0 {
            break;
        }
    }

    (total_filled, passes)
}

impl HeightGrid {
    /// Build with the resolution and gap-fill budget from `config`.
    pub fn from_config(cloud: &PointCloud, config: &SnapConfig) -> Result<Self> {
        Self::build(cloud, config.grid_resolution, config.gap_fill_passes)
    }

    /// Project `cloud` onto a `resolution x resolution` grid.
    ///
    /// Where several vertices land in one cell the highest wins, so bridges
    /// and overhangs resolve to their walkable top rather than the
    /// substructure below. Cells no vertex reached are interpolated from
    /// their neighbours for up to `gap_fill_passes` passes; whatever is still
    /// empty after that takes the mean of all known heights.
    pub fn build(cloud: &PointCloud, resolution: usize, gap_fill_passes: usize) -> Result<Self> {
        if resolution < 2 {
            return Err(SnapError::Configuration(format!(
                "grid resolution must be at least 2, got {}",
                resolution
            )));
        }

        let bounds = TerrainBounds::from_points(cloud.points())
            .ok_or_else(|| SnapError::Decode("mesh contains no finite vertices".to_string()))?;

        if bounds.width() <= 0.0 || bounds.depth() <= 0.0 {
            return Err(SnapError::Decode(format!(
                "mesh has no planar extent ({} x {})",
                bounds.width(),
                bounds.depth()
            )));
        }

        let mut cells: Vec<Option<f32>> = vec![None; resolution * resolution];
        let mut stats = GridBuildStats::default();

        for &[x, y, z] in cloud.points() {
            if !(x.is_finite() && y.is_finite() && z.is_finite()) {
                continue;
            }
            let ix = cell_index(x, bounds.min_x, bounds.width(), resolution);
            let iz = cell_index(z, bounds.min_z, bounds.depth(), resolution);
            let cell = &mut cells[iz * resolution + ix];
            *cell = Some(cell.map_or(y, |h| h.max(y)));
            stats.points_used += 1;
        }

        stats.cells_measured = cells.iter().filter(|c| c.is_some()).count();

        let (gap_filled, passes) = fill_gaps(&mut cells, resolution, gap_fill_passes);
        stats.cells_gap_filled = gap_filled;
        stats.passes_run = passes;

        let (sum, count) = cells
            .iter()
            .flatten()
            .fold((0.0f64, 0usize), |(s, n), h| (s + *h as f64, n + 1));
        let mean = (sum / count.max(1) as f64) as f32;

        let cells: Vec<f32> = cells
            .into_iter()
            .map(|c| {
                c.unwrap_or_else(|| {
                    stats.cells_mean_filled += 1;
                    mean
                })
            })
            .collect();

        debug!(
            resolution,
            points = stats.points_used,
            measured = stats.cells_measured,
            gap_filled = stats.cells_gap_filled,
            mean_filled = stats.cells_mean_filled,
            passes = stats.passes_run,
            "built height grid"
        );

        Ok(Self {
            resolution,
            bounds,
            cells,
        })
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn bounds(&self) -> &TerrainBounds {
        &self.bounds
    }

    /// Row-major cell heights.
    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    pub fn cell(&self, ix: usize, iz: usize) -> Option<f32> {
        if ix >= self.resolution || iz >= self.resolution {
            return None;
        }
        self.cells.get(iz * self.resolution + ix).copied()
    }

    /// World-space (x, z) of a cell centre.
    pub fn cell_position(&self, ix: usize, iz: usize) -> (f32, f32) {
        let step = (self.resolution - 1) as f32;
        (
            self.bounds.min_x + self.bounds.width() * (ix as f32 / step),
            self.bounds.min_z + self.bounds.depth() * (iz as f32 / step),
        )
    }

    /// Bilinearly interpolated terrain height at world (x, z).
    pub fn height_at(&self, x: f32, z: f32) -> Result<f32> {
        if !self.bounds.contains(x, z) {
            return Err(SnapError::OutOfBounds { x, z });
        }

        let last = self.resolution - 1;
        let gx = (x - self.bounds.min_x) / self.bounds.width() * last as f32;
        let gz = (z - self.bounds.min_z) / self.bounds.depth() * last as f32;

        let x0 = (gx.floor() as usize).min(last);
        let z0 = (gz.floor() as usize).min(last);
        let x1 = (x0 + 1).min(last);
        let z1 = (z0 + 1).min(last);
        let fx = (gx - x0 as f32).clamp(0.0, 1.0);
        let fz = (gz - z0 as f32).clamp(0.0, 1.0);

        let at = |ix: usize, iz: usize| self.cells[iz * self.resolution + ix];
        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;

        let near = lerp(at(x0, z0), at(x1, z0), fx);
        let far = lerp(at(x0, z1), at(x1, z1), fx);
        Ok(lerp(near, far, fz))
    }
}

impl HeightSampler for HeightGrid {
    fn height_at(&self, x: f32, z: f32) -> Result<f32> {
        HeightGrid::height_at(self, x, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Regular lattice over [0, size] x [0, size] with `step` spacing.
    fn lattice(size: f32, step: f32, height: impl Fn(f32, f32) -> f32) -> PointCloud {
        let n = (size / step).round() as usize;
        let mut points = vec![];
        for iz in 0..=n {
            for ix in 0..=n {
                let (x, z) = (ix as f32 * step, iz as f32 * step);
                points.push([x, height(x, z), z]);
            }
        }
        PointCloud::from_points(points)
    }

    #[test]
    fn flat_mesh_queries_exact_height() {
        let cloud = lattice(10.0, 1.0, |_, _| 5.0);
        let grid = HeightGrid::build(&cloud, 256, 100).unwrap();
        assert_eq!(grid.height_at(5.0, 5.0).unwrap(), 5.0);
        assert_eq!(grid.height_at(0.0, 10.0).unwrap(), 5.0);
    }

    #[test]
    fn out_of_bounds_query_fails() {
        let cloud = lattice(10.0, 1.0, |_, _| 5.0);
        let grid = HeightGrid::build(&cloud, 64, 100).unwrap();

        for (x, z) in [(1000.0, 1000.0), (-0.01, 5.0), (5.0, 10.5), (f32::NAN, 1.0)] {
            let err = grid.height_at(x, z).unwrap_err();
            assert!(matches!(err, SnapError::OutOfBounds { .. }), "({x}, {z})");
        }
    }

    #[test]
    fn slope_is_interpolated_between_cells() {
        // y = 0.5x sampled once per cell: 11 cells across 10 units.
        let cloud = lattice(10.0, 1.0, |x, _| 0.5 * x);
        let grid = HeightGrid::build(&cloud, 11, 0).unwrap();

        assert!((grid.height_at(2.0, 3.0).unwrap() - 1.0).abs() < 1e-5);
        assert!((grid.height_at(2.5, 3.0).unwrap() - 1.25).abs() < 1e-5);
        assert!((grid.height_at(9.75, 0.2).unwrap() - 4.875).abs() < 1e-5);
    }

    #[test]
    fn highest_vertex_wins_a_cell() {
        // Bridge deck at 8 above a riverbed at 1, same planar position.
        let mut points = lattice(4.0, 1.0, |_, _| 1.0).points().to_vec();
        points.push([2.0, 8.0, 2.0]);
        let grid = HeightGrid::build(&PointCloud::from_points(points), 5, 10).unwrap();

        assert_eq!(grid.cell(2, 2), Some(8.0));
        assert_eq!(grid.height_at(2.0, 2.0).unwrap(), 8.0);
    }

    #[test]
    fn gap_fill_leaves_no_unset_cells() {
        // Four corners only: everything else has to be filled.
        let cloud = PointCloud::from_points(vec![
            [0.0, 1.0, 0.0],
            [10.0, 3.0, 0.0],
            [0.0, 5.0, 10.0],
            [10.0, 7.0, 10.0],
        ]);
        let grid = HeightGrid::build(&cloud, 32, 100).unwrap();

        assert_eq!(grid.cells().len(), 32 * 32);
        assert!(grid.cells().iter().all(|h| h.is_finite()));
        assert!(grid.cells().iter().all(|h| (1.0..=7.0).contains(h)));
    }

    #[test]
    fn exhausted_passes_fall_back_to_global_mean() {
        let cloud = PointCloud::from_points(vec![[0.0, 2.0, 0.0], [10.0, 6.0, 10.0]]);
        let grid = HeightGrid::build(&cloud, 16, 0).unwrap();

        assert_eq!(grid.cell(0, 0), Some(2.0));
        assert_eq!(grid.cell(15, 15), Some(6.0));
        assert_eq!(grid.cell(7, 9), Some(4.0));
    }

    #[test]
    fn in_bounds_queries_stay_within_mesh_height_range() {
        let cloud = lattice(20.0, 0.7, |x, z| (x * 0.3).sin() * 4.0 + (z * 0.2).cos() * 2.0);
        let bounds = TerrainBounds::from_points(cloud.points()).unwrap();
        let grid = HeightGrid::build(&cloud, 48, 100).unwrap();

        let mut x = bounds.min_x;
        while x <= bounds.max_x {
            let mut z = bounds.min_z;
            while z <= bounds.max_z {
                let h = grid.height_at(x, z).unwrap();
                assert!(
                    h >= bounds.min_height - 1e-4 && h <= bounds.max_height + 1e-4,
                    "height {h} at ({x}, {z}) outside [{}, {}]",
                    bounds.min_height,
                    bounds.max_height
                );
                z += 0.37;
            }
            x += 0.41;
        }
    }

    #[test]
    fn degenerate_mesh_rejected() {
        let line = PointCloud::from_points(vec![[0.0, 1.0, 0.0], [0.0, 1.0, 5.0]]);
        assert!(matches!(
            HeightGrid::build(&line, 16, 10),
            Err(SnapError::Decode(_))
        ));
        assert!(matches!(
            HeightGrid::build(&PointCloud::default(), 16, 10),
            Err(SnapError::Decode(_))
        ));
    }

    #[test]
    fn cell_positions_span_bounds() {
        let cloud = lattice(10.0, 1.0, |_, _| 0.0);
        let grid = HeightGrid::build(&cloud, 5, 10).unwrap();
        assert_eq!(grid.cell_position(0, 0), (0.0, 0.0));
        assert_eq!(grid.cell_position(4, 2), (10.0, 5.0));
    }
}
