pub mod glb;

use std::path::Path;

use tracing::debug;

use crate::error::Result;

/// Vertex positions extracted from a terrain mesh, in file order.
///
/// Nothing else from the container is kept: the grid builder only needs
/// `(x, height, z)` triples.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    points: Vec<[f32; 3]>,
}

impl PointCloud {
    pub fn from_points(points: Vec<[f32; 3]>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Parse an in-memory GLB container into a point cloud.
pub fn parse_point_cloud(data: &[u8]) -> Result<PointCloud> {
    let chunks = glb::read_glb(data)?;
    let points = glb::decode_positions(&chunks)?;
    debug!(
        version = chunks.version,
        json_bytes = chunks.json.len(),
        bin_bytes = chunks.bin.len(),
        vertices = points.len(),
        "decoded GLB vertex positions"
    );
    Ok(PointCloud::from_points(points))
}

/// Load the terrain mesh at `path` and extract its vertex positions.
pub fn load_point_cloud(path: &Path) -> Result<PointCloud> {
    let data = std::fs::read(path)?;
    parse_point_cloud(&data)
}
