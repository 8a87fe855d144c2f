//! Debug exports of a built height grid.
//!
//! - PNG: 16-bit grayscale, black = lowest mesh height, white = highest.
//!   Image row `iz`, column `ix` is grid cell `(ix, iz)`.
//! - GLB: the grid re-triangulated as a single mesh, so the surface objects
//!   are snapped against can be inspected in the destination editor.

use std::collections::BTreeMap;
use std::path::Path;

use ::gltf::json as gltf;
use ::gltf::json::{
    accessor::{ComponentType, GenericComponentType},
    validation::{Checked, USize64},
};
use anyhow::{Context, Result};
use image::{ImageBuffer, Luma};

use super::HeightGrid;
use crate::mesh::glb::write_glb;

/// Write the grid as a 16-bit grayscale PNG normalised to the mesh height
/// range.
pub fn encode_height_png(grid: &HeightGrid, path: &Path) -> Result<()> {
    let res = grid.resolution() as u32;
    let bounds = grid.bounds();
    let range = bounds.max_height - bounds.min_height;

    let mut img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::new(res, res);
    for (idx, height) in grid.cells().iter().enumerate() {
        let t = if range > 0.0 {
            ((height - bounds.min_height) / range).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let ix = idx as u32 % res;
        let iz = idx as u32 / res;
        img.put_pixel(ix, iz, Luma([(t * u16::MAX as f32).round() as u16]));
    }

    img.save(path)
        .with_context(|| format!("Failed to write height PNG: {}", path.display()))
}

/// Build glTF JSON and binary buffer for the grid surface.
pub fn build_grid_glb(grid: &HeightGrid) -> Result<(String, Vec<u8>)> {
    let res = grid.resolution();
    let vertex_count = res * res;

    let mut positions: Vec<f32> = Vec::with_capacity(vertex_count * 3);
    let mut pos_min = [f32::MAX; 3];
    let mut pos_max = [f32::MIN; 3];
    for iz in 0..res {
        for ix in 0..res {
            let (x, z) = grid.cell_position(ix, iz);
            let h = grid.cells()[iz * res + ix];
            for (axis, v) in [x, h, z].into_iter().enumerate() {
                pos_min[axis] = pos_min[axis].min(v);
                pos_max[axis] = pos_max[axis].max(v);
                positions.push(v);
            }
        }
    }

    let mut indices: Vec<u32> = Vec::with_capacity((res - 1) * (res - 1) * 6);
    for iz in 0..res - 1 {
        for ix in 0..res - 1 {
            let i0 = (iz * res + ix) as u32;
            let i1 = i0 + 1;
            let i2 = i0 + res as u32;
            let i3 = i2 + 1;
            indices.extend_from_slice(&[i0, i2, i1, i1, i2, i3]);
        }
    }

    let mut bin: Vec<u8> = positions.iter().flat_map(|f| f.to_le_bytes()).collect();
    let pos_len = bin.len();
    bin.extend(indices.iter().flat_map(|i| i.to_le_bytes()));
    let idx_len = bin.len() - pos_len;

    let buffer_views = vec![
        gltf::buffer::View {
            buffer: gltf::Index::new(0),
            byte_length: USize64(pos_len as u64),
            byte_offset: Some(USize64(0)),
            target: Some(Checked::Valid(gltf::buffer::Target::ArrayBuffer)),
            byte_stride: None, extensions: None, extras: None,
            name: Some("positions_view".into()),
        },
        gltf::buffer::View {
            buffer: gltf::Index::new(0),
            byte_length: USize64(idx_len as u64),
            byte_offset: Some(USize64(pos_len as u64)),
            target: Some(Checked::Valid(gltf::buffer::Target::ElementArrayBuffer)),
            byte_stride: None, extensions: None, extras: None,
            name: Some("indices_view".into()),
        },
    ];

    let accessors = vec![
        gltf::Accessor {
            buffer_view: Some(gltf::Index::new(0)),
            byte_offset: Some(USize64(0)),
            component_type: Checked::Valid(GenericComponentType(ComponentType::F32)),
            count: USize64(vertex_count as u64),
            type_: Checked::Valid(gltf::accessor::Type::Vec3),
            min: Some(serde_json::to_value(pos_min)?),
            max: Some(serde_json::to_value(pos_max)?),
            name: Some("position_accessor".into()),
            normalized: false, sparse: None, extensions: None, extras: None,
        },
        gltf::Accessor {
            buffer_view: Some(gltf::Index::new(1)),
            byte_offset: Some(USize64(0)),
            component_type: Checked::Valid(GenericComponentType(ComponentType::U32)),
            count: USize64(indices.len() as u64),
            type_: Checked::Valid(gltf::accessor::Type::Scalar),
            min: None, max: None,
            name: Some("index_accessor".into()),
            normalized: false, sparse: None, extensions: None, extras: None,
        },
    ];

    let mut attributes = BTreeMap::new();
    attributes.insert(
        Checked::Valid(gltf::mesh::Semantic::Positions),
        gltf::Index::new(0),
    );

    let primitive = gltf::mesh::Primitive {
        attributes,
        indices: Some(gltf::Index::new(1)),
        material: None,
        mode: Checked::Valid(gltf::mesh::Mode::Triangles),
        targets: None, extensions: None, extras: None,
    };

    let mesh = gltf::Mesh {
        name: Some("height_grid".into()),
        primitives: vec![primitive],
        weights: None, extensions: None, extras: None,
    };

    let root = gltf::Root {
        asset: gltf::Asset {
            version: "2.0".to_string(),
            generator: Some("terrain-snap".to_string()),
            ..Default::default()
        },
        accessors,
        buffers: vec![gltf::Buffer {
            byte_length: USize64(bin.len() as u64),
            name: None,
            uri: None,
            extensions: None,
            extras: None,
        }],
        buffer_views,
        meshes: vec![mesh],
        nodes: vec![gltf::Node {
            mesh: Some(gltf::Index::new(0)),
            name: Some("height_grid".into()),
            ..Default::default()
        }],
        scenes: vec![gltf::Scene {
            name: Some("height_grid".into()),
            nodes: vec![gltf::Index::new(0)],
            extensions: None,
            extras: None,
        }],
        scene: Some(gltf::Index::new(0)),
        ..Default::default()
    };

    let json = serde_json::to_string(&root)?;
    Ok((json, bin))
}

/// Write the grid surface as a GLB file.
pub fn export_grid_glb(grid: &HeightGrid, path: &Path) -> Result<()> {
    let (json, bin) = build_grid_glb(grid)?;
    write_glb(&json, &bin, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{parse_point_cloud, PointCloud};
    use tempfile::TempDir;

    fn ramp_grid(res: usize) -> HeightGrid {
        let mut points = vec![];
        for iz in 0..=8 {
            for ix in 0..=8 {
                points.push([ix as f32, ix as f32 * 0.5, iz as f32]);
            }
        }
        HeightGrid::build(&PointCloud::from_points(points), res, 50).unwrap()
    }

    #[test]
    fn height_png_spans_full_range() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("heights.png");
        let grid = ramp_grid(9);

        encode_height_png(&grid, &path).unwrap();

        let img = image::open(&path).unwrap().into_luma16();
        assert_eq!(img.dimensions(), (9, 9));
        assert_eq!(img.get_pixel(0, 4)[0], 0);
        assert_eq!(img.get_pixel(8, 4)[0], u16::MAX);
    }

    #[test]
    fn grid_glb_reloads_as_point_cloud() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("grid.glb");
        let grid = ramp_grid(5);

        export_grid_glb(&grid, &path).unwrap();

        let data = std::fs::read(&path).unwrap();
        let cloud = parse_point_cloud(&data).unwrap();
        assert_eq!(cloud.len(), 25);

        // Re-gridding the exported surface reproduces the original heights.
        let regrid = HeightGrid::build(&cloud, 5, 0).unwrap();
        for (a, b) in grid.cells().iter().zip(regrid.cells()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
