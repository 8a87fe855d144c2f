// Common test utilities: terrain GLB fixtures and scene text builders
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde_json::json;
use terrain_snap_lib::mesh::glb::write_glb;

/// Write a square terrain lattice over [0, size] x [0, size] as a GLB.
/// `height(x, z)` gives the Y coordinate of each vertex.
pub fn write_terrain_glb(
    dir: &Path,
    filename: &str,
    size: f32,
    step: f32,
    height: impl Fn(f32, f32) -> f32,
) -> PathBuf {
    let n = (size / step).round() as usize;
    let mut bin: Vec<u8> = vec![];
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for iz in 0..=n {
        for ix in 0..=n {
            let (x, z) = (ix as f32 * step, iz as f32 * step);
            let p = [x, height(x, z), z];
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
                bin.extend_from_slice(&p[axis].to_le_bytes());
            }
        }
    }
    let count = (n + 1) * (n + 1);

    let doc = json!({
        "asset": { "version": "2.0", "generator": "terrain-snap tests" },
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": bin.len(), "target": 34962 }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": count,
            "type": "VEC3",
            "min": min,
            "max": max
        }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "nodes": [{ "mesh": 0, "name": "Terrain" }],
        "scenes": [{ "nodes": [0] }],
        "scene": 0
    });

    let path = dir.join(filename);
    write_glb(&doc.to_string(), &bin, &path).expect("Failed to write terrain GLB");
    path
}

/// Flat 10 x 10 terrain at height 5.
pub fn write_flat_terrain(dir: &Path) -> PathBuf {
    write_terrain_glb(dir, "flat.glb", 10.0, 1.0, |_, _| 5.0)
}

/// Identity-basis transform line.
pub fn transform_line(x: f32, y: &str, z: f32) -> String {
    format!(
        "transform = Transform3D(1, 0, 0, 0, 1, 0, 0, 0, 1, {}, {}, {})",
        x, y, z
    )
}

/// A `[node]` block with a transform, followed by a blank line.
pub fn node(name: &str, parent: &str, x: f32, y: &str, z: f32) -> String {
    format!(
        "[node name=\"{}\" type=\"Node3D\" parent=\"{}\"]\n{}\n\n",
        name,
        parent,
        transform_line(x, y, z)
    )
}

/// Scene file text with a root node and the given node blocks.
pub fn scene(nodes: &[String]) -> String {
    let mut text = String::from("[gd_scene format=3]\n\n[node name=\"Level\" type=\"Node3D\"]\n\n");
    for block in nodes {
        text.push_str(block);
    }
    text
}

/// The line following the header of node `name`.
pub fn transform_of<'t>(text: &'t str, name: &str) -> &'t str {
    let header = format!("[node name=\"{}\"", name);
    let mut lines = text.lines();
    lines
        .by_ref()
        .find(|l| l.starts_with(&header))
        .and_then(|_| lines.next())
        .unwrap_or_else(|| panic!("node {} not found", name))
}
