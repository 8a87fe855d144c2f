//! Snapping thresholds and category keyword tables.
//!
//! Every field has a documented default so a config file only needs to list
//! the values it overrides:
//!
//! ```json
//! { "min_clearance": 0.25, "vegetation_keywords": ["tree", "bush"] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnapError};

/// Cells per side of the height grid.
pub const DEFAULT_GRID_RESOLUTION: usize = 256;

/// Upper bound on neighbour-averaging passes during gap filling.
pub const DEFAULT_GAP_FILL_PASSES: usize = 100;

/// Minimum gap between an object's base and the terrain below it.
pub const DEFAULT_MIN_CLEARANCE: f32 = 0.3;

/// Highest an object may hover above the terrain before it is settled.
pub const DEFAULT_MAX_FLOAT_DISTANCE: f32 = 2.0;

/// Height above terrain that floating objects are settled to.
pub const DEFAULT_SETTLE_OFFSET: f32 = 0.5;

pub const DEFAULT_VEGETATION_RADIUS: f32 = 1.5;
pub const DEFAULT_SMALL_PROP_RADIUS: f32 = 2.0;
pub const DEFAULT_LARGE_PROP_RADIUS: f32 = 10.0;

/// Lift applied to large objects so footprint edges do not clip into slopes.
pub const DEFAULT_LARGE_PROP_BIAS: f32 = 0.1;

/// Spawn points sit one unit above the ground.
pub const DEFAULT_SPAWN_OFFSET: f32 = 1.0;

/// Height changes smaller than this are not written back.
pub const DEFAULT_ADJUST_EPSILON: f32 = 0.01;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Tunable inputs for the whole snapping pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnapConfig {
    pub grid_resolution: usize,
    pub gap_fill_passes: usize,
    pub min_clearance: f32,
    pub max_float_distance: f32,
    pub settle_offset: f32,
    pub vegetation_radius: f32,
    pub small_prop_radius: f32,
    pub large_prop_radius: f32,
    pub large_prop_bias: f32,
    pub spawn_offset: f32,
    pub adjust_epsilon: f32,

    pub hq_keywords: Vec<String>,
    pub spawn_keywords: Vec<String>,
    pub capture_point_keywords: Vec<String>,
    pub vegetation_keywords: Vec<String>,
    pub building_keywords: Vec<String>,
    /// Props whose name contains one of these are never snapped.
    pub skip_patterns: Vec<String>,
    /// Node names containing one of these are the terrain itself.
    pub terrain_markers: Vec<String>,
    /// Parent paths containing one of these hold parent-relative children.
    pub relative_parent_markers: Vec<String>,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            grid_resolution: DEFAULT_GRID_RESOLUTION,
            gap_fill_passes: DEFAULT_GAP_FILL_PASSES,
            min_clearance: DEFAULT_MIN_CLEARANCE,
            max_float_distance: DEFAULT_MAX_FLOAT_DISTANCE,
            settle_offset: DEFAULT_SETTLE_OFFSET,
            vegetation_radius: DEFAULT_VEGETATION_RADIUS,
            small_prop_radius: DEFAULT_SMALL_PROP_RADIUS,
            large_prop_radius: DEFAULT_LARGE_PROP_RADIUS,
            large_prop_bias: DEFAULT_LARGE_PROP_BIAS,
            spawn_offset: DEFAULT_SPAWN_OFFSET,
            adjust_epsilon: DEFAULT_ADJUST_EPSILON,
            hq_keywords: strings(&["hq"]),
            spawn_keywords: strings(&["spawnpoint", "spawn_point", "spawner"]),
            capture_point_keywords: strings(&["capturepoint", "capture_point", "controlpoint"]),
            vegetation_keywords: strings(&[
                "tree", "bush", "shrub", "grass", "fern", "pine", "birch", "oak", "spruce",
                "palm", "foliage", "hedge", "plant",
            ]),
            building_keywords: strings(&[
                "building", "house", "barn", "bunker", "hangar", "tower", "church", "factory",
                "warehouse", "bridge", "wall", "shed",
            ]),
            skip_patterns: strings(&["water", "liquid", "decal", "puddle", "river", "ocean"]),
            terrain_markers: strings(&["Terrain"]),
            relative_parent_markers: strings(&["HQ_", "CapturePoint_"]),
        }
    }
}

impl SnapConfig {
    /// Load a config from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: SnapConfig = serde_json::from_slice(&data).map_err(|e| {
            SnapError::Configuration(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds that would make snapping meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.grid_resolution < 2 {
            return Err(SnapError::Configuration(format!(
                "grid_resolution must be at least 2, got {}",
                self.grid_resolution
            )));
        }

        let radii = [
            ("vegetation_radius", self.vegetation_radius),
            ("small_prop_radius", self.small_prop_radius),
            ("large_prop_radius", self.large_prop_radius),
        ];
        for (name, radius) in radii {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(SnapError::Configuration(format!(
                    "{} must be a positive number, got {}",
                    name, radius
                )));
            }
        }

        let non_negative = [
            ("min_clearance", self.min_clearance),
            ("large_prop_bias", self.large_prop_bias),
            ("adjust_epsilon", self.adjust_epsilon),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SnapError::Configuration(format!(
                    "{} must not be negative, got {}",
                    name, value
                )));
            }
        }

        if !self.spawn_offset.is_finite() {
            return Err(SnapError::Configuration(format!(
                "spawn_offset must be finite, got {}",
                self.spawn_offset
            )));
        }

        if !self.max_float_distance.is_finite() || self.max_float_distance <= self.min_clearance {
            return Err(SnapError::Configuration(format!(
                "max_float_distance ({}) must be greater than min_clearance ({})",
                self.max_float_distance, self.min_clearance
            )));
        }

        if !(self.min_clearance..=self.max_float_distance).contains(&self.settle_offset) {
            return Err(SnapError::Configuration(format!(
                "settle_offset ({}) must lie between min_clearance ({}) and max_float_distance ({})",
                self.settle_offset, self.min_clearance, self.max_float_distance
            )));
        }

        Ok(())
    }
}
