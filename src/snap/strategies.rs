//! Per-category snapping policies.

use super::{contains_keyword, SnapResult, SnapStrategy};
use crate::config::SnapConfig;
use crate::error::SnapError;
use crate::heightfield::HeightSampler;

/// Lowest terrain height under a 5-point cross (centre plus the four
/// cardinal points at `radius`). Out-of-bounds points are ignored; if none
/// are valid the centre's error is returned.
fn lowest_cross_sample(
    terrain: &dyn HeightSampler,
    x: f32,
    z: f32,
    radius: f32,
) -> Result<(f32, usize), SnapError> {
    let points = [
        (x, z),
        (x + radius, z),
        (x - radius, z),
        (x, z + radius),
        (x, z - radius),
    ];

    let mut lowest: Option<f32> = None;
    let mut valid = 0;
    let mut first_error = None;
    for (px, pz) in points {
        match terrain.height_at(px, pz) {
            Ok(h) => {
                lowest = Some(lowest.map_or(h, |l| l.min(h)));
                valid += 1;
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match (lowest, first_error) {
        (Some(h), _) => Ok((h, valid)),
        (None, Some(e)) => Err(e),
        (None, None) => Err(SnapError::OutOfBounds { x, z }),
    }
}

// ============================================================================
// Gameplay objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GameplayKind {
    Hq,
    Spawn,
    CapturePoint,
}

/// HQs, spawn points and capture points: one sample, fixed offset.
#[derive(Debug, Clone)]
pub struct GameplayStrategy {
    hq_keywords: Vec<String>,
    spawn_keywords: Vec<String>,
    capture_point_keywords: Vec<String>,
    spawn_offset: f32,
    epsilon: f32,
}

impl GameplayStrategy {
    pub fn new(config: &SnapConfig) -> Self {
        Self {
            hq_keywords: config.hq_keywords.clone(),
            spawn_keywords: config.spawn_keywords.clone(),
            capture_point_keywords: config.capture_point_keywords.clone(),
            spawn_offset: config.spawn_offset,
            epsilon: config.adjust_epsilon,
        }
    }

    // Spawns are checked first: "HQ_Team1_SpawnPoint_3" is a spawn.
    fn classify(&self, text: &str) -> Option<GameplayKind> {
        if contains_keyword(text, &self.spawn_keywords) {
            Some(GameplayKind::Spawn)
        } else if contains_keyword(text, &self.capture_point_keywords) {
            Some(GameplayKind::CapturePoint)
        } else if contains_keyword(text, &self.hq_keywords) {
            Some(GameplayKind::Hq)
        } else {
            None
        }
    }

    /// Name first, then declared type.
    fn classify_placement(&self, name: &str, declared_type: Option<&str>) -> Option<GameplayKind> {
        self.classify(name)
            .or_else(|| declared_type.and_then(|t| self.classify(t)))
    }

    fn offset(&self, kind: Option<GameplayKind>) -> f32 {
        match kind {
            Some(GameplayKind::Spawn) => self.spawn_offset,
            _ => 0.0,
        }
    }
}

impl SnapStrategy for GameplayStrategy {
    fn category_name(&self) -> &str {
        "gameplay"
    }

    fn can_handle(&self, name: &str, declared_type: Option<&str>) -> bool {
        self.classify_placement(name, declared_type).is_some()
    }

    fn compute_height(
        &self,
        terrain: &dyn HeightSampler,
        x: f32,
        z: f32,
        current_y: f32,
        name: &str,
        declared_type: Option<&str>,
    ) -> SnapResult {
        let kind = self.classify_placement(name, declared_type);
        match terrain.height_at(x, z) {
            Ok(ground) => {
                let offset = self.offset(kind);
                SnapResult::proposed(
                    current_y,
                    ground + offset,
                    self.epsilon,
                    format!("gameplay object on terrain {:.3} (+{})", ground, offset),
                )
            }
            Err(e) => SnapResult::unchanged(current_y, format!("kept height: {}", e)),
        }
    }
}

// ============================================================================
// Vegetation
// ============================================================================

/// Trees and plants: lowest of the trunk and four points around it, so a
/// trunk on a slope never hangs over its downhill side.
#[derive(Debug, Clone)]
pub struct VegetationStrategy {
    keywords: Vec<String>,
    radius: f32,
    epsilon: f32,
}

impl VegetationStrategy {
    pub fn new(config: &SnapConfig) -> Self {
        Self {
            keywords: config.vegetation_keywords.clone(),
            radius: config.vegetation_radius,
            epsilon: config.adjust_epsilon,
        }
    }
}

impl SnapStrategy for VegetationStrategy {
    fn category_name(&self) -> &str {
        "vegetation"
    }

    fn can_handle(&self, name: &str, declared_type: Option<&str>) -> bool {
        contains_keyword(name, &self.keywords)
            || declared_type.is_some_and(|t| contains_keyword(t, &self.keywords))
    }

    fn compute_height(
        &self,
        terrain: &dyn HeightSampler,
        x: f32,
        z: f32,
        current_y: f32,
        _name: &str,
        _declared_type: Option<&str>,
    ) -> SnapResult {
        match lowest_cross_sample(terrain, x, z, self.radius) {
            Ok((ground, samples)) => SnapResult::proposed(
                current_y,
                ground,
                self.epsilon,
                format!("vegetation on lowest of {} samples ({:.3})", samples, ground),
            ),
            Err(e) => SnapResult::unchanged(current_y, format!("kept height: {}", e)),
        }
    }
}

// ============================================================================
// Generic props
// ============================================================================

/// Everything else except water and decals. Buildings sample a wide
/// footprint and sit slightly proud of it; small props sample tightly.
#[derive(Debug, Clone)]
pub struct PropStrategy {
    skip_patterns: Vec<String>,
    building_keywords: Vec<String>,
    small_radius: f32,
    large_radius: f32,
    large_bias: f32,
    epsilon: f32,
}

impl PropStrategy {
    pub fn new(config: &SnapConfig) -> Self {
        Self {
            skip_patterns: config.skip_patterns.clone(),
            building_keywords: config.building_keywords.clone(),
            small_radius: config.small_prop_radius,
            large_radius: config.large_prop_radius,
            large_bias: config.large_prop_bias,
            epsilon: config.adjust_epsilon,
        }
    }

    pub fn is_large(&self, name: &str) -> bool {
        contains_keyword(name, &self.building_keywords)
    }
}

impl SnapStrategy for PropStrategy {
    fn category_name(&self) -> &str {
        "prop"
    }

    fn can_handle(&self, name: &str, declared_type: Option<&str>) -> bool {
        !contains_keyword(name, &self.skip_patterns)
            && !declared_type.is_some_and(|t| contains_keyword(t, &self.skip_patterns))
    }

    fn compute_height(
        &self,
        terrain: &dyn HeightSampler,
        x: f32,
        z: f32,
        current_y: f32,
        name: &str,
        declared_type: Option<&str>,
    ) -> SnapResult {
        let large = self.is_large(name) || declared_type.is_some_and(|t| self.is_large(t));
        let (radius, bias, label) = if large {
            (self.large_radius, self.large_bias, "large prop")
        } else {
            (self.small_radius, 0.0, "small prop")
        };

        match lowest_cross_sample(terrain, x, z, radius) {
            Ok((ground, samples)) => SnapResult::proposed(
                current_y,
                ground + bias,
                self.epsilon,
                format!("{} on lowest of {} samples ({:.3})", label, samples, ground),
            ),
            Err(e) => SnapResult::unchanged(current_y, format!("kept height: {}", e)),
        }
    }
}

/// The standard ordered strategy list: gameplay, vegetation, then props as
/// the catch-all.
pub fn default_strategies(config: &SnapConfig) -> Vec<Box<dyn SnapStrategy>> {
    vec![
        Box::new(GameplayStrategy::new(config)),
        Box::new(VegetationStrategy::new(config)),
        Box::new(PropStrategy::new(config)),
    ]
}
