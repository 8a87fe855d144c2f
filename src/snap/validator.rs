use serde::{Deserialize, Serialize};

use crate::config::SnapConfig;
use crate::heightfield::HeightSampler;

/// Slack when comparing against the clearance band, so heights that were
/// written out rounded to four decimals are not corrected again.
const TOLERANCE: f32 = 1e-4;

/// What the validator did to a proposed height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correction {
    None,
    /// Proposal was embedded in the terrain.
    Lifted,
    /// Proposal was floating too far above the terrain.
    Lowered,
    /// The terrain could not be re-queried at this position.
    Unverified,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedHeight {
    pub height: f32,
    pub terrain: Option<f32>,
    pub correction: Correction,
    pub reason: String,
}

/// Final pass that keeps every placement between
/// `terrain + min_clearance` and `terrain + max_float_distance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostSnapValidator {
    pub min_clearance: f32,
    pub max_float_distance: f32,
    pub settle_offset: f32,
}

impl PostSnapValidator {
    pub fn from_config(config: &SnapConfig) -> Self {
        Self {
            min_clearance: config.min_clearance,
            max_float_distance: config.max_float_distance,
            settle_offset: config.settle_offset,
        }
    }

    /// Whether `height` sits below the clearance band over `ground`.
    pub fn is_embedded(&self, ground: f32, height: f32) -> bool {
        height < ground + self.min_clearance - TOLERANCE
    }

    pub fn validate(
        &self,
        terrain: &dyn HeightSampler,
        x: f32,
        z: f32,
        proposed: f32,
    ) -> ValidatedHeight {
        let ground = match terrain.height_at(x, z) {
            Ok(h) => h,
            Err(e) => {
                return ValidatedHeight {
                    height: proposed,
                    terrain: None,
                    correction: Correction::Unverified,
                    reason: format!("not validated: {}", e),
                };
            }
        };

        let floor = ground + self.min_clearance;
        let ceiling = ground + self.max_float_distance;

        if self.is_embedded(ground, proposed) {
            ValidatedHeight {
                height: floor,
                terrain: Some(ground),
                correction: Correction::Lifted,
                reason: format!(
                    "lifted {:.3} to clearance above terrain {:.3}",
                    floor - proposed,
                    ground
                ),
            }
        } else if proposed > ceiling + TOLERANCE {
            let settled = ground + self.settle_offset;
            ValidatedHeight {
                height: settled,
                terrain: Some(ground),
                correction: Correction::Lowered,
                reason: format!(
                    "lowered {:.3} to settle on terrain {:.3}",
                    proposed - settled,
                    ground
                ),
            }
        } else {
            ValidatedHeight {
                height: proposed,
                terrain: Some(ground),
                correction: Correction::None,
                reason: String::new(),
            }
        }
    }
}

impl Default for PostSnapValidator {
    fn default() -> Self {
        Self::from_config(&SnapConfig::default())
    }
}
