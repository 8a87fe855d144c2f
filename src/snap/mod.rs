pub mod orchestrator;
pub mod report;
pub mod scene;
pub mod strategies;
pub mod validator;

pub use orchestrator::{
    backup_path, snap_directory, BatchReport, FileReport, SceneSnapper, SnapOptions, SnapOutcome,
};
pub use report::{PlacementChange, PlacementIssue, SnapStatistics};
pub use strategies::{default_strategies, GameplayStrategy, PropStrategy, VegetationStrategy};
pub use validator::{Correction, PostSnapValidator, ValidatedHeight};

use crate::heightfield::HeightSampler;

/// Height proposed by a strategy for one placement.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapResult {
    pub original_height: f32,
    pub proposed_height: f32,
    /// The strategy moved the height. Whether the line is rewritten is
    /// decided later from the validated height, since the validator can
    /// undo a proposal (a tree pulled down, then lifted back to clearance).
    pub was_adjusted: bool,
    pub reason: String,
}

impl SnapResult {
    /// Keep the current height.
    pub fn unchanged(current: f32, reason: impl Into<String>) -> Self {
        Self {
            original_height: current,
            proposed_height: current,
            was_adjusted: false,
            reason: reason.into(),
        }
    }

    /// Propose `proposed`, treating changes of at most `epsilon` as no-ops.
    pub fn proposed(current: f32, proposed: f32, epsilon: f32, reason: impl Into<String>) -> Self {
        if (proposed - current).abs() <= epsilon {
            return Self::unchanged(current, "already resting on terrain");
        }
        Self {
            original_height: current,
            proposed_height: proposed,
            was_adjusted: true,
            reason: reason.into(),
        }
    }
}

/// One snapping policy for a family of objects.
///
/// Strategies are tried in order and the first one whose `can_handle`
/// accepts a placement computes its height. `compute_height` never fails:
/// a terrain lookup error becomes an unchanged result with the error as the
/// reason.
pub trait SnapStrategy: Send + Sync {
    /// Label used for statistics, e.g. `"vegetation"`.
    fn category_name(&self) -> &str;

    fn can_handle(&self, name: &str, declared_type: Option<&str>) -> bool;

    fn compute_height(
        &self,
        terrain: &dyn HeightSampler,
        x: f32,
        z: f32,
        current_y: f32,
        name: &str,
        declared_type: Option<&str>,
    ) -> SnapResult;
}

/// Case-insensitive substring match against a keyword list.
pub fn contains_keyword(haystack: &str, keywords: &[String]) -> bool {
    let haystack = haystack.to_ascii_lowercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && haystack.contains(&k.to_ascii_lowercase()))
}
