use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::validator::Correction;

/// A height that was rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementChange {
    /// 1-based line number of the transform.
    pub line: usize,
    pub name: String,
    /// Strategy category that handled the placement.
    pub category: String,
    pub from: f32,
    pub to: f32,
    pub reason: String,
}

/// A placement that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementIssue {
    pub line: usize,
    /// Node name, if the header was readable.
    pub name: Option<String>,
    pub message: String,
}

/// Aggregate outcome of snapping one scene (or a merged batch).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapStatistics {
    /// Placements that reached a strategy.
    pub processed: u32,
    /// Adjusted placements by strategy category.
    pub adjusted: BTreeMap<String, u32>,
    /// Processed placements whose height was kept.
    pub unchanged: u32,
    /// Placements no strategy accepted.
    pub skipped: u32,
    /// Malformed headers or transforms.
    pub errors: u32,
    /// Children of gameplay containers, left alone.
    pub relative_skipped: u32,
    /// Terrain nodes, left alone.
    pub terrain_excluded: u32,
    pub validator_lifted: u32,
    pub validator_lowered: u32,
    pub changes: Vec<PlacementChange>,
    pub issues: Vec<PlacementIssue>,
}

impl SnapStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_change(&mut self, change: PlacementChange) {
        self.processed += 1;
        *self.adjusted.entry(change.category.clone()).or_insert(0) += 1;
        self.changes.push(change);
    }

    pub fn record_unchanged(&mut self) {
        self.processed += 1;
        self.unchanged += 1;
    }

    pub fn record_correction(&mut self, correction: Correction) {
        match correction {
            Correction::Lifted => self.validator_lifted += 1,
            Correction::Lowered => self.validator_lowered += 1,
            Correction::None | Correction::Unverified => {}
        }
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_relative(&mut self) {
        self.relative_skipped += 1;
    }

    pub fn record_terrain(&mut self) {
        self.terrain_excluded += 1;
    }

    pub fn record_error(&mut self, issue: PlacementIssue) {
        self.errors += 1;
        self.issues.push(issue);
    }

    /// Sum of adjusted placements across all categories.
    pub fn total_adjusted(&self) -> u32 {
        self.adjusted.values().sum()
    }

    pub fn has_changes(&self) -> bool {
        self.total_adjusted() > 0
    }

    /// Fold another file's statistics into this one. Line-level detail is
    /// concatenated in order.
    pub fn merge(&mut self, other: &SnapStatistics) {
        self.processed += other.processed;
        for (category, count) in &other.adjusted {
            *self.adjusted.entry(category.clone()).or_insert(0) += count;
        }
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.relative_skipped += other.relative_skipped;
        self.terrain_excluded += other.terrain_excluded;
        self.validator_lifted += other.validator_lifted;
        self.validator_lowered += other.validator_lowered;
        self.changes.extend(other.changes.iter().cloned());
        self.issues.extend(other.issues.iter().cloned());
    }

    /// Human-readable report.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Processed {} placements: {} adjusted, {} unchanged",
            self.processed,
            self.total_adjusted(),
            self.unchanged
        );
        for (category, count) in &self.adjusted {
            let _ = writeln!(out, "  {:<12} {}", category, count);
        }
        if self.validator_lifted + self.validator_lowered > 0 {
            let _ = writeln!(
                out,
                "Validator: {} lifted, {} lowered",
                self.validator_lifted, self.validator_lowered
            );
        }
        let _ = writeln!(
            out,
            "Skipped: {} unmatched, {} parent-relative, {} terrain",
            self.skipped, self.relative_skipped, self.terrain_excluded
        );
        let _ = write!(out, "Errors: {}", self.errors);
        for issue in &self.issues {
            let _ = write!(out, "\n  line {}: {}", issue.line, issue.message);
        }
        out
    }
}
