//! Applies the snapping strategies to every placement in a scene.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::report::{PlacementChange, PlacementIssue, SnapStatistics};
use super::scene::{
    is_section_header, parse_node_header, parse_transform, replace_height, split_lines,
    NodeHeader, Placement,
};
use super::strategies::default_strategies;
use super::validator::{Correction, PostSnapValidator};
use super::SnapStrategy;
use crate::config::SnapConfig;
use crate::error::Result;
use crate::heightfield::HeightSampler;

/// Where the scanner is within the scene.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanState {
    /// Outside any node, or inside a non-node section.
    Scanning,
    /// Inside a node whose transform is in world space.
    InNode(NodeHeader),
    /// Inside a node whose transform is relative to a gameplay container.
    SkipRelative(NodeHeader),
    /// Inside a terrain node.
    SkipTerrain(NodeHeader),
    EndOfFile,
}

/// Rewritten scene text plus what happened to it.
#[derive(Debug, Clone)]
pub struct SnapOutcome {
    pub text: String,
    pub stats: SnapStatistics,
}

#[derive(Debug, Clone, Copy)]
pub struct SnapOptions {
    /// Run the full pass without touching the file.
    pub dry_run: bool,
    /// Copy the original to `<file>.bak` before overwriting it.
    pub backup: bool,
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup: true,
        }
    }
}

/// Snaps scenes against one terrain.
///
/// Holds only immutable configuration, so a single snapper can process any
/// number of files one after another; every call to [`snap_text`] runs its
/// own pass with fresh statistics.
///
/// [`snap_text`]: SceneSnapper::snap_text
pub struct SceneSnapper<'a> {
    terrain: &'a dyn HeightSampler,
    strategies: Vec<Box<dyn SnapStrategy>>,
    validator: PostSnapValidator,
    epsilon: f32,
    terrain_markers: Vec<String>,
    relative_parent_markers: Vec<String>,
}

impl<'a> SceneSnapper<'a> {
    /// Snapper with the default strategies. Fails if `config` is invalid.
    pub fn new(terrain: &'a dyn HeightSampler, config: &SnapConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            terrain,
            strategies: default_strategies(config),
            validator: PostSnapValidator::from_config(config),
            epsilon: config.adjust_epsilon,
            terrain_markers: config.terrain_markers.clone(),
            relative_parent_markers: config.relative_parent_markers.clone(),
        })
    }

    /// Replace the strategy list. Order matters: the first strategy that
    /// accepts a placement handles it.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn SnapStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn strategies(&self) -> &[Box<dyn SnapStrategy>] {
        &self.strategies
    }

    /// Snap every placement in `text`. Only height fields change; every
    /// other byte, line terminators included, is copied through.
    pub fn snap_text(&self, text: &str) -> SnapOutcome {
        let mut pass = ScenePass {
            snapper: self,
            state: ScanState::Scanning,
            stats: SnapStatistics::new(),
        };

        let mut output = String::with_capacity(text.len());
        let mut lines = split_lines(text).enumerate();
        while pass.state != ScanState::EndOfFile {
            let Some((idx, (line, terminator))) = lines.next() else {
                pass.finish();
                continue;
            };
            match pass.process_line(line, idx + 1) {
                Some(rewritten) => output.push_str(&rewritten),
                None => output.push_str(line),
            }
            output.push_str(terminator);
        }

        SnapOutcome {
            text: output,
            stats: pass.stats,
        }
    }

    /// Snap a scene file in place.
    pub fn snap_file(&self, path: &Path, options: &SnapOptions) -> anyhow::Result<SnapStatistics> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene: {}", path.display()))?;

        let outcome = self.snap_text(&text);
        let stats = outcome.stats;

        if options.dry_run {
            info!(
                "dry run: {} would adjust {} of {} placements",
                path.display(),
                stats.total_adjusted(),
                stats.processed
            );
            return Ok(stats);
        }

        if outcome.text == text {
            info!("{}: nothing to adjust", path.display());
            return Ok(stats);
        }

        if options.backup {
            let backup = backup_path(path);
            fs::copy(path, &backup)
                .with_context(|| format!("Failed to write backup: {}", backup.display()))?;
            debug!("backed up {} to {}", path.display(), backup.display());
        }

        fs::write(path, &outcome.text)
            .with_context(|| format!("Failed to write scene: {}", path.display()))?;
        info!(
            "{}: adjusted {} of {} placements",
            path.display(),
            stats.total_adjusted(),
            stats.processed
        );

        Ok(stats)
    }
}

/// `<file>.bak` next to the original, keeping the original extension.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// State for one pass over one scene.
struct ScenePass<'s, 'a> {
    snapper: &'s SceneSnapper<'a>,
    state: ScanState,
    stats: SnapStatistics,
}

impl ScenePass<'_, '_> {
    /// Returns the replacement for `line`, or `None` to copy it unchanged.
    fn process_line(&mut self, line: &str, line_no: usize) -> Option<String> {
        if is_section_header(line) {
            self.state = match parse_node_header(line, line_no) {
                Ok(Some(header)) => self.classify(header),
                Ok(None) => ScanState::Scanning,
                Err(e) => {
                    warn!("{}", e);
                    self.stats.record_error(PlacementIssue {
                        line: line_no,
                        name: None,
                        message: e.to_string(),
                    });
                    ScanState::Scanning
                }
            };
            return None;
        }

        let header = match &self.state {
            ScanState::Scanning | ScanState::EndOfFile => return None,
            ScanState::SkipRelative(header) => {
                if is_transform_line(line, line_no) {
                    debug!("line {}: {} is parent-relative, skipped", line_no, header.name);
                    self.stats.record_relative();
                }
                return None;
            }
            ScanState::SkipTerrain(header) => {
                if is_transform_line(line, line_no) {
                    debug!("line {}: {} is terrain, skipped", line_no, header.name);
                    self.stats.record_terrain();
                }
                return None;
            }
            ScanState::InNode(header) => header.clone(),
        };

        let transform = match parse_transform(line, line_no) {
            Ok(Some(transform)) => transform,
            Ok(None) => return None,
            Err(e) => {
                warn!("{} ({})", e, header.name);
                self.stats.record_error(PlacementIssue {
                    line: line_no,
                    name: Some(header.name),
                    message: e.to_string(),
                });
                return None;
            }
        };

        let placement = Placement::new(line_no, &header, &transform);
        let new_height = self.snap_placement(&placement)?;
        Some(replace_height(line, &transform, new_height))
    }

    /// Enter the terminal state at end of input.
    fn finish(&mut self) {
        debug!(
            processed = self.stats.processed,
            adjusted = self.stats.total_adjusted(),
            skipped = self.stats.skipped,
            errors = self.stats.errors,
            "scene pass finished"
        );
        self.state = ScanState::EndOfFile;
    }

    fn classify(&self, header: NodeHeader) -> ScanState {
        if header.is_terrain(&self.snapper.terrain_markers) {
            ScanState::SkipTerrain(header)
        } else if header.has_relative_parent(&self.snapper.relative_parent_markers) {
            ScanState::SkipRelative(header)
        } else {
            ScanState::InNode(header)
        }
    }

    /// Run strategy then validator. `Some(height)` when the placement moves.
    fn snap_placement(&mut self, placement: &Placement) -> Option<f32> {
        let snapper = self.snapper;

        let Some(strategy) = snapper
            .strategies
            .iter()
            .find(|s| s.can_handle(&placement.name, placement.node_type.as_deref()))
        else {
            debug!("line {}: no strategy for {}", placement.line, placement.name);
            self.stats.record_skipped();
            return None;
        };

        let proposal = strategy.compute_height(
            snapper.terrain,
            placement.x,
            placement.z,
            placement.y,
            &placement.name,
            placement.node_type.as_deref(),
        );
        let validated = snapper.validator.validate(
            snapper.terrain,
            placement.x,
            placement.z,
            proposal.proposed_height,
        );

        // Sub-epsilon moves are dropped unless the object is currently
        // embedded, which is never acceptable.
        let embedded = validated
            .terrain
            .is_some_and(|ground| snapper.validator.is_embedded(ground, placement.y));
        if (validated.height - placement.y).abs() <= snapper.epsilon && !embedded {
            self.stats.record_unchanged();
            return None;
        }

        self.stats.record_correction(validated.correction);
        let reason = match (proposal.was_adjusted, validated.correction) {
            (_, Correction::None) => proposal.reason,
            (false, _) => validated.reason,
            (true, _) => format!("{}; {}", proposal.reason, validated.reason),
        };
        debug!(
            "line {}: {} [{}] {} -> {} ({})",
            placement.line,
            placement.name,
            strategy.category_name(),
            placement.y,
            validated.height,
            reason
        );
        self.stats.record_change(PlacementChange {
            line: placement.line,
            name: placement.name.clone(),
            category: strategy.category_name().to_string(),
            from: placement.y,
            to: validated.height,
            reason,
        });

        Some(validated.height)
    }
}

fn is_transform_line(line: &str, line_no: usize) -> bool {
    !matches!(parse_transform(line, line_no), Ok(None))
}

/// Statistics for one file of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub stats: Option<SnapStatistics>,
    /// Set when the file could not be read or written.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    pub total: SnapStatistics,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.error.is_some()).count()
    }
}

/// Snap every file in `dir` with the given extension (not recursive),
/// sharing one snapper. A file that fails is recorded and the batch
/// carries on.
pub fn snap_directory(
    snapper: &SceneSnapper<'_>,
    dir: &Path,
    extension: &str,
    options: &SnapOptions,
) -> anyhow::Result<BatchReport> {
    let extension = extension.trim_start_matches('.');
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
        .collect();
    paths.sort();

    info!("snapping {} .{} files in {}", paths.len(), extension, dir.display());

    let mut report = BatchReport::default();
    for path in paths {
        match snapper.snap_file(&path, options) {
            Ok(stats) => {
                report.total.merge(&stats);
                report.files.push(FileReport {
                    path,
                    stats: Some(stats),
                    error: None,
                });
            }
            Err(e) => {
                warn!("{}: {:#}", path.display(), e);
                report.files.push(FileReport {
                    path,
                    stats: None,
                    error: Some(format!("{:#}", e)),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::HeightGrid;
    use crate::mesh::PointCloud;
    use crate::snap::strategies::VegetationStrategy;

    fn flat_terrain(height: f32) -> HeightGrid {
        let mut points = vec![];
        for iz in 0..=10 {
            for ix in 0..=10 {
                points.push([ix as f32, height, iz as f32]);
            }
        }
        HeightGrid::build(&PointCloud::from_points(points), 32, 10).unwrap()
    }

    fn transform(x: f32, y: &str, z: f32) -> String {
        format!("transform = Transform3D(1, 0, 0, 0, 1, 0, 0, 0, 1, {}, {}, {})", x, y, z)
    }

    fn level() -> String {
        [
            "[gd_scene load_steps=3 format=3]".to_string(),
            String::new(),
            r#"[ext_resource type="PackedScene" path="res://birch.glb" id="1_tree"]"#.to_string(),
            String::new(),
            r#"[node name="Level" type="Node3D"]"#.to_string(),
            String::new(),
            r#"[node name="Terrain" parent="." instance=ExtResource("2_terrain")]"#.to_string(),
            transform(0.0, "-20", 0.0),
            String::new(),
            r#"[node name="HQ_Team1" type="Node3D" parent="."]"#.to_string(),
            transform(2.0, "40", 2.0),
            String::new(),
            r#"[node name="SpawnPoint_1_1" type="Marker3D" parent="HQ_Team1"]"#.to_string(),
            transform(1.0, "0.5", 0.0),
            String::new(),
            r#"[node name="SpawnPoint_1_3" type="Marker3D" parent="."]"#.to_string(),
            transform(5.0, "0", 5.0),
            String::new(),
            r#"[node name="Tree_Birch_01" parent="." instance=ExtResource("1_tree")]"#.to_string(),
            transform(5.0, "100", 5.0),
            String::new(),
            r#"[node name="Crate_01" type="MeshInstance3D" parent="."]"#.to_string(),
            transform(5.0, "4.5", 5.0),
            String::new(),
            r#"[node name="WaterPlane" type="MeshInstance3D" parent="."]"#.to_string(),
            transform(5.0, "3", 5.0),
            String::new(),
        ]
        .join("\n")
    }

    fn line_of<'t>(text: &'t str, after_header: &str) -> &'t str {
        let mut lines = text.lines();
        lines
            .by_ref()
            .find(|l| l.contains(after_header))
            .and_then(|_| lines.next())
            .unwrap()
    }

    #[test]
    fn snaps_every_category() {
        let terrain = flat_terrain(5.0);
        let snapper = SceneSnapper::new(&terrain, &SnapConfig::default()).unwrap();
        let outcome = snapper.snap_text(&level());

        assert_eq!(line_of(&outcome.text, "SpawnPoint_1_3"), transform(5.0, "6", 5.0));
        assert_eq!(line_of(&outcome.text, "Tree_Birch_01"), transform(5.0, "5.3", 5.0));
        assert_eq!(line_of(&outcome.text, "Crate_01"), transform(5.0, "5.3", 5.0));
        assert_eq!(line_of(&outcome.text, "\"HQ_Team1\""), transform(2.0, "5.3", 2.0));

        let stats = &outcome.stats;
        assert_eq!(stats.processed, 4);
        assert_eq!(stats.adjusted["gameplay"], 2);
        assert_eq!(stats.adjusted["vegetation"], 1);
        assert_eq!(stats.adjusted["prop"], 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.relative_skipped, 1);
        assert_eq!(stats.terrain_excluded, 1);
        assert_eq!(stats.validator_lifted, 3);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn relative_children_and_terrain_are_untouched() {
        let terrain = flat_terrain(5.0);
        let snapper = SceneSnapper::new(&terrain, &SnapConfig::default()).unwrap();
        let outcome = snapper.snap_text(&level());

        assert_eq!(line_of(&outcome.text, "SpawnPoint_1_1"), transform(1.0, "0.5", 0.0));
        assert_eq!(line_of(&outcome.text, "\"Terrain\""), transform(0.0, "-20", 0.0));
        assert_eq!(line_of(&outcome.text, "WaterPlane"), transform(5.0, "3", 5.0));
    }

    #[test]
    fn only_height_fields_change() {
        let terrain = flat_terrain(5.0);
        let snapper = SceneSnapper::new(&terrain, &SnapConfig::default()).unwrap();
        let input = level();
        let outcome = snapper.snap_text(&input);

        let before: Vec<&str> = input.split('\n').collect();
        let after: Vec<&str> = outcome.text.split('\n').collect();
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(&after) {
            if a != b {
                assert!(a.starts_with("transform = "), "unexpected change: {a}");
            }
        }
    }

    #[test]
    fn second_pass_adjusts_nothing() {
        let terrain = flat_terrain(5.0);
        let snapper = SceneSnapper::new(&terrain, &SnapConfig::default()).unwrap();
        let first = snapper.snap_text(&level());
        let second = snapper.snap_text(&first.text);

        assert_eq!(second.stats.total_adjusted(), 0);
        assert_eq!(second.stats.unchanged, 4);
        assert_eq!(second.text, first.text);
    }

    #[test]
    fn malformed_transform_is_counted_and_passed_through() {
        let terrain = flat_terrain(5.0);
        let snapper = SceneSnapper::new(&terrain, &SnapConfig::default()).unwrap();
        let bad = "transform = Transform3D(1, 0, 0, 0, 1, 0, 0, 0, 1, 5, oops, 5)";
        let input = format!(
            "[node name=\"Rock_01\" parent=\".\"]\n{}\n\n[node name=\"Rock_02\" parent=\".\"]\n{}\n",
            bad,
            transform(3.0, "9", 3.0)
        );

        let outcome = snapper.snap_text(&input);
        assert_eq!(outcome.stats.errors, 1);
        assert_eq!(outcome.stats.issues[0].line, 2);
        assert_eq!(outcome.stats.issues[0].name.as_deref(), Some("Rock_01"));
        assert!(outcome.text.contains(bad));
        assert_eq!(outcome.stats.adjusted["prop"], 1);
    }

    #[test]
    fn transforms_outside_nodes_are_ignored() {
        let terrain = flat_terrain(5.0);
        let snapper = SceneSnapper::new(&terrain, &SnapConfig::default()).unwrap();
        let input = format!(
            "[sub_resource type=\"Environment\" id=\"1\"]\n{}\n",
            transform(5.0, "50", 5.0)
        );

        let outcome = snapper.snap_text(&input);
        assert_eq!(outcome.text, input);
        assert_eq!(outcome.stats, SnapStatistics::new());
    }

    #[test]
    fn crlf_line_endings_survive() {
        let terrain = flat_terrain(5.0);
        let snapper = SceneSnapper::new(&terrain, &SnapConfig::default()).unwrap();
        let input = format!(
            "[node name=\"SpawnPoint_2_1\" parent=\".\"]\r\n{}\r\n\r\n",
            transform(5.0, "0", 5.0)
        );

        let outcome = snapper.snap_text(&input);
        assert_eq!(
            outcome.text,
            format!(
                "[node name=\"SpawnPoint_2_1\" parent=\".\"]\r\n{}\r\n\r\n",
                transform(5.0, "6", 5.0)
            )
        );
    }

    #[test]
    fn off_terrain_placement_keeps_height() {
        let terrain = flat_terrain(5.0);
        let snapper = SceneSnapper::new(&terrain, &SnapConfig::default()).unwrap();
        let input = format!(
            "[node name=\"SpawnPoint_9\" parent=\".\"]\n{}\n",
            transform(1000.0, "12", 1000.0)
        );

        let outcome = snapper.snap_text(&input);
        assert_eq!(outcome.text, input);
        assert_eq!(outcome.stats.unchanged, 1);
        assert_eq!(outcome.stats.total_adjusted(), 0);
    }

    #[test]
    fn custom_strategy_list() {
        let terrain = flat_terrain(5.0);
        let config = SnapConfig::default();
        let snapper = SceneSnapper::new(&terrain, &config)
            .unwrap()
            .with_strategies(vec![Box::new(VegetationStrategy::new(&config))]);
        assert_eq!(snapper.strategies().len(), 1);

        let outcome = snapper.snap_text(&level());
        assert_eq!(outcome.stats.total_adjusted(), 1);
        assert_eq!(outcome.stats.skipped, 4);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let terrain = flat_terrain(5.0);
        let config = SnapConfig {
            vegetation_radius: -1.0,
            ..SnapConfig::default()
        };
        assert!(SceneSnapper::new(&terrain, &config).is_err());
    }

    #[test]
    fn spawn_matched_by_declared_type() {
        let terrain = flat_terrain(5.0);
        let snapper = SceneSnapper::new(&terrain, &SnapConfig::default()).unwrap();
        let input = format!(
            "[node name=\"Marker_7\" type=\"SpawnPoint\" parent=\".\"]\n{}\n",
            transform(5.0, "0", 5.0)
        );

        let outcome = snapper.snap_text(&input);
        assert_eq!(line_of(&outcome.text, "Marker_7"), transform(5.0, "6", 5.0));
        assert_eq!(outcome.stats.adjusted["gameplay"], 1);
    }

    #[test]
    fn slightly_embedded_prop_is_lifted() {
        // 0.008 short of clearance: below the write epsilon but still embedded.
        let terrain = flat_terrain(5.0);
        let snapper = SceneSnapper::new(&terrain, &SnapConfig::default()).unwrap();
        let input = format!(
            "[node name=\"Crate_01\" parent=\".\"]\n{}\n",
            transform(5.0, "5.292", 5.0)
        );

        let first = snapper.snap_text(&input);
        assert_eq!(line_of(&first.text, "Crate_01"), transform(5.0, "5.3", 5.0));
        assert_eq!(first.stats.validator_lifted, 1);

        let second = snapper.snap_text(&first.text);
        assert_eq!(second.stats.total_adjusted(), 0);
        assert_eq!(second.text, first.text);
    }

    #[test]
    fn validator_only_change_reports_validator_reason() {
        let terrain = flat_terrain(5.0);
        let config = SnapConfig {
            spawn_offset: 0.0,
            ..SnapConfig::default()
        };
        let snapper = SceneSnapper::new(&terrain, &config).unwrap();
        let input = format!(
            "[node name=\"SpawnPoint_4\" parent=\".\"]\n{}\n",
            transform(5.0, "5.005", 5.0)
        );

        let outcome = snapper.snap_text(&input);
        assert_eq!(line_of(&outcome.text, "SpawnPoint_4"), transform(5.0, "5.3", 5.0));
        assert!(outcome.stats.changes[0].reason.starts_with("lifted"));
    }

    #[test]
    fn empty_and_unterminated_scenes() {
        let terrain = flat_terrain(5.0);
        let snapper = SceneSnapper::new(&terrain, &SnapConfig::default()).unwrap();

        let empty = snapper.snap_text("");
        assert_eq!(empty.text, "");
        assert_eq!(empty.stats, SnapStatistics::new());

        let input = format!("[node name=\"Tree_9\" parent=\".\"]\n{}", transform(5.0, "80", 5.0));
        let outcome = snapper.snap_text(&input);
        assert_eq!(
            outcome.text,
            format!("[node name=\"Tree_9\" parent=\".\"]\n{}", transform(5.0, "5.3", 5.0))
        );
    }

    #[test]
    fn backup_keeps_extension() {
        assert_eq!(
            backup_path(Path::new("maps/level.tscn")),
            PathBuf::from("maps/level.tscn.bak")
        );
    }
}
