use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use terrain_snap_lib::heightfield::export::{encode_height_png, export_grid_glb};
use terrain_snap_lib::mesh::load_point_cloud;
use terrain_snap_lib::snap::{snap_directory, SceneSnapper, SnapOptions, SnapStatistics};
use terrain_snap_lib::{HeightGrid, SnapConfig};

#[derive(Parser, Debug)]
#[command(name = "terrain-snap", version, about = "Snap converted map placements onto terrain")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snap one or more scene files in place
    Snap {
        #[command(flatten)]
        terrain: TerrainArgs,

        #[command(flatten)]
        write: WriteArgs,

        /// Scene files to rewrite
        #[arg(required = true)]
        scenes: Vec<PathBuf>,
    },
    /// Snap every scene file in a directory
    Batch {
        #[command(flatten)]
        terrain: TerrainArgs,

        #[command(flatten)]
        write: WriteArgs,

        #[arg(long)]
        dir: PathBuf,

        /// Scene file extension
        #[arg(long, default_value = "tscn")]
        ext: String,
    },
    /// Print the terrain height at one point
    Probe {
        #[command(flatten)]
        terrain: TerrainArgs,

        #[arg(long, allow_hyphen_values = true)]
        x: f32,

        #[arg(long, allow_hyphen_values = true)]
        z: f32,
    },
    /// Write the resampled height grid as a PNG (and optionally a GLB)
    Heightmap {
        #[command(flatten)]
        terrain: TerrainArgs,

        /// 16-bit grayscale PNG output
        #[arg(long)]
        out: PathBuf,

        /// Grid surface as a GLB mesh
        #[arg(long)]
        glb: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct TerrainArgs {
    /// Terrain mesh (.glb)
    #[arg(long)]
    mesh: PathBuf,

    /// JSON config; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    resolution: Option<usize>,

    #[arg(long)]
    min_clearance: Option<f32>,

    #[arg(long)]
    max_float: Option<f32>,
}

#[derive(Args, Debug)]
struct WriteArgs {
    /// Run the pass without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Do not keep a .bak copy of rewritten files
    #[arg(long)]
    no_backup: bool,

    /// Write statistics as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

impl WriteArgs {
    fn options(&self) -> SnapOptions {
        SnapOptions {
            dry_run: self.dry_run,
            backup: !self.no_backup,
        }
    }
}

impl TerrainArgs {
    fn config(&self) -> Result<SnapConfig> {
        let mut config = match &self.config {
            Some(path) => SnapConfig::from_file(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => SnapConfig::default(),
        };
        if let Some(resolution) = self.resolution {
            config.grid_resolution = resolution;
        }
        if let Some(clearance) = self.min_clearance {
            config.min_clearance = clearance;
        }
        if let Some(max_float) = self.max_float {
            config.max_float_distance = max_float;
        }
        config.validate()?;
        Ok(config)
    }

    fn load(&self) -> Result<(SnapConfig, HeightGrid)> {
        let config = self.config()?;
        let cloud = load_point_cloud(&self.mesh)
            .with_context(|| format!("Failed to load terrain mesh: {}", self.mesh.display()))?;
        let grid = HeightGrid::from_config(&cloud, &config)?;

        let b = grid.bounds();
        info!(
            "terrain: {} vertices, x {:.2}..{:.2}, z {:.2}..{:.2}, height {:.2}..{:.2}",
            cloud.len(),
            b.min_x,
            b.max_x,
            b.min_z,
            b.max_z,
            b.min_height,
            b.max_height
        );
        Ok((config, grid))
    }
}

fn write_report<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Snap {
            terrain,
            write,
            scenes,
        } => {
            let (config, grid) = terrain.load()?;
            let snapper = SceneSnapper::new(&grid, &config)?;
            let options = write.options();

            let mut total = SnapStatistics::new();
            for scene in &scenes {
                let stats = snapper.snap_file(scene, &options)?;
                total.merge(&stats);
            }

            println!("{}", total.summary());
            if let Some(path) = &write.report {
                write_report(path, &total)?;
            }
        }
        Command::Batch {
            terrain,
            write,
            dir,
            ext,
        } => {
            let (config, grid) = terrain.load()?;
            let snapper = SceneSnapper::new(&grid, &config)?;
            let report = snap_directory(&snapper, &dir, &ext, &write.options())?;

            for file in &report.files {
                match (&file.stats, &file.error) {
                    (Some(stats), _) => println!(
                        "{}: {} adjusted, {} errors",
                        file.path.display(),
                        stats.total_adjusted(),
                        stats.errors
                    ),
                    (None, Some(error)) => println!("{}: FAILED {}", file.path.display(), error),
                    (None, None) => {}
                }
            }
            println!("{}", report.total.summary());
            if let Some(path) = &write.report {
                write_report(path, &report)?;
            }
            if report.failed() > 0 {
                anyhow::bail!("{} of {} files failed", report.failed(), report.files.len());
            }
        }
        Command::Probe { terrain, x, z } => {
            let (_, grid) = terrain.load()?;
            let height = grid.height_at(x, z)?;
            println!("{}", height);
        }
        Command::Heightmap { terrain, out, glb } => {
            let (_, grid) = terrain.load()?;
            encode_height_png(&grid, &out)?;
            println!("Wrote {}", out.display());
            if let Some(glb) = glb {
                export_grid_glb(&grid, &glb)?;
                println!("Wrote {}", glb.display());
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
