//! glbtidy command-line tool
//!
//! ```text
//! glbtidy input.glb output.glb 20000 --angle-limit 60 --threads 4
//! ```
//!
//! Every object of the input runs through dedup, loose-geometry removal, hole filling,
//! normal recomputation, decimation and UV unwrapping. Objects that fail are written
//! back unmodified; the process exits non-zero only when nothing could be processed.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use glbtidy_io::{read_glb, write_glb};
use glbtidy_pipeline::{MeshPipeline, PipelineConfig, RunReport};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Clean up, decimate and UV-unwrap the meshes of a GLB file
#[derive(Parser, Debug)]
#[command(name = "glbtidy")]
#[command(about = "Mesh cleanup and simplification for GLB assets", long_about = None)]
#[command(version)]
struct Cli {
    /// Input GLB file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output GLB file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Triangle budget per object
    #[arg(value_name = "TARGET_FACES", default_value_t = 50_000)]
    target_faces: usize,

    /// Vertex merge distance in model units
    #[arg(long, default_value_t = 1e-4)]
    dedup_epsilon: f32,

    /// UV chart angle limit in degrees
    #[arg(long, default_value_t = 66.0)]
    angle_limit: f32,

    /// Gap between UV islands in UV units
    #[arg(long, default_value_t = 0.01)]
    island_margin: f32,

    /// Worker threads (defaults to one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Process objects one after another
    #[arg(long)]
    sequential: bool,

    /// Log per-stage detail
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default()
            .with_target_faces(self.target_faces)
            .with_dedup_epsilon(self.dedup_epsilon)
            .with_angle_limit(self.angle_limit)
            .with_island_margin(self.island_margin)
            .with_parallel(!self.sequential);
        if let Some(threads) = self.threads {
            config = config.with_threads(threads);
        }
        config
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<RunReport> {
    let pipeline = MeshPipeline::new(cli.config()).context("Invalid settings")?;

    let scene = read_glb(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    info!(
        path = %cli.input.display(),
        objects = scene.len(),
        faces = scene.total_faces(),
        "Loaded scene"
    );
    if scene.is_empty() {
        bail!("{} contains no triangle meshes", cli.input.display());
    }

    let (scene, report) = pipeline.process_scene(scene)?;

    write_glb(&scene, &cli.output)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;
    info!(path = %cli.output.display(), faces = scene.total_faces(), "Wrote scene");

    Ok(report)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(report) => {
            println!("{report}");
            if report.all_failed() {
                eprintln!("error: no object could be processed");
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_positional_target() {
        let cli = Cli::parse_from(["glbtidy", "in.glb", "out.glb", "1200"]);
        assert_eq!(cli.target_faces, 1200);
        let config = cli.config();
        assert_eq!(config.target_faces, 1200);
        assert!(config.parallel);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_match_pipeline() {
        let cli = Cli::parse_from(["glbtidy", "in.glb", "out.glb"]);
        let config = cli.config();
        let defaults = PipelineConfig::default();
        assert_eq!(config.target_faces, defaults.target_faces);
        assert_eq!(config.dedup_epsilon, defaults.dedup_epsilon);
        assert_eq!(config.angle_limit_deg, defaults.angle_limit_deg);
        assert_eq!(config.island_margin, defaults.island_margin);
    }

    #[test]
    fn test_options() {
        let cli = Cli::parse_from([
            "glbtidy",
            "in.glb",
            "out.glb",
            "--angle-limit",
            "45",
            "--threads",
            "2",
            "--sequential",
        ]);
        let config = cli.config();
        assert_eq!(config.angle_limit_deg, 45.0);
        assert_eq!(config.num_threads, Some(2));
        assert!(!config.parallel);
    }

    #[test]
    fn test_rejects_bad_target() {
        let cli = Cli::parse_from(["glbtidy", "in.glb", "out.glb", "0"]);
        assert!(MeshPipeline::new(cli.config()).is_err());
    }

    #[test]
    fn test_missing_input_is_error() {
        let cli = Cli::parse_from(["glbtidy", "/nonexistent/in.glb", "/tmp/out.glb"]);
        assert!(run(&cli).is_err());
    }
}
