#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

// Core modules
pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod models;
pub mod utils;

// Re-export commonly used types outside of crate (for the binaries and tests)
pub use analysis::{ParetoExplorer, PathfindingEngine, SearchQuery, SweepSpec};
pub use config::{ANALYSIS, AnalysisConfig, PERSISTENCE};
pub use domain::{FeatureVector, GraphSpec, NodeId, SensorId, SensorManifest, StreetGraph, ZoneId};
pub use engine::StressEngine;
pub use error::{FailureCategory, StressError, StressResult};
pub use models::{ModelRegistry, ParetoFront, Path, SearchParams};

// CLI argument parsing
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Stress-aware pedestrian routing over camera-observed corridors", long_about = None)]
pub struct Cli {
    /// JSON file replacing the built-in analysis configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the model registry
    #[arg(long, global = true)]
    pub model_dir: Option<PathBuf>,

    /// Print results as JSON instead of tables
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Corridor inputs shared by most subcommands.
#[derive(Args, Debug, Clone)]
pub struct CorridorArgs {
    /// Sensor manifest (JSON)
    #[arg(long)]
    pub manifest: PathBuf,

    /// Street graph (JSON)
    #[arg(long)]
    pub graph: PathBuf,

    /// Feature stream (JSON lines), folded into zone profiles before the command runs
    #[arg(long)]
    pub features: Option<PathBuf>,

    /// Records per ingestion batch
    #[arg(long, default_value_t = 512)]
    pub batch_size: usize,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Partition the corridor into zones and assign the street graph
    Tessellate(CorridorArgs),

    /// Fit a new stress model from the feature stream
    Train {
        #[command(flatten)]
        corridor: CorridorArgs,

        /// Per-zone stress labels replacing the observed stress proxy
        #[arg(long)]
        labels: Option<PathBuf>,

        /// Deploy the new version right away
        #[arg(long, default_value_t = false)]
        promote: bool,
    },

    /// Single route between two intersections
    Route {
        #[command(flatten)]
        corridor: CorridorArgs,
        #[arg(long)]
        start: u64,
        #[arg(long)]
        goal: u64,
        /// Suboptimality factor W >= 1
        #[arg(long)]
        weight: Option<f64>,
        /// Blend between geometric (0) and learned (1) heuristic
        #[arg(long)]
        alpha: Option<f64>,
    },

    /// Sweep search configurations into a distance / stress Pareto front
    Pareto {
        #[command(flatten)]
        corridor: CorridorArgs,
        #[arg(long)]
        start: u64,
        #[arg(long)]
        goal: u64,
        /// Random sweep with this many samples instead of the configured grid
        #[arg(long)]
        samples: Option<usize>,
        /// Seed for the random sweep (defaults to the configured seed)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Inspect or change the model registry
    #[command(subcommand)]
    Models(ModelsCommand),

    /// Print the built-in configuration as JSON (a starting point for --config)
    DumpConfig,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ModelsCommand {
    List,
    Promote { version: u32 },
    Rollback,
    /// Write one version as JSON
    Export { version: u32, path: PathBuf },
}
