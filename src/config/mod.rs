//! Configuration module for the stress router.

// Can all be private now because we have a public re-export.
mod analysis;
mod debug;
mod demo;
mod persistence;
mod types;

// Re-export commonly used items
pub use analysis::{
    ANALYSIS, AggregationConfig, AnalysisConfig, DEFAULT_MIN_RELIABLE_SAMPLES, ExplorerConfig,
    LearnerConfig, SearchConfig, TessellationConfig,
};
pub use debug::DF;
pub use demo::DEMO;
pub use persistence::{PERSISTENCE, model_registry_filename};
pub use types::{
    Alpha, CoordinateSystem, EdgeCost, GeometricHeuristic, SearchWeight, StressAttachment,
    StressFallback,
};
