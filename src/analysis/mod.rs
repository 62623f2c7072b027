// Zone partitioning, aggregation, learning and search
pub mod feature_aggregator;
pub mod heuristic_learner;
pub mod pareto_explorer;
pub mod pathfinder;
pub mod zone_tessellator;

pub use {
    feature_aggregator::{FeatureAggregator, IngestReport, Rejection},
    heuristic_learner::{HeuristicLearner, TrainingSample, ZoneSample, ridge_fit},
    pareto_explorer::{ParetoExplorer, SweepSpec},
    pathfinder::{PathfindingEngine, SearchQuery},
    zone_tessellator::{AssignmentSummary, Tessellation, ZoneTessellator},
};
