mod learned_model;
mod pareto;
mod path;
mod stress_map;
mod stress_profile;
mod zone;

pub use {
    learned_model::{
        CvMethod, LambdaCandidate, LambdaSelection, LearnedModel, ModelEntry, ModelRegistry,
        Registration,
    },
    pareto::{ParetoEntry, ParetoFront, SweepFailure, dominates, non_dominated_indices},
    path::{Path, SearchParams, Termination},
    stress_map::ZoneStressMap,
    stress_profile::{
        DayKind, ProfileSnapshot, ProfileStats, Reliability, RunningStats, StressProfile,
        TimeBucket,
    },
    zone::Zone,
};

#[cfg(test)]
pub(crate) use learned_model::fixtures as model_fixtures;
