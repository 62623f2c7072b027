//! Analysis and computation configuration

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use super::types::{Alpha, EdgeCost, GeometricHeuristic, SearchWeight, StressAttachment, StressFallback};
use crate::error::{StressError, StressResult};

pub const DEFAULT_MIN_RELIABLE_SAMPLES: u64 = 3;

/// Zone partitioning settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TessellationConfig {
    /// Sensors closer than this (projected metres) are treated as one point.
    pub coincident_tolerance_m: f64,
    /// Padding added around the boundary's bounding box before half-plane clipping.
    pub bbox_margin_m: f64,
}

/// Feature aggregation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// A profile becomes reliable once it has seen this many valid records.
    pub min_reliable_samples: u64,
    /// Track hour-of-day x weekday/weekend sub-profiles.
    pub time_buckets: bool,
    /// Local time offset used to derive buckets from UTC timestamps.
    pub utc_offset_hours: i32,
    /// When set, embeddings must have exactly this many components.
    pub embedding_dim: Option<usize>,
    /// How many rejected records are kept verbatim for inspection.
    pub max_rejection_samples: usize,
}

/// Ridge regression settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Candidate regularisation strengths, ascending.
    pub lambda_grid: Cow<'static, [f64]>,
    /// Up to this many real samples, leave-one-out CV is used instead of k-fold.
    pub loo_max_samples: usize,
    pub k_folds: usize,
    /// Seed for bootstrap augmentation.
    pub augmentation_seed: u64,
    /// Perturbation std-dev as a fraction of each feature's spread.
    pub perturbation_scale: f64,
    /// Cap on the normalised perturbation step, in standard deviations of
    /// each feature. Perturbed values are then clipped to the observed range.
    pub perturbation_bound: f64,
    /// Feature indices whose weights must stay >= 0 (e.g. a geometric-distance feature).
    pub nonnegative_features: Cow<'static, [usize]>,
}

/// Defaults for single-path queries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    pub weight: SearchWeight,
    pub alpha: Alpha,
    pub max_expansions: Option<usize>,
    pub heuristic: GeometricHeuristic,
    pub edge_cost: EdgeCost,
    pub attachment: StressAttachment,
    pub fallback: StressFallback,
}

/// Defaults for Pareto sweeps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExplorerConfig {
    pub weights: Cow<'static, [f64]>,
    pub alphas: Cow<'static, [f64]>,
    pub stochastic_samples: usize,
    pub seed: u64,
    pub max_weight: f64,
}

/// The Master Analysis Configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub tessellation: TessellationConfig,
    pub aggregation: AggregationConfig,
    pub learner: LearnerConfig,
    pub search: SearchConfig,
    pub explorer: ExplorerConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        ANALYSIS
    }
}

impl AggregationConfig {
    pub fn validate(&self) -> StressResult<()> {
        // FixedOffset only accepts offsets strictly inside one day
        if self.time_buckets && !(-23..=23).contains(&self.utc_offset_hours) {
            return Err(StressError::configuration(format!(
                "utc_offset_hours must lie in (-24, 24) when time buckets are on, got {}",
                self.utc_offset_hours
            )));
        }
        Ok(())
    }
}

impl LearnerConfig {
    pub fn validate(&self) -> StressResult<()> {
        if self.lambda_grid.is_empty() {
            return Err(StressError::configuration("lambda_grid is empty"));
        }
        if let Some(l) = self.lambda_grid.iter().find(|l| !l.is_finite() || **l < 0.0) {
            return Err(StressError::configuration(format!(
                "lambda_grid entries must be finite and >= 0, got {}",
                l
            )));
        }
        Ok(())
    }
}

impl AnalysisConfig {
    /// Reads a JSON override. Missing sections are an error, so start from `--dump-config` output.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> StressResult<()> {
        self.aggregation.validate()?;
        self.learner.validate()
    }
}

pub const ANALYSIS: AnalysisConfig = AnalysisConfig {
    tessellation: TessellationConfig {
        coincident_tolerance_m: 1e-6,
        bbox_margin_m: 10.0,
    },

    aggregation: AggregationConfig {
        min_reliable_samples: DEFAULT_MIN_RELIABLE_SAMPLES,
        time_buckets: false,
        utc_offset_hours: 0,
        embedding_dim: None,
        max_rejection_samples: 32,
    },

    learner: LearnerConfig {
        lambda_grid: Cow::Borrowed(&[1e-3, 1e-2, 0.1, 1.0, 10.0, 100.0]),
        // Typical corridors have a few dozen cameras at most
        loo_max_samples: 20,
        k_folds: 5,
        augmentation_seed: 0x5EED,
        perturbation_scale: 0.1,
        perturbation_bound: 0.25,
        nonnegative_features: Cow::Borrowed(&[]),
    },

    search: SearchConfig {
        weight: SearchWeight::OPTIMAL,
        alpha: Alpha::GEOMETRIC,
        max_expansions: None,
        heuristic: GeometricHeuristic::Euclidean,
        edge_cost: EdgeCost::DistanceWithStress { stress_weight: 1.0 },
        attachment: StressAttachment::Edge,
        fallback: StressFallback::GlobalPrior,
    },

    explorer: ExplorerConfig {
        weights: Cow::Borrowed(&[1.0, 1.25, 1.5, 2.0, 3.0]),
        alphas: Cow::Borrowed(&[0.0, 0.25, 0.5, 0.75, 1.0]),
        stochastic_samples: 32,
        seed: 7,
        max_weight: 5.0,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ANALYSIS.validate().is_ok());
    }

    #[test]
    fn offset_of_a_day_or_more_is_refused_with_time_buckets() {
        let mut config = ANALYSIS;
        config.aggregation.time_buckets = true;
        for hours in [23, -23] {
            config.aggregation.utc_offset_hours = hours;
            assert!(config.validate().is_ok());
        }
        for hours in [24, -24, 30, i32::MAX] {
            config.aggregation.utc_offset_hours = hours;
            let err = config.validate().unwrap_err();
            assert!(matches!(err, StressError::Configuration(_)), "{}", hours);
        }
        // ignored while buckets are off
        config.aggregation.time_buckets = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_lambda_is_refused() {
        let mut config = ANALYSIS;
        config.learner.lambda_grid = Cow::Owned(vec![1.0, -0.5]);
        assert!(matches!(config.validate(), Err(StressError::Configuration(_))));
    }
}
