//! Per-observation feature records produced by the external vision pipeline.
//!
//! Records are tagged structs with explicit optional parts rather than
//! free-form maps, so validation and flattening are fixed:
//!
//! | idx | field              | range        | source    |
//! |-----|--------------------|--------------|-----------|
//! | 0   | pedestrian_count   | [0, 10 000]  | spatial   |
//! | 1   | vehicle_count      | [0, 10 000]  | spatial   |
//! | 2   | crowd_density      | [0, 1]       | spatial   |
//! | 3   | obstacle_density   | [0, 1]       | spatial   |
//! | 4   | edge_density       | [0, 1]       | visual    |
//! | 5   | color_entropy      | [0, 8] bits  | visual    |
//! | 6   | clutter            | [0, 1]       | visual    |
//! | 7   | brightness         | [0, 1]       | visual    |
//! | 8   | motion_intensity   | [0, 1]       | temporal  |
//! | 9   | flow_variability   | [0, 1]       | temporal  |
//!
//! A missing temporal part flattens to zeros (no observed motion). Embeddings
//! and scene labels are validated but never enter the linear model.

use serde::{Deserialize, Serialize};

use super::SensorId;
use crate::error::ValidationError;

pub const FEATURE_DIM: usize = 10;

pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "pedestrian_count",
    "vehicle_count",
    "crowd_density",
    "obstacle_density",
    "edge_density",
    "color_entropy",
    "clutter",
    "brightness",
    "motion_intensity",
    "flow_variability",
];

pub const MAX_COUNT: f64 = 10_000.0;
pub const MAX_ENTROPY_BITS: f64 = 8.0;

/// Inclusive validity range per flattened feature.
pub const FEATURE_RANGES: [(f64, f64); FEATURE_DIM] = [
    (0.0, MAX_COUNT),
    (0.0, MAX_COUNT),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, MAX_ENTROPY_BITS),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
];

/// Weights of the per-observation stress proxy, over normalised features.
/// They sum to 1, so the proxy lies in `[0, STRESS_PROXY_SCALE]`.
pub const STRESS_PROXY_WEIGHTS: [f64; FEATURE_DIM] =
    [0.15, 0.20, 0.15, 0.10, 0.10, 0.05, 0.10, 0.05, 0.05, 0.05];
pub const STRESS_PROXY_SCALE: f64 = 10.0;

// Half-saturation constants for the count features
const PEDESTRIAN_HALF_SAT: f64 = 20.0;
const VEHICLE_HALF_SAT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialFeatures {
    pub pedestrian_count: f64,
    pub vehicle_count: f64,
    pub crowd_density: f64,
    pub obstacle_density: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisualFeatures {
    pub edge_density: f64,
    pub color_entropy: f64,
    pub clutter: f64,
    pub brightness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TemporalFeatures {
    pub motion_intensity: f64,
    pub flow_variability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Zone id or camera id; aliases of merged cameras resolve to their zone.
    pub source: SensorId,
    pub timestamp_ms: i64,
    pub spatial: SpatialFeatures,
    pub visual: VisualFeatures,
    #[serde(default)]
    pub temporal: Option<TemporalFeatures>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub scene_label: Option<String>,
}

impl FeatureVector {
    pub fn flatten(&self) -> [f64; FEATURE_DIM] {
        let t = self.temporal.unwrap_or_default();
        [
            self.spatial.pedestrian_count,
            self.spatial.vehicle_count,
            self.spatial.crowd_density,
            self.spatial.obstacle_density,
            self.visual.edge_density,
            self.visual.color_entropy,
            self.visual.clutter,
            self.visual.brightness,
            t.motion_intensity,
            t.flow_variability,
        ]
    }

    /// Checks every numeric field against its declared range.
    /// Source resolution happens in the aggregator, which knows the zones.
    pub fn validate(&self, embedding_dim: Option<usize>) -> Result<(), ValidationError> {
        if self.timestamp_ms < 0 {
            return Err(ValidationError::NegativeTimestamp(self.timestamp_ms));
        }

        for ((value, &(min, max)), field) in self
            .flatten()
            .into_iter()
            .zip(FEATURE_RANGES.iter())
            .zip(FEATURE_NAMES)
        {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { field });
            }
            if value < min || value > max {
                return Err(ValidationError::OutOfRange {
                    field,
                    value,
                    min,
                    max,
                });
            }
        }

        if let Some(embedding) = &self.embedding {
            if let Some(expected) = embedding_dim {
                if embedding.len() != expected {
                    return Err(ValidationError::EmbeddingDimension {
                        expected,
                        actual: embedding.len(),
                    });
                }
            }
            if embedding.iter().any(|v| !v.is_finite()) {
                return Err(ValidationError::NonFinite { field: "embedding" });
            }
        }

        Ok(())
    }

    /// Per-observation stress proxy in `[0, 10]`.
    ///
    /// Counts saturate (`c / (c + k)`), entropy is scaled to `[0, 1]` and
    /// brightness is inverted: dark scenes read as more stressful.
    pub fn stress_proxy(&self) -> f64 {
        let row = self.flatten();
        let normalised = [
            row[0] / (row[0] + PEDESTRIAN_HALF_SAT),
            row[1] / (row[1] + VEHICLE_HALF_SAT),
            row[2],
            row[3],
            row[4],
            row[5] / MAX_ENTROPY_BITS,
            row[6],
            1.0 - row[7],
            row[8],
            row[9],
        ];
        STRESS_PROXY_SCALE
            * normalised
                .iter()
                .zip(STRESS_PROXY_WEIGHTS)
                .map(|(x, w)| x * w)
                .sum::<f64>()
    }
}
