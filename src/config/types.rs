//! Search levers and policy enums (Immutable Blueprints)

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::error::{StressError, StressResult};

/// Blend coefficient between the learned stress heuristic (1.0) and the
/// geometric heuristic (0.0).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alpha(f64);

impl Alpha {
    pub const GEOMETRIC: Self = Self(0.0);
    pub const LEARNED: Self = Self(1.0);

    /// Clamping constructor for compile-time constants.
    pub const fn new(val: f64) -> Self {
        let v = if val < 0.0 {
            0.0
        } else if val > 1.0 {
            1.0
        } else {
            val
        };
        Self(v)
    }

    /// Strict constructor for caller-supplied values.
    pub fn try_new(val: f64) -> StressResult<Self> {
        if !val.is_finite() || !(0.0..=1.0).contains(&val) {
            return Err(StressError::configuration(format!(
                "alpha must lie in [0, 1], got {}",
                val
            )));
        }
        Ok(Self(val))
    }

    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Alpha {
    fn default() -> Self {
        Self::GEOMETRIC
    }
}

impl std::fmt::Display for Alpha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Weighted-A* suboptimality factor `W >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchWeight(f64);

impl SearchWeight {
    pub const OPTIMAL: Self = Self(1.0);

    pub const fn new(val: f64) -> Self {
        if val < 1.0 { Self(1.0) } else { Self(val) }
    }

    pub fn try_new(val: f64) -> StressResult<Self> {
        if !val.is_finite() || val < 1.0 {
            return Err(StressError::configuration(format!(
                "suboptimality weight W must be finite and >= 1.0, got {}",
                val
            )));
        }
        Ok(Self(val))
    }

    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for SearchWeight {
    fn default() -> Self {
        Self::OPTIMAL
    }
}

impl std::fmt::Display for SearchWeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// How manifest / graph coordinates are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSystem {
    /// Already in a local metric plane.
    #[default]
    Planar,
    /// Longitude / latitude in degrees (x = lon, y = lat).
    Geographic,
}

/// Where predicted zone stress is charged along a path.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum StressAttachment {
    /// `length * mean stress of the zones the edge traverses`
    #[default]
    Edge,
    /// Stress of the zone of the node being entered.
    Node,
}

/// Edge-cost metric minimised by the search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCost {
    Distance,
    DistanceWithStress { stress_weight: f64 },
}

impl Default for EdgeCost {
    fn default() -> Self {
        EdgeCost::Distance
    }
}

/// Geometric part of the search heuristic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum GeometricHeuristic {
    /// Admissible whenever every edge is at least as long as the straight line between its ends.
    #[default]
    Euclidean,
    /// Admissible on rectilinear (grid-aligned) networks only.
    Manhattan,
    /// Always zero: uniform-cost search.
    Zero,
}

/// What a zone without a reliable profile contributes to the stress map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressFallback {
    /// Mean prediction over the reliable zones.
    GlobalPrior,
    /// A fixed neutral value.
    Neutral(f64),
}

impl Default for StressFallback {
    fn default() -> Self {
        StressFallback::GlobalPrior
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_rejects_out_of_range() {
        assert!(Alpha::try_new(0.5).is_ok());
        assert!(Alpha::try_new(-0.1).is_err());
        assert!(Alpha::try_new(1.01).is_err());
        assert!(Alpha::try_new(f64::NAN).is_err());
        assert_eq!(Alpha::new(7.0).value(), 1.0);
    }

    #[test]
    fn weight_must_be_at_least_one() {
        assert!(SearchWeight::try_new(1.0).is_ok());
        assert!(SearchWeight::try_new(0.99).is_err());
        assert!(SearchWeight::try_new(f64::INFINITY).is_err());
        assert_eq!(SearchWeight::new(0.2).value(), 1.0);
    }
}
