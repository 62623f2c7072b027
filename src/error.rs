//! Error taxonomy for the stress routing core.
//!
//! ```text
//! StressError
//! ├── Configuration         (invalid manifest / geometry / search levers, fatal)
//! ├── DataValidation        (malformed feature record, dropped and counted)
//! ├── InsufficientData      (zone or model lacks reliable data, caller falls back)
//! ├── NoPath                (start and goal disconnected, or budget ran out first)
//! └── NumericalInstability  (regression produced non-finite weights)
//! ```
//!
//! Every variant maps to a [`FailureCategory`] and its message names that
//! category, so no user-visible failure is ever unclassified.

use crate::domain::{NodeId, SensorId};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;

pub type StressResult<T> = Result<T, StressError>;

/// The causal category reported alongside every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum FailureCategory {
    #[strum(to_string = "configuration")]
    Configuration,
    #[strum(to_string = "data quality")]
    DataQuality,
    #[strum(to_string = "model availability")]
    ModelAvailability,
    #[strum(to_string = "connectivity")]
    Connectivity,
    #[strum(to_string = "numerical")]
    Numerical,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StressError {
    #[error("[configuration] {0}")]
    Configuration(String),

    #[error("[data quality] {0}")]
    DataValidation(#[from] ValidationError),

    #[error("[model availability] insufficient data for {subject}: {count} samples, {required} required")]
    InsufficientData {
        subject: String,
        count: u64,
        required: u64,
    },

    #[error("[connectivity] no path from node {start} to node {goal} after {expanded} expansions (budget exhausted: {budget_exhausted})")]
    NoPath {
        start: NodeId,
        goal: NodeId,
        expanded: usize,
        budget_exhausted: bool,
    },

    #[error("[numerical] {0}")]
    NumericalInstability(String),
}

impl StressError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        StressError::Configuration(msg.into())
    }

    pub fn insufficient<S: Into<String>>(subject: S, count: u64, required: u64) -> Self {
        StressError::InsufficientData {
            subject: subject.into(),
            count,
            required,
        }
    }

    pub fn numerical<S: Into<String>>(msg: S) -> Self {
        StressError::NumericalInstability(msg.into())
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            StressError::Configuration(_) => FailureCategory::Configuration,
            StressError::DataValidation(_) => FailureCategory::DataQuality,
            StressError::InsufficientData { .. } => FailureCategory::ModelAvailability,
            StressError::NoPath { .. } => FailureCategory::Connectivity,
            StressError::NumericalInstability(_) => FailureCategory::Numerical,
        }
    }
}

/// Why a single feature record was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("source {0} is not a known zone or camera")]
    UnknownSource(SensorId),

    #[error("field `{field}` is not finite")]
    NonFinite { field: &'static str },

    #[error("field `{field}` = {value} outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("negative timestamp {0}")]
    NegativeTimestamp(i64),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    EmbeddingDimension { expected: usize, actual: usize },

    #[error("unparseable record: {0}")]
    Malformed(String),
}

impl ValidationError {
    /// Short stable key used when counting rejections per reason.
    pub fn reason_key(&self) -> &'static str {
        match self {
            ValidationError::UnknownSource(_) => "unknown_source",
            ValidationError::NonFinite { .. } => "non_finite",
            ValidationError::OutOfRange { .. } => "out_of_range",
            ValidationError::NegativeTimestamp(_) => "negative_timestamp",
            ValidationError::EmbeddingDimension { .. } => "embedding_dimension",
            ValidationError::Malformed(_) => "malformed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_message_names_its_category() {
        let errors = [
            StressError::configuration("bad boundary"),
            StressError::from(ValidationError::NegativeTimestamp(-1)),
            StressError::insufficient("zone Z3", 0, 3),
            StressError::NoPath {
                start: NodeId(1),
                goal: NodeId(2),
                expanded: 4,
                budget_exhausted: false,
            },
            StressError::numerical("NaN weight"),
        ];
        for err in errors {
            let msg = err.to_string();
            assert!(
                msg.contains(&format!("[{}]", err.category())),
                "message `{}` must carry its category",
                msg
            );
        }
    }

    #[test]
    fn budget_flag_shows_in_no_path_message() {
        let err = StressError::NoPath {
            start: NodeId(1),
            goal: NodeId(9),
            expanded: 10,
            budget_exhausted: true,
        };
        assert!(err.to_string().contains("budget exhausted: true"));
        assert_eq!(err.category(), FailureCategory::Connectivity);
    }
}
