use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StressError, StressResult};
use crate::utils::{dot, l2_norm};

/// How the regularisation strength was validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CvMethod {
    LeaveOneOut,
    KFold { k: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LambdaCandidate {
    pub lambda: f64,
    /// Mean absolute error over real held-out samples only; `None` when
    /// some fold could not be fitted at this λ.
    pub held_out_mae: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaSelection {
    pub method: CvMethod,
    pub candidates: Vec<LambdaCandidate>,
    pub chosen: f64,
}

/// A fitted linear stress predictor. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedModel {
    pub version: u32,
    pub id: Uuid,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub lambda: f64,
    pub selection: LambdaSelection,
    /// Real (observed) training samples.
    pub sample_count: usize,
    /// Bootstrap samples added because the data was thinner than the feature space.
    pub synthetic_count: usize,
    pub trained_at_ms: i64,
    pub held_out_mae: f64,
    pub feature_names: Vec<String>,
    /// Features whose weight is constrained to be >= 0.
    pub nonnegative_features: Vec<usize>,
}

impl LearnedModel {
    #[inline]
    pub fn predict(&self, x: &[f64]) -> f64 {
        dot(&self.weights, x) + self.bias
    }

    pub fn weight_norm(&self) -> f64 {
        l2_norm(&self.weights)
    }

    pub fn dim(&self) -> usize {
        self.weights.len()
    }

    /// Finite parameters, and constrained weights non-negative.
    pub fn validate(&self) -> StressResult<()> {
        if let Some(i) = self.weights.iter().position(|w| !w.is_finite()) {
            return Err(StressError::numerical(format!(
                "model v{} weight {} is {}",
                self.version, i, self.weights[i]
            )));
        }
        if !self.bias.is_finite() {
            return Err(StressError::numerical(format!(
                "model v{} bias is {}",
                self.version, self.bias
            )));
        }
        for &i in &self.nonnegative_features {
            match self.weights.get(i) {
                Some(&w) if w < 0.0 => {
                    return Err(StressError::numerical(format!(
                        "model v{} constrained weight {} is negative ({})",
                        self.version, i, w
                    )));
                }
                Some(_) => {}
                None => {
                    return Err(StressError::configuration(format!(
                        "model v{} constrains feature {} but has only {} weights",
                        self.version,
                        i,
                        self.weights.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model: LearnedModel,
    /// Held-out error was worse than the model deployed at registration time.
    pub regressed: bool,
    pub baseline_mae: Option<f64>,
}

/// Outcome of adding a model to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub version: u32,
    pub regressed: bool,
    pub baseline_mae: Option<f64>,
}

/// Every trained version, plus which one is deployed.
///
/// Nothing is ever removed, so any version can be audited or rolled back to.
/// Promotion is always an explicit call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
    /// Deployed versions, most recent last.
    deployments: Vec<u32>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_version(&self) -> u32 {
        self.entries.last().map_or(1, |e| e.model.version + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn get(&self, version: u32) -> Option<&LearnedModel> {
        self.entry(version).map(|e| &e.model)
    }

    fn entry(&self, version: u32) -> Option<&ModelEntry> {
        self.entries.iter().find(|e| e.model.version == version)
    }

    pub fn deployed_version(&self) -> Option<u32> {
        self.deployments.last().copied()
    }

    pub fn deployed(&self) -> Option<&LearnedModel> {
        self.deployed_version().and_then(|v| self.get(v))
    }

    /// The deployed model, or `InsufficientData` when nothing has been promoted.
    pub fn require_deployed(&self) -> StressResult<&LearnedModel> {
        self.deployed()
            .ok_or_else(|| StressError::insufficient("deployed stress model", 0, 1))
    }

    pub fn register(&mut self, model: LearnedModel) -> StressResult<Registration> {
        let expected = self.next_version();
        if model.version != expected {
            return Err(StressError::configuration(format!(
                "model version {} registered out of order (next is {})",
                model.version, expected
            )));
        }
        model.validate()?;

        let baseline_mae = self.deployed().map(|m| m.held_out_mae);
        let regressed = baseline_mae.is_some_and(|base| model.held_out_mae > base);
        let version = model.version;

        self.entries.push(ModelEntry {
            model,
            regressed,
            baseline_mae,
        });

        Ok(Registration {
            version,
            regressed,
            baseline_mae,
        })
    }

    pub fn promote(&mut self, version: u32) -> StressResult<()> {
        if self.entry(version).is_none() {
            return Err(StressError::configuration(format!(
                "cannot promote unknown model version {}",
                version
            )));
        }
        if self.deployed_version() != Some(version) {
            self.deployments.push(version);
        }
        Ok(())
    }

    /// Re-deploys the previously deployed version and returns it.
    pub fn rollback(&mut self) -> StressResult<u32> {
        if self.deployments.len() < 2 {
            return Err(StressError::configuration(
                "no earlier deployment to roll back to",
            ));
        }
        self.deployments.pop();
        self.deployed_version()
            .ok_or_else(|| StressError::configuration("deployment history is empty"))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn model(version: u32, weights: Vec<f64>, bias: f64, mae: f64) -> LearnedModel {
        LearnedModel {
            version,
            id: Uuid::new_v4(),
            feature_names: (0..weights.len()).map(|i| format!("f{}", i)).collect(),
            weights,
            bias,
            lambda: 1.0,
            selection: LambdaSelection {
                method: CvMethod::LeaveOneOut,
                candidates: vec![LambdaCandidate { lambda: 1.0, held_out_mae: Some(mae) }],
                chosen: 1.0,
            },
            sample_count: 5,
            synthetic_count: 0,
            trained_at_ms: 0,
            held_out_mae: mae,
            nonnegative_features: vec![],
        }
    }
}
