use std::collections::BTreeMap;

use super::learned_model::LearnedModel;
use super::stress_profile::ProfileSnapshot;
use crate::config::StressFallback;
use crate::domain::ZoneId;
use crate::error::{StressError, StressResult};

/// Predicted stress per zone, frozen for the lifetime of a set of queries.
///
/// Values are clamped at zero so the learned heuristic never rewards a zone.
/// Zones without a reliable profile carry the fallback value and are listed
/// in `fallback_zones`, so the substitution stays observable.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneStressMap {
    model_version: Option<u32>,
    values: BTreeMap<ZoneId, f64>,
    fallback_zones: Vec<ZoneId>,
    fallback_value: f64,
}

impl ZoneStressMap {
    /// Runs `model` over every reliable profile among `zones`.
    pub fn from_model<I>(
        model: &LearnedModel,
        snapshot: &ProfileSnapshot,
        zones: I,
        fallback: StressFallback,
    ) -> StressResult<Self>
    where
        I: IntoIterator<Item = ZoneId>,
    {
        let mut values = BTreeMap::new();
        let mut missing = Vec::new();

        for zone in zones {
            let features = snapshot
                .get(zone)
                .and_then(|p| p.mean_features(snapshot.min_reliable_samples).ok());
            match features {
                Some(row) => {
                    if row.len() != model.dim() {
                        return Err(StressError::configuration(format!(
                            "model v{} expects {} features, zone {} has {}",
                            model.version,
                            model.dim(),
                            zone,
                            row.len()
                        )));
                    }
                    let predicted = model.predict(&row);
                    if !predicted.is_finite() {
                        return Err(StressError::numerical(format!(
                            "model v{} predicted {} for zone {}",
                            model.version, predicted, zone
                        )));
                    }
                    values.insert(zone, predicted.max(0.0));
                }
                None => missing.push(zone),
            }
        }

        let fallback_value = match fallback {
            StressFallback::Neutral(v) => v.max(0.0),
            StressFallback::GlobalPrior => {
                if values.is_empty() {
                    return Err(StressError::insufficient(
                        "global stress prior (no reliable zone)",
                        0,
                        snapshot.min_reliable_samples.max(1),
                    ));
                }
                values.values().sum::<f64>() / values.len() as f64
            }
        };

        if !missing.is_empty() {
            log::warn!(
                "{} zone(s) lack a reliable profile, using fallback stress {:.3}",
                missing.len(),
                fallback_value
            );
        }
        for zone in &missing {
            values.insert(*zone, fallback_value);
        }

        Ok(Self {
            model_version: Some(model.version),
            values,
            fallback_zones: missing,
            fallback_value,
        })
    }

    /// Stress values supplied directly (external calibration, tests).
    pub fn from_values(values: BTreeMap<ZoneId, f64>, fallback_value: f64) -> StressResult<Self> {
        if let Some((zone, v)) = values.iter().find(|(_, v)| !v.is_finite() || **v < 0.0) {
            return Err(StressError::configuration(format!(
                "zone {} has invalid stress {}",
                zone, v
            )));
        }
        if !fallback_value.is_finite() || fallback_value < 0.0 {
            return Err(StressError::configuration(format!(
                "invalid fallback stress {}",
                fallback_value
            )));
        }
        Ok(Self {
            model_version: None,
            values,
            fallback_zones: Vec::new(),
            fallback_value,
        })
    }

    /// Stress of `zone`; unknown zones read the fallback.
    #[inline]
    pub fn stress(&self, zone: ZoneId) -> f64 {
        self.values.get(&zone).copied().unwrap_or(self.fallback_value)
    }

    pub fn model_version(&self) -> Option<u32> {
        self.model_version
    }

    pub fn fallback_zones(&self) -> &[ZoneId] {
        &self.fallback_zones
    }

    pub fn fallback_value(&self) -> f64 {
        self.fallback_value
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ZoneId, &f64)> {
        self.values.iter()
    }
}
