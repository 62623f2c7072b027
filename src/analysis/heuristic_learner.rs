//! Ridge regression from zone feature profiles to stress.
//!
//! The fit itself is closed form: centre the data, solve
//! `(XᵀX + λI) w = Xᵀy` by Cholesky, recover `b = ȳ - w·x̄`. The
//! regularisation strength comes from cross-validation on held-out MAE over
//! real samples only. Thin training sets are padded with bounded, clipped
//! bootstrap samples that never enter a held-out fold.

use rand::SeedableRng;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use statrs::distribution::Normal;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::{DF, LearnerConfig};
use crate::domain::{FEATURE_DIM, FEATURE_NAMES, ZoneId};
use crate::error::{StressError, StressResult};
use crate::models::{CvMethod, LambdaCandidate, LambdaSelection, LearnedModel, ProfileSnapshot};
use crate::utils::{argmin, dot, mean_and_stddev, now_timestamp_ms, solve_spd};

/// One observed (zone features, stress label) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSample {
    pub zone: ZoneId,
    pub x: Vec<f64>,
    pub y: f64,
}

/// A row of the working training set.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub x: Vec<f64>,
    pub y: f64,
    pub synthetic: bool,
    /// Index of the real sample this row is (or was resampled from).
    pub origin: usize,
}

/// Closed-form ridge regression `(X, y, λ) -> (w, b)`.
///
/// The bias is not penalised. Fails with `NumericalInstability` when the
/// normal equations are not positive definite or the result is not finite.
pub fn ridge_fit(x: &[Vec<f64>], y: &[f64], lambda: f64) -> StressResult<(Vec<f64>, f64)> {
    if x.len() != y.len() {
        return Err(StressError::configuration(format!(
            "{} feature rows but {} labels",
            x.len(),
            y.len()
        )));
    }
    let rows: Vec<&[f64]> = x.iter().map(Vec::as_slice).collect();
    let dim = rows.first().map_or(0, |r| r.len());
    solve_ridge(&rows, y, lambda, &vec![true; dim])
}

fn solve_ridge(x: &[&[f64]], y: &[f64], lambda: f64, free: &[bool]) -> StressResult<(Vec<f64>, f64)> {
    if x.is_empty() {
        return Err(StressError::insufficient("ridge fit", 0, 1));
    }
    let dim = free.len();
    let n = x.len() as f64;
    let cols: Vec<usize> = (0..dim).filter(|&j| free[j]).collect();
    let p = cols.len();

    let x_mean: Vec<f64> = (0..dim)
        .map(|j| x.iter().map(|r| r[j]).sum::<f64>() / n)
        .collect();
    let y_mean = y.iter().sum::<f64>() / n;

    // Lower triangle of XcᵀXc, and Xcᵀyc
    let mut a = vec![0.0; p * p];
    let mut b = vec![0.0; p];
    for (row, &yi) in x.iter().zip(y) {
        let yc = yi - y_mean;
        for (i, &ci) in cols.iter().enumerate() {
            let xi = row[ci] - x_mean[ci];
            b[i] += xi * yc;
            for (k, &ck) in cols.iter().enumerate().take(i + 1) {
                a[i * p + k] += xi * (row[ck] - x_mean[ck]);
            }
        }
    }
    for i in 0..p {
        for k in 0..i {
            a[k * p + i] = a[i * p + k];
        }
        a[i * p + i] += lambda;
    }

    let w_free = if p == 0 {
        Vec::new()
    } else {
        solve_spd(&a, &b).ok_or_else(|| {
            StressError::numerical(format!(
                "normal equations are singular at lambda {} ({} samples, {} free features)",
                lambda,
                x.len(),
                p
            ))
        })?
    };

    let mut w = vec![0.0; dim];
    for (i, &ci) in cols.iter().enumerate() {
        w[ci] = w_free[i];
    }
    let bias = y_mean - dot(&w, &x_mean);

    if let Some(j) = w.iter().position(|v| !v.is_finite()) {
        return Err(StressError::numerical(format!(
            "weight {} is {} at lambda {}",
            j, w[j], lambda
        )));
    }
    if !bias.is_finite() {
        return Err(StressError::numerical(format!("bias is {} at lambda {}", bias, lambda)));
    }
    Ok((w, bias))
}

/// Ridge fit where the `nonnegative` weights are pinned to zero whenever
/// they come out negative, refitting the rest.
fn fit_constrained(
    x: &[&[f64]],
    y: &[f64],
    lambda: f64,
    nonnegative: &[usize],
    dim: usize,
) -> StressResult<(Vec<f64>, f64)> {
    let mut free = vec![true; dim];
    loop {
        let (w, b) = solve_ridge(x, y, lambda, &free)?;
        let negative: Vec<usize> = nonnegative
            .iter()
            .copied()
            .filter(|&j| free[j] && w[j] < 0.0)
            .collect();
        if negative.is_empty() {
            return Ok((w, b));
        }
        for j in negative {
            free[j] = false;
        }
    }
}

pub struct HeuristicLearner {
    config: LearnerConfig,
}

impl HeuristicLearner {
    pub fn new(config: LearnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Training pairs from every reliable zone: mean feature row against the
    /// mean stress proxy.
    pub fn samples_from_snapshot(snapshot: &ProfileSnapshot) -> Vec<ZoneSample> {
        snapshot
            .profiles
            .iter()
            .filter_map(|(zone, p)| {
                let x = p.mean_features(snapshot.min_reliable_samples).ok()?;
                let y = p.mean_stress(snapshot.min_reliable_samples).ok()?;
                Some(ZoneSample {
                    zone: *zone,
                    x: x.to_vec(),
                    y,
                })
            })
            .collect()
    }

    /// Training pairs from externally supplied per-zone labels. Zones whose
    /// profile is not reliable are skipped and logged.
    pub fn samples_with_labels(
        snapshot: &ProfileSnapshot,
        labels: &BTreeMap<ZoneId, f64>,
    ) -> StressResult<Vec<ZoneSample>> {
        let mut out = Vec::with_capacity(labels.len());
        let mut skipped = Vec::new();
        for (&zone, &y) in labels {
            if !y.is_finite() {
                return Err(StressError::configuration(format!(
                    "label for zone {} is {}",
                    zone, y
                )));
            }
            match snapshot
                .get(zone)
                .map(|p| p.mean_features(snapshot.min_reliable_samples))
            {
                Some(Ok(x)) => out.push(ZoneSample { zone, x: x.to_vec(), y }),
                _ => skipped.push(zone),
            }
        }
        if !skipped.is_empty() {
            log::warn!(
                "{} labelled zone(s) without a reliable profile skipped: {:?}",
                skipped.len(),
                skipped
            );
        }
        Ok(out)
    }

    /// Fits a new model version.
    pub fn fit(&self, samples: &[ZoneSample], version: u32) -> StressResult<LearnedModel> {
        crate::trace_time!("ridge fit", 50_000, { self.fit_inner(samples, version) })
    }

    fn fit_inner(&self, samples: &[ZoneSample], version: u32) -> StressResult<LearnedModel> {
        let n_real = samples.len();
        if n_real < 2 {
            return Err(StressError::insufficient("stress model training set", n_real as u64, 2));
        }
        let dim = samples[0].x.len();
        self.check_inputs(samples, dim)?;

        let mut train: Vec<TrainingSample> = samples
            .iter()
            .enumerate()
            .map(|(i, s)| TrainingSample {
                x: s.x.clone(),
                y: s.y,
                synthetic: false,
                origin: i,
            })
            .collect();
        if n_real < dim {
            let synthetic = self.augment(&train, dim + 1)?;
            train.extend(synthetic);
        }
        let synthetic_count = train.len() - n_real;

        let selection = self.select_lambda(&train, n_real, dim)?;
        let held_out_mae = selection
            .candidates
            .iter()
            .find(|c| c.lambda == selection.chosen)
            .and_then(|c| c.held_out_mae)
            .unwrap_or(f64::INFINITY);

        let rows: Vec<&[f64]> = train.iter().map(|s| s.x.as_slice()).collect();
        let ys: Vec<f64> = train.iter().map(|s| s.y).collect();
        let (weights, bias) = fit_constrained(
            &rows,
            &ys,
            selection.chosen,
            &self.config.nonnegative_features,
            dim,
        )?;

        let feature_names = if dim == FEATURE_DIM {
            FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
        } else {
            (0..dim).map(|i| format!("f{}", i)).collect()
        };

        let model = LearnedModel {
            version,
            id: Uuid::new_v4(),
            weights,
            bias,
            lambda: selection.chosen,
            selection,
            sample_count: n_real,
            synthetic_count,
            trained_at_ms: now_timestamp_ms(),
            held_out_mae,
            feature_names,
            nonnegative_features: self.config.nonnegative_features.to_vec(),
        };
        model.validate()?;

        if DF.log_learner {
            log::info!(
                "Trained model v{}: lambda={} held-out MAE={:.4} ({} real, {} synthetic, |w|={:.4})",
                model.version,
                model.lambda,
                model.held_out_mae,
                model.sample_count,
                model.synthetic_count,
                model.weight_norm()
            );
        }
        Ok(model)
    }

    fn check_inputs(&self, samples: &[ZoneSample], dim: usize) -> StressResult<()> {
        if dim == 0 {
            return Err(StressError::configuration("training rows have no features"));
        }
        for s in samples {
            if s.x.len() != dim {
                return Err(StressError::configuration(format!(
                    "zone {} has {} features, expected {}",
                    s.zone,
                    s.x.len(),
                    dim
                )));
            }
            if !s.y.is_finite() || s.x.iter().any(|v| !v.is_finite()) {
                return Err(StressError::configuration(format!(
                    "zone {} has a non-finite training value",
                    s.zone
                )));
            }
        }
        if self.config.lambda_grid.is_empty() {
            return Err(StressError::configuration("lambda grid is empty"));
        }
        if let Some(l) = self
            .config
            .lambda_grid
            .iter()
            .find(|l| !l.is_finite() || **l < 0.0)
        {
            return Err(StressError::configuration(format!("invalid lambda {}", l)));
        }
        if let Some(j) = self.config.nonnegative_features.iter().find(|&&j| j >= dim) {
            return Err(StressError::configuration(format!(
                "non-negativity constraint on feature {} but rows have {} features",
                j, dim
            )));
        }
        Ok(())
    }

    /// Bootstrap rows until the set reaches `target`. Each draw resamples a
    /// real row and nudges every value by a bounded normal step proportional
    /// to that column's spread, clipped into the observed range.
    pub fn augment(&self, real: &[TrainingSample], target: usize) -> StressResult<Vec<TrainingSample>> {
        if real.is_empty() {
            return Err(StressError::insufficient("bootstrap augmentation", 0, 1));
        }
        let dim = real[0].x.len();
        let normal = Normal::new(0.0, 1.0).map_err(|e| StressError::numerical(e.to_string()))?;
        let mut rng = StdRng::seed_from_u64(self.config.augmentation_seed);

        let column = |j: usize| -> Vec<f64> { real.iter().map(|s| s.x[j]).collect() };
        let bounds = |v: &[f64]| -> (f64, f64, f64) {
            let (_, sd) = mean_and_stddev(v);
            let lo = v.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (sd, lo, hi)
        };
        let x_bounds: Vec<(f64, f64, f64)> = (0..dim).map(|j| bounds(&column(j))).collect();
        let ys: Vec<f64> = real.iter().map(|s| s.y).collect();
        let y_bounds = bounds(&ys);

        let scale = self.config.perturbation_scale;
        let bound = self.config.perturbation_bound;
        let jitter = |rng: &mut StdRng, v: f64, (sd, lo, hi): (f64, f64, f64)| -> f64 {
            let step = (normal.sample(rng) * scale).clamp(-bound, bound) * sd;
            (v + step).clamp(lo, hi)
        };

        let mut out = Vec::with_capacity(target.saturating_sub(real.len()));
        for _ in real.len()..target {
            let src = &real[rng.gen_range(0..real.len())];
            let mut x = Vec::with_capacity(dim);
            for (j, &v) in src.x.iter().enumerate() {
                x.push(jitter(&mut rng, v, x_bounds[j]));
            }
            let y = jitter(&mut rng, src.y, y_bounds);
            out.push(TrainingSample {
                x,
                y,
                synthetic: true,
                origin: src.origin,
            });
        }

        if DF.log_learner {
            log::info!(
                "Augmented {} real sample(s) with {} synthetic",
                real.len(),
                out.len()
            );
        }
        Ok(out)
    }

    /// Cross-validated λ. Leave-one-out for small sets, k-fold otherwise;
    /// only real rows are held out, and rows resampled from a held-out row
    /// are excluded from that fold's training data.
    fn select_lambda(
        &self,
        train: &[TrainingSample],
        n_real: usize,
        dim: usize,
    ) -> StressResult<LambdaSelection> {
        let method = if n_real <= self.config.loo_max_samples {
            CvMethod::LeaveOneOut
        } else {
            CvMethod::KFold {
                k: self.config.k_folds.clamp(2, n_real),
            }
        };
        let folds: Vec<Vec<usize>> = match method {
            CvMethod::LeaveOneOut => (0..n_real).map(|r| vec![r]).collect(),
            CvMethod::KFold { k } => (0..k)
                .map(|f| (0..n_real).filter(|r| r % k == f).collect())
                .collect(),
        };

        let mut grid = self.config.lambda_grid.to_vec();
        grid.sort_by(f64::total_cmp);
        grid.dedup();

        let nonnegative = &self.config.nonnegative_features;
        let candidates: Vec<LambdaCandidate> = grid
            .par_iter()
            .map(|&lambda| {
                let mut abs_err = 0.0;
                let mut count = 0usize;
                for fold in &folds {
                    let kept: Vec<&TrainingSample> =
                        train.iter().filter(|s| !fold.contains(&s.origin)).collect();
                    let rows: Vec<&[f64]> = kept.iter().map(|s| s.x.as_slice()).collect();
                    let ys: Vec<f64> = kept.iter().map(|s| s.y).collect();
                    let Ok((w, b)) = fit_constrained(&rows, &ys, lambda, nonnegative, dim) else {
                        return LambdaCandidate {
                            lambda,
                            held_out_mae: None,
                        };
                    };
                    for &h in fold {
                        abs_err += (train[h].y - dot(&w, &train[h].x) - b).abs();
                        count += 1;
                    }
                }
                LambdaCandidate {
                    lambda,
                    held_out_mae: Some(abs_err / count.max(1) as f64),
                }
            })
            .collect();

        // Failed candidates rank last.
        let maes: Vec<f64> = candidates
            .iter()
            .map(|c| c.held_out_mae.unwrap_or(f64::INFINITY))
            .collect();
        let best = argmin(&maes);
        if !maes[best].is_finite() {
            return Err(StressError::numerical(format!(
                "every lambda in {:?} failed to produce a finite fit",
                grid
            )));
        }

        if DF.log_learner {
            log::info!("Lambda selection ({:?}): {:?}", method, candidates);
        }
        Ok(LambdaSelection {
            method,
            chosen: candidates[best].lambda,
            candidates,
        })
    }
}
