use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::pathfinder::{PathfindingEngine, SearchQuery};
use crate::config::{Alpha, DF, ExplorerConfig, SearchWeight};
use crate::domain::NodeId;
use crate::error::{StressError, StressResult};
use crate::models::{ParetoEntry, ParetoFront, Path, SearchParams, SweepFailure, non_dominated_indices};

/// Which `(W, alpha)` configurations to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepSpec {
    /// Every weight paired with every alpha, weights outermost.
    Grid { weights: Vec<f64>, alphas: Vec<f64> },
    /// Caller-chosen `(W, alpha)` pairs, in order.
    Explicit(Vec<(f64, f64)>),
    /// `samples` uniform draws from the given closed ranges.
    Stochastic {
        samples: usize,
        seed: u64,
        weight_range: (f64, f64),
        alpha_range: (f64, f64),
    },
}

impl SweepSpec {
    pub fn grid_from_config(config: &ExplorerConfig) -> Self {
        SweepSpec::Grid {
            weights: config.weights.to_vec(),
            alphas: config.alphas.to_vec(),
        }
    }

    pub fn stochastic_from_config(config: &ExplorerConfig) -> Self {
        SweepSpec::Stochastic {
            samples: config.stochastic_samples,
            seed: config.seed,
            weight_range: (1.0, config.max_weight),
            alpha_range: (0.0, 1.0),
        }
    }

    pub fn seed(&self) -> Option<u64> {
        match self {
            SweepSpec::Stochastic { seed, .. } => Some(*seed),
            _ => None,
        }
    }

    /// Expands the sweep into validated search parameters, in run order.
    pub fn configurations(&self) -> StressResult<Vec<SearchParams>> {
        let params = match self {
            SweepSpec::Grid { weights, alphas } => weights
                .iter()
                .cartesian_product(alphas.iter())
                .map(|(&w, &a)| SearchParams::try_new(w, a))
                .collect::<StressResult<Vec<_>>>()?,
            SweepSpec::Explicit(pairs) => pairs
                .iter()
                .map(|&(w, a)| SearchParams::try_new(w, a))
                .collect::<StressResult<Vec<_>>>()?,
            SweepSpec::Stochastic {
                samples,
                seed,
                weight_range: (w_lo, w_hi),
                alpha_range: (a_lo, a_hi),
            } => {
                // Validate the corners so every draw is valid
                SearchParams::try_new(*w_lo, *a_lo)?;
                SearchParams::try_new(*w_hi, *a_hi)?;
                if w_lo > w_hi || a_lo > a_hi {
                    return Err(StressError::configuration(format!(
                        "empty sampling range W [{}, {}] alpha [{}, {}]",
                        w_lo, w_hi, a_lo, a_hi
                    )));
                }
                let mut rng = StdRng::seed_from_u64(*seed);
                (0..*samples)
                    .map(|_| {
                        let w = rng.gen_range(*w_lo..=*w_hi);
                        let a = rng.gen_range(*a_lo..=*a_hi);
                        SearchParams::new(SearchWeight::new(w), Alpha::new(a))
                    })
                    .collect()
            }
        };
        if params.is_empty() {
            return Err(StressError::configuration("sweep contains no configurations"));
        }
        Ok(params)
    }
}

/// Runs a sweep of searches and keeps the (distance, stress) Pareto front.
pub struct ParetoExplorer<'e, 'g> {
    engine: &'e PathfindingEngine<'g>,
    max_expansions: Option<usize>,
}

impl<'e, 'g> ParetoExplorer<'e, 'g> {
    pub fn new(engine: &'e PathfindingEngine<'g>) -> Self {
        Self {
            engine,
            max_expansions: None,
        }
    }

    pub fn with_budget(mut self, max_expansions: Option<usize>) -> Self {
        self.max_expansions = max_expansions;
        self
    }

    pub fn explore(&self, start: NodeId, goal: NodeId, sweep: &SweepSpec) -> StressResult<ParetoFront> {
        crate::trace_time!("pareto sweep", 100_000, { self.explore_inner(start, goal, sweep) })
    }

    fn explore_inner(&self, start: NodeId, goal: NodeId, sweep: &SweepSpec) -> StressResult<ParetoFront> {
        if self.engine.stress_map().is_none() {
            return Err(StressError::insufficient(
                "stress objective (no stress map)",
                0,
                1,
            ));
        }
        let configs = sweep.configurations()?;

        // Independent searches; collect keeps sweep order
        let outcomes: Vec<StressResult<Path>> = configs
            .par_iter()
            .map(|params| {
                let query = SearchQuery::new(start, goal, *params).with_budget(self.max_expansions);
                self.engine.search(&query)
            })
            .collect();

        let mut successes: Vec<(usize, Path)> = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut first_error = None;
        for (config_index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(path) => successes.push((config_index, path)),
                Err(err) => {
                    failures.push(SweepFailure {
                        config_index,
                        params: configs[config_index],
                        category: err.category(),
                        message: err.to_string(),
                    });
                    first_error.get_or_insert(err);
                }
            }
        }

        if successes.is_empty() {
            return Err(first_error
                .unwrap_or_else(|| StressError::configuration("sweep produced no results")));
        }

        let points: Vec<(f64, f64)> = successes.iter().map(|(_, p)| p.objectives()).collect();
        let keep = non_dominated_indices(&points);
        let entries: Vec<ParetoEntry> = keep
            .into_iter()
            .map(|i| ParetoEntry {
                path: successes[i].1.clone(),
                config_index: successes[i].0,
            })
            .collect();

        if !failures.is_empty() {
            log::warn!(
                "{} of {} sweep configuration(s) failed; first: {}",
                failures.len(),
                configs.len(),
                failures[0].message
            );
        }
        if DF.log_pareto {
            log::info!(
                "Pareto front {} -> {}: {} of {} result(s) non-dominated",
                start,
                goal,
                entries.len(),
                successes.len()
            );
        }

        Ok(ParetoFront {
            entries,
            seed: sweep.seed(),
            evaluated: configs.len(),
            failures,
        })
    }
}
