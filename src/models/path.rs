use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::config::{Alpha, SearchWeight};
use crate::domain::NodeId;

/// The caller's two levers for one search.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchParams {
    pub weight: SearchWeight,
    pub alpha: Alpha,
}

impl SearchParams {
    pub fn new(weight: SearchWeight, alpha: Alpha) -> Self {
        Self { weight, alpha }
    }

    /// Validating constructor from raw numbers.
    pub fn try_new(weight: f64, alpha: f64) -> crate::error::StressResult<Self> {
        Ok(Self {
            weight: SearchWeight::try_new(weight)?,
            alpha: Alpha::try_new(alpha)?,
        })
    }
}

impl std::fmt::Display for SearchParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "W={} alpha={}", self.weight, self.alpha)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Termination {
    /// The goal was popped from the open set.
    GoalExpanded,
    /// The expansion budget ran out after the goal had been reached; best path so far.
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    pub distance_m: f64,
    pub stress: f64,
    /// Sum of edge costs under the engine's cost model.
    pub cost: f64,
    pub params: SearchParams,
    pub expanded: usize,
    pub termination: Termination,
}

impl Path {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn visits(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// The two objectives compared by the Pareto explorer.
    #[inline]
    pub fn objectives(&self) -> (f64, f64) {
        (self.distance_m, self.stress)
    }
}
