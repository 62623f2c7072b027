use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::path::{Path, SearchParams};
use crate::error::FailureCategory;

/// `a` dominates `b`: no worse on both objectives, strictly better on one.
#[inline]
pub fn dominates(a: (f64, f64), b: (f64, f64)) -> bool {
    a.0 <= b.0 && a.1 <= b.1 && (a.0 < b.0 || a.1 < b.1)
}

/// Indices of the non-dominated points, ordered by the first objective.
///
/// Sorts by (distance, stress, input position) and keeps a point only when
/// its stress beats every point before it. Equal pairs therefore keep the
/// earliest input, and the whole pass is O(k log k).
pub fn non_dominated_indices(points: &[(f64, f64)]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&i, &j| {
        points[i]
            .0
            .total_cmp(&points[j].0)
            .then(points[i].1.total_cmp(&points[j].1))
            .then(i.cmp(&j))
    });

    let mut front = Vec::new();
    let mut best_stress = f64::INFINITY;
    for i in order {
        if points[i].1.total_cmp(&best_stress) == Ordering::Less {
            best_stress = points[i].1;
            front.push(i);
        }
    }
    front
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoEntry {
    pub path: Path,
    /// Position of the generating configuration in the sweep.
    pub config_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub config_index: usize,
    pub params: SearchParams,
    pub category: FailureCategory,
    pub message: String,
}

/// Non-dominated (distance, stress) results, distance ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoFront {
    pub entries: Vec<ParetoEntry>,
    /// Seed of a stochastic sweep; None for explicit sweeps.
    pub seed: Option<u64>,
    pub evaluated: usize,
    pub failures: Vec<SweepFailure>,
}

impl ParetoFront {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParetoEntry> {
        self.entries.iter()
    }

    /// Exhaustive pairwise check.
    pub fn is_mutually_non_dominated(&self) -> bool {
        self.entries.iter().enumerate().all(|(i, a)| {
            self.entries.iter().enumerate().all(|(j, b)| {
                i == j || !dominates(b.path.objectives(), a.path.objectives())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominance_needs_one_strict_improvement() {
        assert!(dominates((1.0, 1.0), (1.0, 2.0)));
        assert!(dominates((1.0, 1.0), (2.0, 2.0)));
        assert!(!dominates((1.0, 1.0), (1.0, 1.0)));
        assert!(!dominates((1.0, 3.0), (2.0, 2.0)));
    }

    #[test]
    fn sweep_keeps_staircase_and_first_duplicate() {
        let pts = [
            (5.0, 1.0), // 0 front
            (3.0, 3.0), // 1 front
            (3.0, 3.0), // 2 duplicate of 1
            (4.0, 3.5), // 3 dominated by 1
            (1.0, 9.0), // 4 front
            (3.0, 4.0), // 5 dominated by 1 (same distance)
        ];
        assert_eq!(non_dominated_indices(&pts), vec![4, 1, 0]);
    }

    #[test]
    fn sweep_agrees_with_pairwise_definition() {
        let pts: Vec<(f64, f64)> = (0..40)
            .map(|i| {
                let t = i as f64;
                ((t * 7.3) % 11.0, (t * 3.1) % 13.0)
            })
            .collect();
        let front = non_dominated_indices(&pts);
        for (i, p) in pts.iter().enumerate() {
            let dominated = pts.iter().any(|q| dominates(*q, *p));
            let duplicate_of_earlier = pts[..i].iter().any(|q| q == p);
            let expected = !dominated && !duplicate_of_earlier;
            assert_eq!(front.contains(&i), expected, "point {} {:?}", i, p);
        }
    }
}
