//! Weighted A* over the zoned street graph.
//!
//! Expansion order is `g + W·h` with
//! `h(n) = alpha·stress(zone(n)) + (1 - alpha)·h_geo(n, goal)`.
//! `alpha` and `W` always come from the query.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::config::{Alpha, DF, EdgeCost, GeometricHeuristic, SearchConfig, SearchWeight, StressAttachment};
use crate::domain::{Arc, NodeId, StreetGraph, euclidean, manhattan};
use crate::error::{StressError, StressResult};
use crate::models::{Path, SearchParams, Termination, ZoneStressMap};

/// One routing request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchQuery {
    pub start: NodeId,
    pub goal: NodeId,
    pub params: SearchParams,
    /// Cooperative cut-off on node expansions.
    pub max_expansions: Option<usize>,
}

impl SearchQuery {
    pub fn new(start: NodeId, goal: NodeId, params: SearchParams) -> Self {
        Self {
            start,
            goal,
            params,
            max_expansions: None,
        }
    }

    pub fn with_budget(mut self, max_expansions: Option<usize>) -> Self {
        self.max_expansions = max_expansions;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f: f64,
    g: f64,
    node: usize,
    id: NodeId,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    // BinaryHeap pops the greatest: lowest f, then larger g, then lowest id
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| self.g.total_cmp(&other.g))
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Read-only search context. Every call to [`search`](Self::search) owns
/// its open and closed sets, so one engine can serve concurrent queries.
pub struct PathfindingEngine<'a> {
    graph: &'a StreetGraph,
    stress: Option<&'a ZoneStressMap>,
    edge_cost: EdgeCost,
    heuristic: GeometricHeuristic,
    attachment: StressAttachment,
    /// Stress per node index, from its zone.
    node_stress: Vec<f64>,
    /// Stress per edge index: length x mean stress of the zones it crosses.
    edge_stress: Vec<f64>,
}

impl<'a> PathfindingEngine<'a> {
    pub fn new(
        graph: &'a StreetGraph,
        stress: Option<&'a ZoneStressMap>,
        config: &SearchConfig,
    ) -> StressResult<Self> {
        Self::with_policy(graph, stress, config.edge_cost, config.heuristic, config.attachment)
    }

    pub fn with_policy(
        graph: &'a StreetGraph,
        stress: Option<&'a ZoneStressMap>,
        edge_cost: EdgeCost,
        heuristic: GeometricHeuristic,
        attachment: StressAttachment,
    ) -> StressResult<Self> {
        if graph.is_empty() {
            return Err(StressError::configuration("street graph has no nodes"));
        }
        if let EdgeCost::DistanceWithStress { stress_weight } = edge_cost {
            if !stress_weight.is_finite() || stress_weight < 0.0 {
                return Err(StressError::configuration(format!(
                    "stress weight must be finite and >= 0, got {}",
                    stress_weight
                )));
            }
            if stress.is_none() {
                return Err(StressError::insufficient(
                    "stress-weighted edge cost (no stress map)",
                    0,
                    1,
                ));
            }
        }

        let (node_stress, edge_stress) = match stress {
            Some(map) => {
                if !graph.is_zone_assigned() {
                    return Err(StressError::configuration(
                        "street graph has nodes without a zone; run zone assignment first",
                    ));
                }
                let node_stress = graph
                    .nodes()
                    .iter()
                    .map(|n| n.zone.map_or(map.fallback_value(), |z| map.stress(z)))
                    .collect();
                let edge_stress = graph
                    .edges()
                    .iter()
                    .map(|e| {
                        if e.zones.is_empty() {
                            e.length * map.fallback_value()
                        } else {
                            let sum: f64 = e.zones.iter().map(|z| map.stress(*z)).sum();
                            e.length * sum / e.zones.len() as f64
                        }
                    })
                    .collect();
                (node_stress, edge_stress)
            }
            None => (vec![0.0; graph.len()], vec![0.0; graph.edges().len()]),
        };

        Ok(Self {
            graph,
            stress,
            edge_cost,
            heuristic,
            attachment,
            node_stress,
            edge_stress,
        })
    }

    pub fn graph(&self) -> &StreetGraph {
        self.graph
    }

    pub fn stress_map(&self) -> Option<&ZoneStressMap> {
        self.stress
    }

    /// Stress accrued by traversing `arc` under the attachment policy.
    #[inline]
    pub fn arc_stress(&self, arc: &Arc) -> f64 {
        match self.attachment {
            StressAttachment::Edge => self.edge_stress[arc.edge],
            StressAttachment::Node => self.node_stress[arc.to],
        }
    }

    /// Search cost of traversing `arc`.
    #[inline]
    pub fn arc_cost(&self, arc: &Arc) -> f64 {
        let length = self.graph.edge(arc.edge).length;
        match self.edge_cost {
            EdgeCost::Distance => length,
            EdgeCost::DistanceWithStress { stress_weight } => {
                length + stress_weight * self.arc_stress(arc)
            }
        }
    }

    #[inline]
    fn geometric(&self, node: usize, goal: usize) -> f64 {
        let a = self.graph.position(node);
        let b = self.graph.position(goal);
        match self.heuristic {
            GeometricHeuristic::Euclidean => euclidean(a, b),
            GeometricHeuristic::Manhattan => manhattan(a, b),
            GeometricHeuristic::Zero => 0.0,
        }
    }

    #[inline]
    fn blended(&self, node: usize, goal: usize, alpha: f64) -> f64 {
        let geo = if alpha < 1.0 {
            self.geometric(node, goal)
        } else {
            0.0
        };
        let learned = if alpha > 0.0 {
            self.node_stress[node]
        } else {
            0.0
        };
        alpha * learned + (1.0 - alpha) * geo
    }

    fn resolve(&self, id: NodeId, role: &str) -> StressResult<usize> {
        self.graph
            .node_index(id)
            .ok_or_else(|| StressError::configuration(format!("{} node {} is not in the graph", role, id)))
    }

    pub fn search(&self, query: &SearchQuery) -> StressResult<Path> {
        crate::trace_time!("weighted A*", 10_000, { self.search_inner(query) })
    }

    fn search_inner(&self, query: &SearchQuery) -> StressResult<Path> {
        let weight = SearchWeight::try_new(query.params.weight.value())?.value();
        let alpha = Alpha::try_new(query.params.alpha.value())?.value();
        if alpha > 0.0 && self.stress.is_none() {
            return Err(StressError::insufficient(
                "learned stress heuristic (no stress map)",
                0,
                1,
            ));
        }
        let start = self.resolve(query.start, "start")?;
        let goal = self.resolve(query.goal, "goal")?;

        let n = self.graph.len();
        let mut g = vec![f64::INFINITY; n];
        let mut parent: Vec<Option<(usize, Arc)>> = vec![None; n];
        let mut open = BinaryHeap::new();

        g[start] = 0.0;
        open.push(OpenEntry {
            f: weight * self.blended(start, goal, alpha),
            g: 0.0,
            node: start,
            id: query.start,
        });

        let mut expanded = 0usize;
        let mut budget_hit = false;

        while let Some(entry) = open.pop() {
            if entry.g > g[entry.node] {
                continue;
            }
            if entry.node == goal {
                return self.reconstruct(query, start, goal, &g, &parent, expanded, Termination::GoalExpanded);
            }
            if query.max_expansions.is_some_and(|budget| expanded >= budget) {
                budget_hit = true;
                break;
            }
            expanded += 1;

            for arc in self.graph.neighbors(entry.node) {
                let next_g = entry.g + self.arc_cost(arc);
                if next_g < g[arc.to] {
                    g[arc.to] = next_g;
                    parent[arc.to] = Some((entry.node, *arc));
                    open.push(OpenEntry {
                        f: next_g + weight * self.blended(arc.to, goal, alpha),
                        g: next_g,
                        node: arc.to,
                        id: self.graph.node(arc.to).id,
                    });
                }
            }
        }

        if budget_hit && g[goal].is_finite() {
            if DF.log_pathfinder {
                log::info!(
                    "Budget of {} expansions hit; returning best path so far to {}",
                    expanded,
                    query.goal
                );
            }
            return self.reconstruct(query, start, goal, &g, &parent, expanded, Termination::BudgetExhausted);
        }

        Err(StressError::NoPath {
            start: query.start,
            goal: query.goal,
            expanded,
            budget_exhausted: budget_hit,
        })
    }

    fn reconstruct(
        &self,
        query: &SearchQuery,
        start: usize,
        goal: usize,
        g: &[f64],
        parent: &[Option<(usize, Arc)>],
        expanded: usize,
        termination: Termination,
    ) -> StressResult<Path> {
        let mut nodes = vec![self.graph.node(goal).id];
        let mut distance_m = 0.0;
        let mut stress = 0.0;
        let mut cursor = goal;

        while cursor != start {
            let Some((prev, arc)) = parent[cursor] else {
                return Err(StressError::numerical(format!(
                    "broken parent chain at node {}",
                    self.graph.node(cursor).id
                )));
            };
            distance_m += self.graph.edge(arc.edge).length;
            stress += self.arc_stress(&arc);
            nodes.push(self.graph.node(prev).id);
            cursor = prev;
            if nodes.len() > self.graph.len() {
                return Err(StressError::numerical("cycle in parent chain"));
            }
        }
        nodes.reverse();

        if DF.log_pathfinder {
            log::debug!(
                "{} -> {} [{}]: {} nodes, {:.1} m, stress {:.2}, {} expanded ({})",
                query.start,
                query.goal,
                query.params,
                nodes.len(),
                distance_m,
                stress,
                expanded,
                termination
            );
        }

        Ok(Path {
            nodes,
            distance_m,
            stress,
            cost: g[goal],
            params: query.params,
            expanded,
            termination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EdgeSpec, NodeSpec, ZoneId};
    use crate::error::FailureCategory;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    fn params(w: f64, alpha: f64) -> SearchParams {
        SearchParams::try_new(w, alpha).unwrap()
    }

    fn distance_engine(graph: &StreetGraph, h: GeometricHeuristic) -> PathfindingEngine<'_> {
        PathfindingEngine::with_policy(graph, None, EdgeCost::Distance, h, StressAttachment::Edge)
            .unwrap()
    }

    /// Plain Dijkstra over the engine's own arc costs.
    fn reference_cost(engine: &PathfindingEngine<'_>, start: NodeId, goal: NodeId) -> Option<f64> {
        let graph = engine.graph();
        let s = graph.node_index(start)?;
        let t = graph.node_index(goal)?;
        let mut dist = vec![f64::INFINITY; graph.len()];
        let mut done = vec![false; graph.len()];
        dist[s] = 0.0;
        for _ in 0..graph.len() {
            let Some(u) = (0..graph.len())
                .filter(|&i| !done[i] && dist[i].is_finite())
                .min_by(|&a, &b| dist[a].total_cmp(&dist[b]))
            else {
                break;
            };
            done[u] = true;
            for arc in graph.neighbors(u) {
                let nd = dist[u] + engine.arc_cost(arc);
                if nd < dist[arc.to] {
                    dist[arc.to] = nd;
                }
            }
        }
        dist[t].is_finite().then_some(dist[t])
    }

    /// Random planar graph whose edge lengths never undercut straight-line distance.
    fn random_graph(seed: u64, n: usize) -> StreetGraph {
        let mut rng = StdRng::seed_from_u64(seed);
        let nodes: Vec<NodeSpec> = (0..n)
            .map(|i| NodeSpec {
                id: NodeId(i as u64),
                x: rng.gen_range(0.0..100.0),
                y: rng.gen_range(0.0..100.0),
            })
            .collect();
        let mut edges = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if rng.gen_bool(0.12) {
                    let (a, b) = (&nodes[i], &nodes[j]);
                    let straight = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
                    edges.push(EdgeSpec {
                        from: a.id,
                        to: b.id,
                        length: Some(straight * rng.gen_range(1.0..1.6)),
                        one_way: rng.gen_bool(0.1),
                    });
                }
            }
        }
        StreetGraph::new(nodes, edges).unwrap()
    }

    fn centre_stress_grid() -> (StreetGraph, ZoneStressMap) {
        let mut g = StreetGraph::lattice(5, 5, 1.0).unwrap();
        g.assign_zones_with(|n| if n.id == NodeId(12) { ZoneId(1) } else { ZoneId(0) });
        let map = ZoneStressMap::from_values(BTreeMap::from([(ZoneId(0), 0.0), (ZoneId(1), 10.0)]), 0.0)
            .unwrap();
        (g, map)
    }

    #[test]
    fn start_equals_goal() {
        let g = StreetGraph::lattice(3, 3, 1.0).unwrap();
        let engine = distance_engine(&g, GeometricHeuristic::Euclidean);
        let p = engine.search(&SearchQuery::new(NodeId(4), NodeId(4), params(1.0, 0.0))).unwrap();
        assert_eq!(p.nodes, vec![NodeId(4)]);
        assert_eq!(p.distance_m, 0.0);
        assert_eq!(p.termination, Termination::GoalExpanded);
    }

    #[test]
    fn matches_uniform_cost_search_on_random_graphs() {
        for seed in 0..6 {
            let g = random_graph(seed, 40);
            let engine = distance_engine(&g, GeometricHeuristic::Euclidean);
            for (s, t) in [(0, 39), (3, 17), (11, 28)] {
                let (s, t) = (NodeId(s), NodeId(t));
                let reference = reference_cost(&engine, s, t);
                match engine.search(&SearchQuery::new(s, t, params(1.0, 0.0))) {
                    Ok(p) => {
                        let expected = reference.unwrap();
                        assert!((p.cost - expected).abs() < 1e-9, "seed {}: {} vs {}", seed, p.cost, expected);
                        assert!((p.distance_m - p.cost).abs() < 1e-9);
                    }
                    Err(err) => {
                        assert!(reference.is_none(), "seed {}: {}", seed, err);
                        assert_eq!(err.category(), FailureCategory::Connectivity);
                    }
                }
            }
        }
    }

    #[test]
    fn stress_weighted_cost_stays_optimal_with_geometric_heuristic() {
        for seed in 10..15 {
            let mut g = random_graph(seed, 30);
            g.assign_zones_with(|n| ZoneId(n.id.0 % 4));
            let map = ZoneStressMap::from_values(
                (0..4).map(|z| (ZoneId(z), z as f64 * 0.7)).collect(),
                1.0,
            )
            .unwrap();
            let engine = PathfindingEngine::with_policy(
                &g,
                Some(&map),
                EdgeCost::DistanceWithStress { stress_weight: 2.0 },
                GeometricHeuristic::Euclidean,
                StressAttachment::Edge,
            )
            .unwrap();
            let query = SearchQuery::new(NodeId(0), NodeId(29), params(1.0, 0.0));
            match reference_cost(&engine, NodeId(0), NodeId(29)) {
                Some(expected) => {
                    let p = engine.search(&query).unwrap();
                    assert!((p.cost - expected).abs() < 1e-9, "seed {}", seed);
                    assert!((p.cost - p.distance_m - 2.0 * p.stress).abs() < 1e-9);
                }
                None => {
                    let err = engine.search(&query).unwrap_err();
                    assert_eq!(err.category(), FailureCategory::Connectivity);
                }
            }
        }
    }

    #[test]
    fn every_policy_is_optimal_on_a_rectilinear_grid() {
        use strum::IntoEnumIterator;

        let (g, map) = centre_stress_grid();
        for heuristic in GeometricHeuristic::iter() {
            for attachment in StressAttachment::iter() {
                let engine = PathfindingEngine::with_policy(
                    &g,
                    Some(&map),
                    EdgeCost::DistanceWithStress { stress_weight: 1.0 },
                    heuristic,
                    attachment,
                )
                .unwrap();
                let expected = reference_cost(&engine, NodeId(2), NodeId(22)).unwrap();
                let p = engine
                    .search(&SearchQuery::new(NodeId(2), NodeId(22), params(1.0, 0.0)))
                    .unwrap();
                assert!((p.cost - expected).abs() < 1e-9, "{} / {}", heuristic, attachment);
                assert!(!p.visits(NodeId(12)), "{} / {}", heuristic, attachment);
            }
        }
    }

    #[test]
    fn inflated_weight_never_beats_optimal_cost() {
        for seed in 20..26 {
            let g = random_graph(seed, 40);
            let engine = distance_engine(&g, GeometricHeuristic::Euclidean);
            let q = |w| SearchQuery::new(NodeId(1), NodeId(38), params(w, 0.0));
            if let Ok(optimal) = engine.search(&q(1.0)) {
                for w in [1.25, 2.0, 4.0] {
                    let p = engine.search(&q(w)).unwrap();
                    assert!(p.cost >= optimal.cost - 1e-9);
                }
            }
        }
    }

    #[test]
    fn inflated_weight_expands_no_more_on_open_grids() {
        let g = StreetGraph::lattice(12, 12, 1.0).unwrap();
        let engine = distance_engine(&g, GeometricHeuristic::Euclidean);
        for (s, t) in [(0, 143), (0, 71), (5, 138), (12, 23)] {
            let q = |w| SearchQuery::new(NodeId(s), NodeId(t), params(w, 0.0));
            let base = engine.search(&q(1.0)).unwrap();
            for w in [1.5, 2.0, 3.0] {
                let p = engine.search(&q(w)).unwrap();
                assert!(p.cost >= base.cost - 1e-9);
                assert!(p.expanded <= base.expanded, "{}->{} W={}: {} > {}", s, t, w, p.expanded, base.expanded);
            }
        }
    }

    #[test]
    fn learned_heuristic_steers_around_stressful_centre() {
        let (g, map) = centre_stress_grid();
        let engine = PathfindingEngine::with_policy(
            &g,
            Some(&map),
            EdgeCost::Distance,
            GeometricHeuristic::Manhattan,
            StressAttachment::Edge,
        )
        .unwrap();

        let learned = engine.search(&SearchQuery::new(NodeId(0), NodeId(24), params(1.0, 1.0))).unwrap();
        assert!(!learned.visits(NodeId(12)));
        assert_eq!(learned.distance_m, 8.0);

        let geometric = engine.search(&SearchQuery::new(NodeId(0), NodeId(24), params(1.0, 0.0))).unwrap();
        assert_eq!(geometric.distance_m, 8.0);
        assert_eq!(geometric.nodes.first(), Some(&NodeId(0)));
        assert_eq!(geometric.nodes.last(), Some(&NodeId(24)));
    }

    #[test]
    fn node_attachment_charges_entered_zones() {
        let (g, map) = centre_stress_grid();
        let engine = PathfindingEngine::with_policy(
            &g,
            Some(&map),
            EdgeCost::Distance,
            GeometricHeuristic::Manhattan,
            StressAttachment::Node,
        )
        .unwrap();
        // straight through the centre row
        let p = engine.search(&SearchQuery::new(NodeId(10), NodeId(14), params(1.0, 0.0))).unwrap();
        assert_eq!(p.nodes, vec![NodeId(10), NodeId(11), NodeId(12), NodeId(13), NodeId(14)]);
        assert_eq!(p.stress, 10.0);
    }

    #[test]
    fn disconnected_goal_is_no_path() {
        let nodes = (0..4).map(|i| NodeSpec { id: NodeId(i), x: i as f64, y: 0.0 }).collect();
        let edges = vec![
            EdgeSpec { from: NodeId(0), to: NodeId(1), length: None, one_way: false },
            EdgeSpec { from: NodeId(2), to: NodeId(3), length: None, one_way: false },
        ];
        let g = StreetGraph::new(nodes, edges).unwrap();
        let engine = distance_engine(&g, GeometricHeuristic::Euclidean);
        let err = engine.search(&SearchQuery::new(NodeId(0), NodeId(3), params(1.0, 0.0))).unwrap_err();
        assert!(matches!(err, StressError::NoPath { budget_exhausted: false, expanded: 2, .. }));
    }

    #[test]
    fn one_way_edges_are_respected() {
        let nodes = (0..3).map(|i| NodeSpec { id: NodeId(i), x: i as f64, y: 0.0 }).collect();
        let edges = vec![
            EdgeSpec { from: NodeId(0), to: NodeId(1), length: None, one_way: true },
            EdgeSpec { from: NodeId(1), to: NodeId(2), length: None, one_way: false },
        ];
        let g = StreetGraph::new(nodes, edges).unwrap();
        let engine = distance_engine(&g, GeometricHeuristic::Euclidean);
        assert!(engine.search(&SearchQuery::new(NodeId(0), NodeId(2), params(1.0, 0.0))).is_ok());
        assert!(engine.search(&SearchQuery::new(NodeId(2), NodeId(0), params(1.0, 0.0))).is_err());
    }

    #[test]
    fn budget_yields_anytime_result_or_flagged_failure() {
        let nodes = (0..4).map(|i| NodeSpec { id: NodeId(i), x: i as f64, y: 0.0 }).collect();
        let edges = vec![
            EdgeSpec { from: NodeId(0), to: NodeId(1), length: None, one_way: false },
            EdgeSpec { from: NodeId(1), to: NodeId(2), length: None, one_way: false },
            EdgeSpec { from: NodeId(2), to: NodeId(3), length: None, one_way: false },
            EdgeSpec { from: NodeId(0), to: NodeId(3), length: Some(100.0), one_way: false },
        ];
        let g = StreetGraph::new(nodes, edges).unwrap();
        let engine = distance_engine(&g, GeometricHeuristic::Euclidean);
        let q = SearchQuery::new(NodeId(0), NodeId(3), params(1.0, 0.0));

        let full = engine.search(&q).unwrap();
        assert_eq!(full.distance_m, 3.0);

        let anytime = engine.search(&q.with_budget(Some(1))).unwrap();
        assert_eq!(anytime.termination, Termination::BudgetExhausted);
        assert_eq!(anytime.nodes, vec![NodeId(0), NodeId(3)]);
        assert_eq!(anytime.distance_m, 100.0);

        let q2 = SearchQuery::new(NodeId(1), NodeId(3), params(1.0, 0.0)).with_budget(Some(0));
        let err = engine.search(&q2).unwrap_err();
        assert!(matches!(err, StressError::NoPath { budget_exhausted: true, .. }));
    }

    #[test]
    fn missing_inputs_are_classified() {
        let g = StreetGraph::lattice(3, 3, 1.0).unwrap();
        let engine = distance_engine(&g, GeometricHeuristic::Euclidean);

        let err = engine.search(&SearchQuery::new(NodeId(0), NodeId(8), params(1.0, 0.5))).unwrap_err();
        assert_eq!(err.category(), FailureCategory::ModelAvailability);

        let err = engine.search(&SearchQuery::new(NodeId(0), NodeId(99), params(1.0, 0.0))).unwrap_err();
        assert_eq!(err.category(), FailureCategory::Configuration);

        let map = ZoneStressMap::from_values(BTreeMap::new(), 1.0).unwrap();
        let unzoned = PathfindingEngine::new(&g, Some(&map), &crate::config::ANALYSIS.search);
        assert!(matches!(unzoned, Err(StressError::Configuration(_))));

        let no_map = PathfindingEngine::new(&g, None, &crate::config::ANALYSIS.search);
        assert!(matches!(no_map, Err(StressError::InsufficientData { .. })));
    }

    #[test]
    fn repeated_queries_are_identical() {
        let g = random_graph(3, 50);
        let engine = distance_engine(&g, GeometricHeuristic::Zero);
        let q = SearchQuery::new(NodeId(2), NodeId(47), params(1.0, 0.0));
        assert_eq!(engine.search(&q), engine.search(&q));
    }
}
