use geo::Coord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::geometry::{LocalProjection, euclidean, is_finite_coord};
use super::{NodeId, ZoneId};
use crate::config::CoordinateSystem;
use crate::error::{StressError, StressResult};

/// Street graph as it arrives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub coordinates: CoordinateSystem,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl GraphSpec {
    /// Rectangular lattice with `cols x rows` nodes, `spacing` metres apart.
    /// Node `(col, row)` gets id `row * cols + col`.
    pub fn lattice(cols: usize, rows: usize, spacing: f64) -> Self {
        let mut nodes = Vec::with_capacity(cols * rows);
        let mut edges = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                let id = (row * cols + col) as u64;
                nodes.push(NodeSpec {
                    id: NodeId(id),
                    x: col as f64 * spacing,
                    y: row as f64 * spacing,
                });
                if col + 1 < cols {
                    edges.push(EdgeSpec {
                        from: NodeId(id),
                        to: NodeId(id + 1),
                        length: Some(spacing),
                        one_way: false,
                    });
                }
                if row + 1 < rows {
                    edges.push(EdgeSpec {
                        from: NodeId(id),
                        to: NodeId(id + cols as u64),
                        length: Some(spacing),
                        one_way: false,
                    });
                }
            }
        }
        Self {
            coordinates: CoordinateSystem::Planar,
            nodes,
            edges,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: NodeId,
    pub to: NodeId,
    /// Metres. Defaults to the straight-line distance between the projected endpoints.
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default)]
    pub one_way: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntersectionNode {
    pub id: NodeId,
    /// Projected position (metres).
    pub position: Coord,
    /// Exactly one zone once the graph has been assigned.
    pub zone: Option<ZoneId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreetEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub length: f64,
    pub one_way: bool,
    /// Zones crossed by the segment, deduplicated, in travel order.
    pub zones: Vec<ZoneId>,
}

/// Outgoing half-edge in the adjacency list.
#[derive(Debug, Clone, Copy)]
pub struct Arc {
    pub to: usize,
    pub edge: usize,
}

/// Street network with dense node indices for the search.
#[derive(Debug, Clone)]
pub struct StreetGraph {
    nodes: Vec<IntersectionNode>,
    edges: Vec<StreetEdge>,
    index: HashMap<NodeId, usize>,
    adjacency: Vec<Vec<Arc>>,
    projection: LocalProjection,
}

impl StreetGraph {
    /// Builds a graph whose coordinates are already in the target plane.
    pub fn new(nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>) -> StressResult<Self> {
        Self::from_spec(
            GraphSpec {
                coordinates: CoordinateSystem::Planar,
                nodes,
                edges,
            },
            LocalProjection::Identity,
        )
    }

    /// Validates and indexes a graph, projecting node coordinates with `projection`.
    pub fn from_spec(spec: GraphSpec, projection: LocalProjection) -> StressResult<Self> {
        let mut index = HashMap::with_capacity(spec.nodes.len());
        let mut nodes = Vec::with_capacity(spec.nodes.len());

        for n in &spec.nodes {
            let raw = Coord { x: n.x, y: n.y };
            if !is_finite_coord(raw) {
                return Err(StressError::configuration(format!(
                    "node {} has non-finite coordinates",
                    n.id
                )));
            }
            if index.insert(n.id, nodes.len()).is_some() {
                return Err(StressError::configuration(format!(
                    "duplicate node id {}",
                    n.id
                )));
            }
            nodes.push(IntersectionNode {
                id: n.id,
                position: projection.project(raw),
                zone: None,
            });
        }

        let mut adjacency = vec![Vec::new(); nodes.len()];
        let mut edges = Vec::with_capacity(spec.edges.len());

        for e in &spec.edges {
            let (Some(&a), Some(&b)) = (index.get(&e.from), index.get(&e.to)) else {
                return Err(StressError::configuration(format!(
                    "edge {} -> {} references an unknown node",
                    e.from, e.to
                )));
            };
            let length = match e.length {
                Some(len) => len,
                None => euclidean(nodes[a].position, nodes[b].position),
            };
            if !length.is_finite() || length < 0.0 {
                return Err(StressError::configuration(format!(
                    "edge {} -> {} has invalid length {}",
                    e.from, e.to, length
                )));
            }

            let edge_idx = edges.len();
            edges.push(StreetEdge {
                from: e.from,
                to: e.to,
                length,
                one_way: e.one_way,
                zones: Vec::new(),
            });
            adjacency[a].push(Arc {
                to: b,
                edge: edge_idx,
            });
            if !e.one_way {
                adjacency[b].push(Arc {
                    to: a,
                    edge: edge_idx,
                });
            }
        }

        Ok(Self {
            nodes,
            edges,
            index,
            adjacency,
            projection,
        })
    }

    /// Rectangular lattice, see [`GraphSpec::lattice`].
    pub fn lattice(cols: usize, rows: usize, spacing: f64) -> StressResult<Self> {
        Self::from_spec(GraphSpec::lattice(cols, rows, spacing), LocalProjection::Identity)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[IntersectionNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[StreetEdge] {
        &self.edges
    }

    #[inline]
    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    #[inline]
    pub fn node(&self, idx: usize) -> &IntersectionNode {
        &self.nodes[idx]
    }

    #[inline]
    pub fn position(&self, idx: usize) -> Coord {
        self.nodes[idx].position
    }

    #[inline]
    pub fn neighbors(&self, idx: usize) -> &[Arc] {
        &self.adjacency[idx]
    }

    #[inline]
    pub fn edge(&self, edge_idx: usize) -> &StreetEdge {
        &self.edges[edge_idx]
    }

    pub fn projection(&self) -> LocalProjection {
        self.projection
    }

    /// True once every node carries a zone.
    pub fn is_zone_assigned(&self) -> bool {
        !self.nodes.is_empty() && self.nodes.iter().all(|n| n.zone.is_some())
    }

    /// Midpoint of an edge in the projected plane.
    pub fn edge_midpoint(&self, edge_idx: usize) -> Coord {
        let e = &self.edges[edge_idx];
        let a = self.nodes[self.index[&e.from]].position;
        let b = self.nodes[self.index[&e.to]].position;
        Coord {
            x: (a.x + b.x) * 0.5,
            y: (a.y + b.y) * 0.5,
        }
    }

    pub(crate) fn set_zones(&mut self, node_zones: Vec<ZoneId>, edge_zones: Vec<Vec<ZoneId>>) {
        debug_assert_eq!(node_zones.len(), self.nodes.len());
        debug_assert_eq!(edge_zones.len(), self.edges.len());
        for (node, zone) in self.nodes.iter_mut().zip(node_zones) {
            node.zone = Some(zone);
        }
        for (edge, zones) in self.edges.iter_mut().zip(edge_zones) {
            edge.zones = zones;
        }
    }

    /// Manually zone a graph (tests, externally tessellated networks).
    pub fn assign_zones_with<F>(&mut self, mut zone_of: F)
    where
        F: FnMut(&IntersectionNode) -> ZoneId,
    {
        let node_zones: Vec<ZoneId> = self.nodes.iter().map(&mut zone_of).collect();
        let edge_zones = self
            .edges
            .iter()
            .map(|e| {
                let a = node_zones[self.index[&e.from]];
                let b = node_zones[self.index[&e.to]];
                if a == b { vec![a] } else { vec![a, b] }
            })
            .collect();
        self.set_zones(node_zones, edge_zones);
    }
}
