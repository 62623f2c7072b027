//! Sensor coverage partitioning.
//!
//! Builds one Voronoi cell per camera inside the corridor polygon and answers
//! `zone_of(point)` with an R-tree nearest-site query. Cells are built by
//! clipping the corridor's bounding box with the perpendicular bisector
//! against every other site, then intersecting with the (possibly concave)
//! corridor. Sensor counts per corridor are small, so the O(n²) bisector pass
//! is cheaper in practice than a sweep-line diagram.

use geo::{Area, BooleanOps, BoundingRect, Centroid, Coord, Intersects, LineString, MultiPolygon, Point, Polygon};
use rayon::prelude::*;
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::{DF, TessellationConfig};
use crate::domain::{
    LocalProjection, SensorId, SensorManifest, StreetGraph, ZoneId, distance_2, is_finite_coord,
};
use crate::error::{StressError, StressResult};
use crate::models::Zone;

/// Site entry in the R-tree.
#[derive(Clone, Copy, Debug)]
struct SiteItem {
    zone: ZoneId,
    sensor: SensorId,
    pos: [f64; 2],
}

impl RTreeObject for SiteItem {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.pos)
    }
}

impl PointDistance for SiteItem {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.pos[0] - point[0];
        let dy = self.pos[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Zone count summary returned by [`Tessellation::assign_nodes`].
#[derive(Debug, Clone, Default)]
pub struct AssignmentSummary {
    pub nodes_per_zone: BTreeMap<ZoneId, usize>,
    pub zones_without_nodes: Vec<ZoneId>,
}

/// The result of tessellating one manifest. Immutable; rebuild on manifest change.
#[derive(Debug, Clone)]
pub struct Tessellation {
    zones: Vec<Zone>,
    index: HashMap<ZoneId, usize>,
    sensor_to_zone: HashMap<SensorId, ZoneId>,
    excluded: Vec<SensorId>,
    boundary: Polygon<f64>,
    projection: LocalProjection,
    tree: RTree<SiteItem>,
}

pub struct ZoneTessellator {
    config: TessellationConfig,
}

impl ZoneTessellator {
    pub fn new(config: TessellationConfig) -> Self {
        Self { config }
    }

    pub fn tessellate(&self, manifest: &SensorManifest) -> StressResult<Tessellation> {
        crate::trace_time!("tessellate", 20_000, { self.tessellate_inner(manifest) })
    }

    fn tessellate_inner(&self, manifest: &SensorManifest) -> StressResult<Tessellation> {
        // 1. Manifest sanity
        if manifest.sensors.is_empty() {
            return Err(StressError::configuration("sensor manifest is empty"));
        }
        let mut seen = HashSet::with_capacity(manifest.sensors.len());
        for s in &manifest.sensors {
            if !seen.insert(s.id) {
                return Err(StressError::configuration(format!(
                    "duplicate sensor id {}",
                    s.id
                )));
            }
            if !is_finite_coord(s.coord()) {
                return Err(StressError::configuration(format!(
                    "sensor {} has non-finite coordinates",
                    s.id
                )));
            }
        }

        // 2. Boundary and projection
        let raw_ring = manifest.boundary_coords();
        if raw_ring.iter().any(|c| !is_finite_coord(*c)) {
            return Err(StressError::configuration("boundary has non-finite vertices"));
        }
        let distinct: HashSet<(u64, u64)> = raw_ring
            .iter()
            .map(|c| (c.x.to_bits(), c.y.to_bits()))
            .collect();
        if distinct.len() < 3 {
            return Err(StressError::configuration(
                "boundary polygon needs at least 3 distinct vertices",
            ));
        }
        let raw_boundary = Polygon::new(LineString::from(raw_ring), vec![]);
        let origin = raw_boundary
            .centroid()
            .ok_or_else(|| StressError::configuration("boundary polygon is degenerate"))?;
        let projection = LocalProjection::for_system(manifest.coordinates, origin.0);

        let boundary = Polygon::new(
            raw_boundary
                .exterior()
                .coords()
                .map(|c| projection.project(*c))
                .collect::<LineString<f64>>(),
            vec![],
        );
        if boundary.unsigned_area() <= 0.0 {
            return Err(StressError::configuration("boundary polygon has zero area"));
        }

        // 3. Keep sensors inside the corridor, lowest id first
        let mut candidates: Vec<(SensorId, Coord)> = Vec::new();
        let mut excluded = Vec::new();
        for s in &manifest.sensors {
            let p = projection.project(s.coord());
            if boundary.intersects(&Point(p)) {
                candidates.push((s.id, p));
            } else {
                excluded.push(s.id);
            }
        }
        if !excluded.is_empty() {
            log::warn!(
                "{} sensor(s) outside the corridor boundary ignored: {:?}",
                excluded.len(),
                excluded
            );
        }
        if candidates.is_empty() {
            return Err(StressError::configuration(
                "bounding polygon contains no sensors",
            ));
        }
        candidates.sort_by_key(|(id, _)| *id);

        // 4. Merge coincident sensors into the lowest id
        let tol2 = self.config.coincident_tolerance_m * self.config.coincident_tolerance_m;
        let mut sites: Vec<(SensorId, Coord, Vec<SensorId>)> = Vec::new();
        for (id, p) in candidates {
            match sites.iter_mut().find(|(_, q, _)| distance_2(p, *q) <= tol2) {
                Some((_, _, aliases)) => aliases.push(id),
                None => sites.push((id, p, Vec::new())),
            }
        }

        // 5. Cells
        let Some(rect) = boundary.bounding_rect() else {
            return Err(StressError::configuration("boundary polygon has no extent"));
        };
        let m = self.config.bbox_margin_m.max(1.0);
        let frame = [
            Coord { x: rect.min().x - m, y: rect.min().y - m },
            Coord { x: rect.max().x + m, y: rect.min().y - m },
            Coord { x: rect.max().x + m, y: rect.max().y + m },
            Coord { x: rect.min().x - m, y: rect.max().y + m },
        ];
        let site_coords: Vec<Coord> = sites.iter().map(|(_, p, _)| *p).collect();

        let zones: Vec<Zone> = sites
            .par_iter()
            .enumerate()
            .map(|(i, (sensor, site, aliases))| {
                let ring = voronoi_cell(i, &site_coords, &frame);
                let polygon = if ring.len() >= 3 {
                    Polygon::new(LineString::from(ring), vec![]).intersection(&boundary)
                } else {
                    MultiPolygon::new(vec![])
                };
                let centroid = polygon.centroid().map_or(*site, |c| c.0);
                Zone {
                    id: ZoneId::from(*sensor),
                    sensor: *sensor,
                    site: *site,
                    area_m2: polygon.unsigned_area(),
                    polygon,
                    centroid,
                    aliases: aliases.clone(),
                }
            })
            .collect();

        // 6. Lookup structures
        let mut sensor_to_zone = HashMap::new();
        let mut index = HashMap::with_capacity(zones.len());
        for (i, z) in zones.iter().enumerate() {
            index.insert(z.id, i);
            sensor_to_zone.insert(z.sensor, z.id);
            for a in &z.aliases {
                sensor_to_zone.insert(*a, z.id);
            }
        }
        let tree = RTree::bulk_load(
            zones
                .iter()
                .map(|z| SiteItem {
                    zone: z.id,
                    sensor: z.sensor,
                    pos: [z.site.x, z.site.y],
                })
                .collect(),
        );

        if DF.log_tessellation {
            let merged: usize = zones.iter().map(|z| z.aliases.len()).sum();
            log::info!(
                "Tessellated {} sensor(s) into {} zone(s) ({} merged, {} outside), corridor {:.0} m²",
                manifest.sensors.len(),
                zones.len(),
                merged,
                excluded.len(),
                boundary.unsigned_area()
            );
        }

        Ok(Tessellation {
            zones,
            index,
            sensor_to_zone,
            excluded,
            boundary,
            projection,
            tree,
        })
    }
}

/// Convex Voronoi cell of site `i`, clipped to `frame`.
fn voronoi_cell(i: usize, sites: &[Coord], frame: &[Coord; 4]) -> Vec<Coord> {
    let s = sites[i];
    let mut poly = frame.to_vec();
    for (j, o) in sites.iter().enumerate() {
        if j == i {
            continue;
        }
        let normal = Coord { x: o.x - s.x, y: o.y - s.y };
        let mid = Coord { x: (o.x + s.x) * 0.5, y: (o.y + s.y) * 0.5 };
        poly = clip_half_plane(&poly, normal, mid);
        if poly.len() < 3 {
            return Vec::new();
        }
    }
    poly
}

/// Keeps the part of a convex polygon where `normal · (p - mid) <= 0`.
fn clip_half_plane(poly: &[Coord], normal: Coord, mid: Coord) -> Vec<Coord> {
    let side = |p: Coord| normal.x * (p.x - mid.x) + normal.y * (p.y - mid.y);
    let n = poly.len();
    let mut out: Vec<Coord> = Vec::with_capacity(n + 1);

    for k in 0..n {
        let cur = poly[k];
        let next = poly[(k + 1) % n];
        let sc = side(cur);
        let sn = side(next);
        if sc <= 0.0 {
            out.push(cur);
        }
        if (sc <= 0.0) != (sn <= 0.0) {
            let t = sc / (sc - sn);
            out.push(Coord {
                x: cur.x + t * (next.x - cur.x),
                y: cur.y + t * (next.y - cur.y),
            });
        }
    }

    out.dedup_by(|a, b| distance_2(*a, *b) < 1e-18);
    if out.len() > 1 && distance_2(out[0], out[out.len() - 1]) < 1e-18 {
        out.pop();
    }
    out
}

impl Tessellation {
    /// Nearest site under squared Euclidean distance in the projected plane.
    /// Exactly equidistant sites resolve to the lowest sensor id.
    pub fn zone_of(&self, p: Coord) -> ZoneId {
        let q = [p.x, p.y];
        let mut iter = self.tree.nearest_neighbor_iter_with_distance_2(&q);
        // A tessellation always holds at least one site
        let Some((first, d0)) = iter.next() else {
            return self.zones[0].id;
        };
        let mut best = (first.sensor, first.zone);
        for (item, d) in iter {
            if d != d0 {
                break;
            }
            if item.sensor < best.0 {
                best = (item.sensor, item.zone);
            }
        }
        best.1
    }

    /// `zone_of` for a point in manifest coordinates.
    pub fn zone_of_raw(&self, raw: Coord) -> ZoneId {
        self.zone_of(self.projection.project(raw))
    }

    /// Linear-scan reference for `zone_of`, same metric and tie-break.
    pub fn zone_of_by_scan(&self, p: Coord) -> ZoneId {
        let mut best: Option<(f64, SensorId, ZoneId)> = None;
        for z in &self.zones {
            let d = distance_2(p, z.site);
            let better = match best {
                None => true,
                Some((bd, bs, _)) => d < bd || (d == bd && z.sensor < bs),
            };
            if better {
                best = Some((d, z.sensor, z.id));
            }
        }
        best.map_or(self.zones[0].id, |(_, _, zone)| zone)
    }

    pub fn zone_for_sensor(&self, sensor: SensorId) -> Option<ZoneId> {
        self.sensor_to_zone.get(&sensor).copied()
    }

    /// Every (sensor, zone) pair, aliases included.
    pub fn sensor_zones(&self) -> impl Iterator<Item = (SensorId, ZoneId)> + '_ {
        self.sensor_to_zone.iter().map(|(s, z)| (*s, *z))
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone_ids(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.zones.iter().map(|z| z.id)
    }

    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.index.get(&id).map(|&i| &self.zones[i])
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn excluded_sensors(&self) -> &[SensorId] {
        &self.excluded
    }

    pub fn boundary(&self) -> &Polygon<f64> {
        &self.boundary
    }

    pub fn projection(&self) -> LocalProjection {
        self.projection
    }

    /// Assigns every node its zone and every edge the zones it crosses
    /// (start, midpoint, end; consecutive repeats dropped).
    pub fn assign_nodes(&self, graph: &mut StreetGraph) -> StressResult<AssignmentSummary> {
        if graph.projection() != self.projection {
            return Err(StressError::configuration(
                "street graph and sensor manifest use different projections",
            ));
        }

        let node_zones: Vec<ZoneId> = graph
            .nodes()
            .par_iter()
            .map(|n| self.zone_of(n.position))
            .collect();

        let edge_zones: Vec<Vec<ZoneId>> = (0..graph.edges().len())
            .into_par_iter()
            .map(|e| {
                let edge = graph.edge(e);
                let a = graph.node_index(edge.from).map(|i| node_zones[i]);
                let b = graph.node_index(edge.to).map(|i| node_zones[i]);
                let mid = Some(self.zone_of(graph.edge_midpoint(e)));
                let mut zones: Vec<ZoneId> = [a, mid, b].into_iter().flatten().collect();
                zones.dedup();
                zones
            })
            .collect();

        let mut summary = AssignmentSummary::default();
        for z in &node_zones {
            *summary.nodes_per_zone.entry(*z).or_default() += 1;
        }
        summary.zones_without_nodes = self
            .zones
            .iter()
            .map(|z| z.id)
            .filter(|id| !summary.nodes_per_zone.contains_key(id))
            .collect();

        graph.set_zones(node_zones, edge_zones);

        if DF.log_tessellation {
            log::info!(
                "Assigned {} node(s) across {} zone(s); {} zone(s) without nodes",
                graph.len(),
                summary.nodes_per_zone.len(),
                summary.zones_without_nodes.len()
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ANALYSIS, CoordinateSystem};
    use crate::domain::{NodeId, Sensor};
    use geo::Contains;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn tessellator() -> ZoneTessellator {
        ZoneTessellator::new(ANALYSIS.tessellation)
    }

    fn square_manifest(sensors: Vec<Sensor>) -> SensorManifest {
        SensorManifest::planar_rect(sensors, [0.0, 0.0], [100.0, 100.0])
    }

    #[test]
    fn single_sensor_covers_the_corridor() {
        let t = tessellator()
            .tessellate(&square_manifest(vec![Sensor::new(7, 20.0, 30.0)]))
            .unwrap();
        assert_eq!(t.len(), 1);
        assert!((t.zones()[0].area_m2 - 10_000.0).abs() < 1e-6);
        assert_eq!(t.zone_of(Coord { x: 99.0, y: 1.0 }), ZoneId(7));
    }

    #[test]
    fn cell_areas_sum_to_corridor_area() {
        let sensors = vec![
            Sensor::new(1, 10.0, 10.0),
            Sensor::new(2, 80.0, 20.0),
            Sensor::new(3, 50.0, 90.0),
            Sensor::new(4, 45.0, 45.0),
        ];
        let t = tessellator().tessellate(&square_manifest(sensors)).unwrap();
        let total: f64 = t.zones().iter().map(|z| z.area_m2).sum();
        assert!((total - 10_000.0).abs() < 1e-6, "total {}", total);
    }

    #[test]
    fn duplicate_ids_are_fatal() {
        let sensors = vec![Sensor::new(1, 10.0, 10.0), Sensor::new(1, 20.0, 20.0)];
        let err = tessellator().tessellate(&square_manifest(sensors)).unwrap_err();
        assert!(matches!(err, StressError::Configuration(_)));
    }

    #[test]
    fn corridor_without_sensors_is_fatal() {
        let sensors = vec![Sensor::new(1, 500.0, 500.0)];
        let err = tessellator().tessellate(&square_manifest(sensors)).unwrap_err();
        assert!(matches!(err, StressError::Configuration(_)));
        assert!(tessellator().tessellate(&square_manifest(vec![])).is_err());
    }

    #[test]
    fn degenerate_boundary_is_fatal() {
        let manifest = SensorManifest::planar(
            vec![Sensor::new(1, 0.0, 0.0)],
            vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]],
        );
        assert!(tessellator().tessellate(&manifest).is_err());
    }

    #[test]
    fn coincident_sensors_merge_into_lowest_id() {
        let sensors = vec![
            Sensor::new(9, 30.0, 30.0),
            Sensor::new(4, 30.0, 30.0),
            Sensor::new(5, 70.0, 70.0),
        ];
        let t = tessellator().tessellate(&square_manifest(sensors)).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.zone_for_sensor(SensorId(9)), Some(ZoneId(4)));
        assert!(t.zone(ZoneId(4)).unwrap().covers_sensor(SensorId(9)));
    }

    #[test]
    fn outside_sensors_are_excluded_not_fatal() {
        let sensors = vec![Sensor::new(1, 50.0, 50.0), Sensor::new(2, -40.0, 50.0)];
        let t = tessellator().tessellate(&square_manifest(sensors)).unwrap();
        assert_eq!(t.excluded_sensors(), &[SensorId(2)]);
        assert_eq!(t.zone_for_sensor(SensorId(2)), None);
    }

    #[test]
    fn bisector_ties_go_to_lowest_id() {
        let sensors = vec![Sensor::new(8, 25.0, 50.0), Sensor::new(3, 75.0, 50.0)];
        let t = tessellator().tessellate(&square_manifest(sensors)).unwrap();
        let on_bisector = Coord { x: 50.0, y: 12.0 };
        assert_eq!(t.zone_of(on_bisector), ZoneId(3));
        assert_eq!(t.zone_of_by_scan(on_bisector), ZoneId(3));
    }

    #[test]
    fn rtree_lookup_matches_brute_force_on_random_points() {
        let mut rng = StdRng::seed_from_u64(11);
        let sensors: Vec<Sensor> = (0..25)
            .map(|i| Sensor::new(i, rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)))
            .collect();
        let t = tessellator().tessellate(&square_manifest(sensors)).unwrap();
        for _ in 0..100 {
            let p = Coord { x: rng.gen_range(0.0..100.0), y: rng.gen_range(0.0..100.0) };
            assert_eq!(t.zone_of(p), t.zone_of_by_scan(p));
        }
    }

    #[test]
    fn points_inside_a_cell_belong_to_that_zone() {
        let mut rng = StdRng::seed_from_u64(5);
        let sensors: Vec<Sensor> = (0..12)
            .map(|i| Sensor::new(i, rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)))
            .collect();
        let t = tessellator().tessellate(&square_manifest(sensors)).unwrap();
        for _ in 0..200 {
            let p = Coord { x: rng.gen_range(0.0..100.0), y: rng.gen_range(0.0..100.0) };
            for z in t.zones() {
                if z.polygon.contains(&Point(p)) {
                    assert_eq!(t.zone_of(p), z.id);
                }
            }
        }
    }

    #[test]
    fn concave_corridor_is_clipped() {
        // L-shaped corridor
        let manifest = SensorManifest::planar(
            vec![Sensor::new(1, 10.0, 10.0), Sensor::new(2, 90.0, 10.0), Sensor::new(3, 10.0, 90.0)],
            vec![[0.0, 0.0], [100.0, 0.0], [100.0, 20.0], [20.0, 20.0], [20.0, 100.0], [0.0, 100.0]],
        );
        let t = tessellator().tessellate(&manifest).unwrap();
        let total: f64 = t.zones().iter().map(|z| z.area_m2).sum();
        assert!((total - 3_600.0).abs() < 1e-6, "total {}", total);
    }

    #[test]
    fn every_node_gets_exactly_one_zone() {
        let sensors = vec![Sensor::new(1, 1.0, 1.0), Sensor::new(2, 8.0, 3.0), Sensor::new(3, 4.0, 8.0)];
        let manifest = SensorManifest::planar_rect(sensors, [-1.0, -1.0], [10.0, 10.0]);
        let t = tessellator().tessellate(&manifest).unwrap();
        let mut g = StreetGraph::lattice(10, 10, 1.0).unwrap();
        let summary = t.assign_nodes(&mut g).unwrap();

        assert!(g.is_zone_assigned());
        assert_eq!(summary.nodes_per_zone.values().sum::<usize>(), 100);
        for n in g.nodes() {
            assert_eq!(n.zone, Some(t.zone_of_by_scan(n.position)));
        }
        assert!(g.edges().iter().all(|e| !e.zones.is_empty()));
        let corner = g.node_index(NodeId(0)).unwrap();
        assert_eq!(g.node(corner).zone, Some(ZoneId(1)));
    }

    #[test]
    fn geographic_manifest_is_projected() {
        let manifest = SensorManifest {
            coordinates: CoordinateSystem::Geographic,
            sensors: vec![Sensor::new(1, -3.701, 40.420), Sensor::new(2, -3.699, 40.420)],
            boundary: vec![[-3.702, 40.419], [-3.698, 40.419], [-3.698, 40.421], [-3.702, 40.421]],
        };
        let t = tessellator().tessellate(&manifest).unwrap();
        // ~338 m x 222 m
        let area = t.boundary().unsigned_area();
        assert!(area > 70_000.0 && area < 80_000.0, "area {}", area);
        assert_eq!(t.zone_of_raw(Coord { x: -3.7015, y: 40.4201 }), ZoneId(1));
        assert_eq!(t.zone_of_raw(Coord { x: -3.6985, y: 40.4201 }), ZoneId(2));
    }
}
