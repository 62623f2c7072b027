use std::collections::BTreeMap;
use std::io::Write;

use stress_router::analysis::{ParetoExplorer, PathfindingEngine, SearchQuery, SweepSpec, ZoneTessellator};
use stress_router::config::{ANALYSIS, EdgeCost, SearchConfig};
use stress_router::data::{
    JsonlFeatureSource, drain_into, load_graph_spec, load_manifest, load_registry, registry_path,
    save_json, save_registry,
};
use stress_router::domain::{
    FeatureVector, GraphSpec, NodeId, Sensor, SensorId, SensorManifest, SpatialFeatures,
    StreetGraph, TemporalFeatures, VisualFeatures, ZoneId,
};
use stress_router::models::{ModelRegistry, SearchParams, ZoneStressMap};
use stress_router::{StressEngine, StressError};

fn record(source: u64, timestamp_ms: i64, level: f64) -> FeatureVector {
    FeatureVector {
        source: SensorId(source),
        timestamp_ms,
        spatial: SpatialFeatures {
            pedestrian_count: 50.0 * level,
            vehicle_count: 20.0 * level,
            crowd_density: 0.7 * level,
            obstacle_density: 0.3 * level,
        },
        visual: VisualFeatures {
            edge_density: 0.2 + 0.5 * level,
            color_entropy: 2.0 + 5.0 * level,
            clutter: 0.6 * level,
            brightness: 0.9 - 0.4 * level,
        },
        temporal: Some(TemporalFeatures {
            motion_intensity: 0.8 * level,
            flow_variability: 0.3 * level,
        }),
        embedding: None,
        scene_label: None,
    }
}

/// One camera on every node of a 5x5 lattice with 10 m blocks; node `n` sits in zone `n + 1`.
fn camera_per_node_grid() -> (StreetGraph, ZoneTessellator, SensorManifest) {
    let sensors = (0..25)
        .map(|n| Sensor::new(n + 1, (n % 5) as f64 * 10.0, (n / 5) as f64 * 10.0))
        .collect();
    let manifest = SensorManifest::planar_rect(sensors, [-5.0, -5.0], [45.0, 45.0]);
    let graph = StreetGraph::lattice(5, 5, 10.0).unwrap();
    (graph, ZoneTessellator::new(ANALYSIS.tessellation), manifest)
}

fn search_config(edge_cost: EdgeCost) -> SearchConfig {
    let mut config = ANALYSIS.search;
    config.edge_cost = edge_cost;
    config
}

#[test]
fn stress_aware_route_detours_around_a_hot_centre() {
    let (mut graph, tessellator, manifest) = camera_per_node_grid();
    let tessellation = tessellator.tessellate(&manifest).unwrap();
    tessellation.assign_nodes(&mut graph).unwrap();
    assert_eq!(graph.node(12).zone, Some(ZoneId(13)));

    let mut values: BTreeMap<ZoneId, f64> = (1..=25).map(|z| (ZoneId(z), 0.0)).collect();
    values.insert(ZoneId(13), 100.0);
    let map = ZoneStressMap::from_values(values, 0.0).unwrap();
    let params = SearchParams::try_new(1.0, 0.0).unwrap();
    let query = SearchQuery::new(NodeId(2), NodeId(22), params);

    let plain = PathfindingEngine::new(&graph, Some(&map), &search_config(EdgeCost::Distance)).unwrap();
    let shortest = plain.search(&query).unwrap();
    assert!((shortest.distance_m - 40.0).abs() < 1e-9);
    assert!(shortest.visits(NodeId(12)));
    assert!(shortest.stress > 0.0);

    let aware = PathfindingEngine::new(
        &graph,
        Some(&map),
        &search_config(EdgeCost::DistanceWithStress { stress_weight: 1.0 }),
    )
    .unwrap();
    let detour = aware.search(&query).unwrap();
    assert!(!detour.visits(NodeId(12)));
    assert!((detour.distance_m - 60.0).abs() < 1e-9);
    assert_eq!(detour.stress, 0.0);
}

#[test]
fn pareto_front_is_sorted_non_dominated_and_reproducible() {
    let manifest = SensorManifest::planar_rect(
        vec![
            Sensor::new(1, 10.0, 10.0),
            Sensor::new(2, 60.0, 10.0),
            Sensor::new(3, 35.0, 35.0),
            Sensor::new(4, 10.0, 60.0),
            Sensor::new(5, 60.0, 60.0),
        ],
        [0.0, 0.0],
        [70.0, 70.0],
    );
    let mut graph = StreetGraph::lattice(8, 8, 10.0).unwrap();
    let tessellation = ZoneTessellator::new(ANALYSIS.tessellation)
        .tessellate(&manifest)
        .unwrap();
    tessellation.assign_nodes(&mut graph).unwrap();

    let values = BTreeMap::from([
        (ZoneId(1), 0.5),
        (ZoneId(2), 3.0),
        (ZoneId(3), 9.0),
        (ZoneId(4), 1.0),
        (ZoneId(5), 0.2),
    ]);
    let map = ZoneStressMap::from_values(values, 1.0).unwrap();
    let engine = PathfindingEngine::new(
        &graph,
        Some(&map),
        &search_config(EdgeCost::DistanceWithStress { stress_weight: 0.5 }),
    )
    .unwrap();
    let explorer = ParetoExplorer::new(&engine);
    let sweep = SweepSpec::Grid {
        weights: vec![1.0, 1.5, 2.0, 4.0],
        alphas: vec![0.0, 0.5, 1.0],
    };

    let front = explorer.explore(NodeId(0), NodeId(63), &sweep).unwrap();
    assert_eq!(front.evaluated, 12);
    assert!(!front.is_empty());
    assert!(front.is_mutually_non_dominated());
    assert!(
        front
            .entries
            .windows(2)
            .all(|w| w[0].path.distance_m <= w[1].path.distance_m)
    );
    for entry in front.iter() {
        assert_eq!(entry.path.nodes.first(), Some(&NodeId(0)));
        assert_eq!(entry.path.nodes.last(), Some(&NodeId(63)));
    }

    let again = explorer.explore(NodeId(0), NodeId(63), &sweep).unwrap();
    assert_eq!(front, again);
}

fn trained_engine(registry: ModelRegistry) -> StressEngine {
    let manifest = SensorManifest::planar_rect(
        vec![
            Sensor::new(1, 10.0, 10.0),
            Sensor::new(2, 30.0, 10.0),
            Sensor::new(3, 10.0, 30.0),
            Sensor::new(4, 30.0, 30.0),
            Sensor::new(5, 20.0, 20.0),
        ],
        [0.0, 0.0],
        [40.0, 40.0],
    );
    let graph = StreetGraph::lattice(5, 5, 10.0).unwrap();
    let engine = StressEngine::new(ANALYSIS, &manifest, graph, registry).unwrap();
    let levels = [0.1, 0.3, 0.5, 0.7, 0.9];
    let batch: Vec<FeatureVector> = (0..50)
        .map(|i| {
            let s = i % 5;
            record(s as u64 + 1, i as i64, levels[s] + 0.01 * (i / 5) as f64)
        })
        .collect();
    assert_eq!(engine.ingest_batch(&batch).accepted, 50);
    engine
}

#[test]
fn persisted_registry_reproduces_the_stress_map() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry_path(Some(dir.path()));

    let mut engine = trained_engine(ModelRegistry::new());
    let registration = engine.train(None).unwrap();
    engine.promote(registration.version).unwrap();
    let before = engine.stress_map().unwrap();
    save_registry(&path, engine.registry()).unwrap();

    let restored = trained_engine(load_registry(&path).unwrap());
    assert_eq!(restored.registry(), engine.registry());
    let after = restored.stress_map().unwrap();
    for ((za, va), (zb, vb)) in before.iter().zip(after.iter()) {
        assert_eq!(za, zb);
        assert_eq!(va.to_bits(), vb.to_bits());
    }
}

#[test]
fn unpromoted_model_does_not_reach_the_router() {
    let mut engine = trained_engine(ModelRegistry::new());
    engine.train(None).unwrap();
    let params = SearchParams::try_new(1.0, 1.0).unwrap();
    let err = engine.route(NodeId(0), NodeId(24), Some(params)).unwrap_err();
    assert!(matches!(err, StressError::InsufficientData { .. }));
}

#[tokio::test]
async fn files_to_route_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = SensorManifest::planar_rect(
        vec![
            Sensor::new(1, 15.0, 15.0),
            Sensor::new(2, 45.0, 15.0),
            Sensor::new(3, 15.0, 45.0),
            Sensor::new(4, 45.0, 45.0),
            // coincident with camera 4: becomes an alias of zone 4
            Sensor::new(7, 45.0, 45.0),
            // outside the corridor
            Sensor::new(9, 500.0, 500.0),
        ],
        [0.0, 0.0],
        [60.0, 60.0],
    );
    save_json(&dir.path().join("manifest.json"), &manifest).unwrap();
    save_json(&dir.path().join("graph.json"), &GraphSpec::lattice(7, 7, 10.0)).unwrap();

    let features = dir.path().join("features.jsonl");
    {
        let mut file = std::fs::File::create(&features).unwrap();
        for i in 0..40i64 {
            let source = [1, 2, 3, 7][(i % 4) as usize];
            let level = [0.2, 0.4, 0.6, 0.9][(i % 4) as usize] - 0.005 * (i / 4) as f64;
            writeln!(file, "{}", serde_json::to_string(&record(source, i, level)).unwrap()).unwrap();
        }
        writeln!(file, "not a record").unwrap();
        writeln!(file, "{}", serde_json::to_string(&record(9, 0, 0.5)).unwrap()).unwrap();
    }

    let manifest = load_manifest(&dir.path().join("manifest.json")).unwrap();
    let graph = load_graph_spec(&dir.path().join("graph.json")).unwrap();
    let mut engine = StressEngine::from_specs(ANALYSIS, &manifest, graph, ModelRegistry::new()).unwrap();
    assert_eq!(engine.tessellation().len(), 4);
    assert_eq!(engine.tessellation().excluded_sensors(), &[SensorId(9)]);

    let mut source = JsonlFeatureSource::open(&features, 16).await.unwrap();
    let report = drain_into(&mut source, engine.aggregator()).await.unwrap();
    assert_eq!(report.accepted, 40);
    assert_eq!(report.rejected, 2);
    assert_eq!(report.accepted_by_zone[&ZoneId(4)], 10);

    let registration = engine.train(None).unwrap();
    engine.promote(registration.version).unwrap();

    let params = SearchParams::try_new(1.5, 0.5).unwrap();
    let path = engine.route(NodeId(0), NodeId(48), Some(params)).unwrap();
    assert_eq!(path.nodes.first(), Some(&NodeId(0)));
    assert_eq!(path.nodes.last(), Some(&NodeId(48)));
    assert!(path.distance_m >= 120.0 - 1e-9);
}
