use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use stress_router::config::DEMO;
use stress_router::data::save_json;
use stress_router::domain::{
    FeatureVector, GraphSpec, Sensor, SensorId, SensorManifest, SpatialFeatures, TemporalFeatures,
    VisualFeatures,
};

// 2023-11-14, one record per camera per minute
const START_MS: i64 = 1_700_000_000_000;
const STEP_MS: i64 = 60_000;

/// Observation intensity in [0, 1]: a smooth bump around the hotspot plus noise.
fn intensity(x: f64, y: f64, extent: (f64, f64), rng: &mut StdRng) -> f64 {
    let hx = DEMO.hotspot.0 * extent.0;
    let hy = DEMO.hotspot.1 * extent.1;
    let sigma = 0.25 * extent.0.max(extent.1);
    let d2 = (x - hx).powi(2) + (y - hy).powi(2);
    let base = 0.1 + 0.8 * (-d2 / (2.0 * sigma * sigma)).exp();
    (base + rng.gen_range(-0.05..0.05)).clamp(0.0, 1.0)
}

fn observation(source: SensorId, timestamp_ms: i64, level: f64) -> FeatureVector {
    FeatureVector {
        source,
        timestamp_ms,
        spatial: SpatialFeatures {
            pedestrian_count: (60.0 * level).round(),
            vehicle_count: (25.0 * level).round(),
            crowd_density: 0.8 * level,
            obstacle_density: 0.5 * level,
        },
        visual: VisualFeatures {
            edge_density: 0.2 + 0.6 * level,
            color_entropy: 3.0 + 4.0 * level,
            clutter: 0.7 * level,
            brightness: 0.9 - 0.5 * level,
        },
        temporal: Some(TemporalFeatures {
            motion_intensity: 0.9 * level,
            flow_variability: 0.4 * level,
        }),
        embedding: None,
        scene_label: None,
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let dir = PathBuf::from(DEMO.outputs.directory);
    let extent = (
        (DEMO.lattice_cols - 1) as f64 * DEMO.block_m,
        (DEMO.lattice_rows - 1) as f64 * DEMO.block_m,
    );
    log::info!(
        "Building a {}x{} block corridor ({:.0} m x {:.0} m) into {:?}",
        DEMO.lattice_cols,
        DEMO.lattice_rows,
        extent.0,
        extent.1,
        dir
    );

    // 1. Cameras on a regular grid, centred in their cells
    let n = DEMO.cameras_per_side;
    let sensors: Vec<Sensor> = (0..n * n)
        .map(|i| {
            let (col, row) = (i % n, i / n);
            Sensor::new(
                i as u64 + 1,
                (col as f64 + 0.5) * extent.0 / n as f64,
                (row as f64 + 0.5) * extent.1 / n as f64,
            )
        })
        .collect();
    let manifest = SensorManifest::planar_rect(sensors.clone(), [0.0, 0.0], [extent.0, extent.1]);
    save_json(&dir.join(DEMO.outputs.manifest), &manifest)?;

    // 2. Street lattice
    let graph = GraphSpec::lattice(DEMO.lattice_cols, DEMO.lattice_rows, DEMO.block_m);
    save_json(&dir.join(DEMO.outputs.graph), &graph)?;

    // 3. Feature stream, interleaved across cameras like a live feed
    let mut rng = StdRng::seed_from_u64(DEMO.seed);
    let path = dir.join(DEMO.outputs.features);
    let file = File::create(&path).with_context(|| format!("creating {:?}", path))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0usize;
    for step in 0..DEMO.records_per_camera {
        for s in &sensors {
            let level = intensity(s.x, s.y, extent, &mut rng);
            let fv = observation(s.id, START_MS + step as i64 * STEP_MS, level);
            serde_json::to_writer(&mut writer, &fv)?;
            writeln!(writer)?;
            written += 1;
        }
    }
    writer.flush()?;

    log::info!(
        "Wrote {} cameras, {} nodes, {} edges and {} feature records",
        sensors.len(),
        graph.nodes.len(),
        graph.edges.len(),
        written
    );
    log::info!(
        "Try: stress-router train --manifest {0}/{1} --graph {0}/{2} --features {0}/{3} --promote",
        DEMO.outputs.directory,
        DEMO.outputs.manifest,
        DEMO.outputs.graph,
        DEMO.outputs.features
    );
    Ok(())
}
