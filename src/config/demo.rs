/// Where the synthetic corridor lands.
pub struct DemoOutputs {
    pub directory: &'static str,
    pub manifest: &'static str,
    pub graph: &'static str,
    pub features: &'static str,
}

/// Synthetic corridor used by `make_demo_corridor`.
pub struct DemoConfig {
    /// Street lattice size (intersections per side).
    pub lattice_cols: usize,
    pub lattice_rows: usize,
    pub block_m: f64,
    /// Cameras per side of the square camera grid.
    pub cameras_per_side: usize,
    pub records_per_camera: usize,
    /// Stress hotspot centre as a fraction of the corridor extent.
    pub hotspot: (f64, f64),
    pub seed: u64,
    pub outputs: DemoOutputs,
}

pub const DEMO: DemoConfig = DemoConfig {
    lattice_cols: 12,
    lattice_rows: 12,
    block_m: 50.0,
    cameras_per_side: 4,
    records_per_camera: 60,
    hotspot: (0.5, 0.5),
    seed: 42,
    outputs: DemoOutputs {
        directory: "demo_data",
        manifest: "manifest.json",
        graph: "graph.json",
        features: "features.jsonl",
    },
};
