use {
    crate::config::AnalysisConfig,
    crate::domain::{GraphSpec, SensorManifest, ZoneId},
    anyhow::{Context, Result, bail},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    std::collections::BTreeMap,
    std::fs::File,
    std::io::{BufReader, BufWriter},
    std::path::Path,
};

/// One externally calibrated zone label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneLabel {
    pub zone: ZoneId,
    pub stress: f64,
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {} {:?}", what, path))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).with_context(|| format!("parsing {} {:?}", what, path))
}

pub fn load_manifest(path: &Path) -> Result<SensorManifest> {
    read_json(path, "sensor manifest")
}

pub fn load_graph_spec(path: &Path) -> Result<GraphSpec> {
    read_json(path, "street graph")
}

pub fn load_config(path: &Path) -> Result<AnalysisConfig> {
    let config: AnalysisConfig = read_json(path, "analysis config")?;
    config
        .validate()
        .with_context(|| format!("checking analysis config {:?}", path))?;
    Ok(config)
}

/// Reads `[{ "zone": 3, "stress": 4.2 }, ...]`. A zone listed twice is an error.
pub fn load_labels(path: &Path) -> Result<BTreeMap<ZoneId, f64>> {
    let labels: Vec<ZoneLabel> = read_json(path, "zone labels")?;
    let mut out = BTreeMap::new();
    for label in labels {
        if !label.stress.is_finite() {
            bail!("zone {} has non-finite label {}", label.zone, label.stress);
        }
        if out.insert(label.zone, label.stress).is_some() {
            bail!("zone {} labelled more than once in {:?}", label.zone, path);
        }
    }
    Ok(out)
}

/// Pretty-printed JSON, creating parent directories as needed.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value).with_context(|| format!("writing {:?}", path))?;
    Ok(())
}
