use {
    crate::config::{DF, PERSISTENCE, model_registry_filename},
    crate::models::{LearnedModel, ModelRegistry},
    anyhow::{Context, Result, bail},
    serde::{Deserialize, Serialize},
    std::fs::File,
    std::io::{BufReader, BufWriter},
    std::path::{Path, PathBuf},
};

/// On-disk wrapper so an old file is refused rather than misread.
#[derive(Serialize, Deserialize)]
struct RegistryFile {
    format_version: u32,
    registry: ModelRegistry,
}

/// Registry location inside `dir`, or inside the default model directory.
pub fn registry_path(dir: Option<&Path>) -> PathBuf {
    dir.unwrap_or_else(|| Path::new(PERSISTENCE.model.directory))
        .join(model_registry_filename())
}

pub fn save_registry(path: &Path, registry: &ModelRegistry) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating model directory {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let writer = BufWriter::new(file);
    let envelope = RegistryFile {
        format_version: PERSISTENCE.model.version,
        registry: registry.clone(),
    };
    bincode::serialize_into(writer, &envelope)
        .with_context(|| format!("writing model registry {:?}", path))?;
    if DF.log_registry {
        log::info!(
            "Saved {} model(s) to {:?} (deployed: {:?})",
            registry.len(),
            path,
            registry.deployed_version()
        );
    }
    Ok(())
}

/// Loads the registry, or starts an empty one when the file does not exist yet.
pub fn load_registry(path: &Path) -> Result<ModelRegistry> {
    if !path.exists() {
        return Ok(ModelRegistry::new());
    }
    let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let reader = BufReader::new(file);
    let envelope: RegistryFile = bincode::deserialize_from(reader)
        .with_context(|| format!("decoding model registry {:?}", path))?;
    if envelope.format_version != PERSISTENCE.model.version {
        bail!(
            "model registry {:?} has format v{}, this build reads v{}",
            path,
            envelope.format_version,
            PERSISTENCE.model.version
        );
    }
    if DF.log_registry {
        log::info!(
            "Loaded {} model(s) from {:?} (deployed: {:?})",
            envelope.registry.len(),
            path,
            envelope.registry.deployed_version()
        );
    }
    Ok(envelope.registry)
}

/// Single model as JSON, for inspection or hand-off to another deployment.
pub fn export_model_json(path: &Path, model: &LearnedModel) -> Result<()> {
    super::manifest_io::save_json(path, model)
}

pub fn import_model_json(path: &Path) -> Result<LearnedModel> {
    let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let model: LearnedModel = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing model {:?}", path))?;
    model.validate()?;
    Ok(model)
}
