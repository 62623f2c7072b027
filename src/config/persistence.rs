//! File persistence and serialization configuration

/// Configuration for learned-model persistence
pub struct ModelPersistenceConfig {
    /// Directory for registry files
    pub directory: &'static str,
    /// Base filename for registry files (without extension)
    pub filename_base: &'static str,
    /// Current version of the registry serialization format
    pub version: u32,
}

/// The Master Persistence Configuration
pub struct PersistenceConfig {
    pub model: ModelPersistenceConfig,
}

pub const PERSISTENCE: PersistenceConfig = PersistenceConfig {
    model: ModelPersistenceConfig {
        directory: "model_data",
        filename_base: "stress_models",
        version: 1,
    },
};

/// Default registry filename.
/// Example: "stress_models_v1.bin"
pub fn model_registry_filename() -> String {
    format!(
        "{}_v{}.bin",
        PERSISTENCE.model.filename_base, PERSISTENCE.model.version
    )
}
