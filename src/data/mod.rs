mod feature_source;
mod manifest_io;
mod model_io;

pub use {
    feature_source::{FeatureSource, JsonlFeatureSource, SourceBatch, VecFeatureSource, drain_into},
    manifest_io::{ZoneLabel, load_config, load_graph_spec, load_labels, load_manifest, save_json},
    model_io::{export_model_json, import_model_json, load_registry, registry_path, save_registry},
};
