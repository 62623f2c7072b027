// Domain types and value objects
mod feature_vector;
mod geometry;
mod graph;
mod ids;
mod sensor;

pub use feature_vector::{
    FEATURE_DIM, FEATURE_NAMES, FEATURE_RANGES, FeatureVector, STRESS_PROXY_SCALE,
    STRESS_PROXY_WEIGHTS, SpatialFeatures, TemporalFeatures, VisualFeatures,
};
pub use geometry::{LocalProjection, distance_2, euclidean, is_finite_coord, manhattan};
pub use graph::{Arc, EdgeSpec, GraphSpec, IntersectionNode, NodeSpec, StreetEdge, StreetGraph};
pub use ids::{NodeId, SensorId, ZoneId};
pub use sensor::{Sensor, SensorManifest};

#[cfg(test)]
pub(crate) use feature_vector::fixtures;
