use geo::Coord;
use serde::{Deserialize, Serialize};

use super::SensorId;
use crate::config::CoordinateSystem;

/// One camera position from the manifest, in manifest coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,
    pub x: f64,
    pub y: f64,
}

impl Sensor {
    pub fn new(id: u64, x: f64, y: f64) -> Self {
        Self {
            id: SensorId(id),
            x,
            y,
        }
    }

    pub fn coord(&self) -> Coord {
        Coord {
            x: self.x,
            y: self.y,
        }
    }
}

/// Sensor manifest: camera positions plus the corridor boundary ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorManifest {
    #[serde(default)]
    pub coordinates: CoordinateSystem,
    pub sensors: Vec<Sensor>,
    /// Exterior ring of the corridor polygon. Closing the ring is optional.
    pub boundary: Vec<[f64; 2]>,
}

impl SensorManifest {
    pub fn planar(sensors: Vec<Sensor>, boundary: Vec<[f64; 2]>) -> Self {
        Self {
            coordinates: CoordinateSystem::Planar,
            sensors,
            boundary,
        }
    }

    /// Axis-aligned rectangular corridor, handy for synthetic layouts.
    pub fn planar_rect(sensors: Vec<Sensor>, min: [f64; 2], max: [f64; 2]) -> Self {
        Self::planar(
            sensors,
            vec![
                [min[0], min[1]],
                [max[0], min[1]],
                [max[0], max[1]],
                [min[0], max[1]],
            ],
        )
    }

    pub fn boundary_coords(&self) -> Vec<Coord> {
        self.boundary
            .iter()
            .map(|p| Coord { x: p[0], y: p[1] })
            .collect()
    }
}
