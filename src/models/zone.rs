use geo::{Coord, MultiPolygon};
use serde::{Deserialize, Serialize};

use crate::domain::{SensorId, ZoneId};

/// One cell of the sensor tessellation, in projected coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    /// The sensor whose observations describe this zone.
    pub sensor: SensorId,
    pub site: Coord,
    /// Voronoi cell clipped to the corridor. A concave corridor can split a cell in two.
    pub polygon: MultiPolygon<f64>,
    pub centroid: Coord,
    pub area_m2: f64,
    /// Coincident sensors merged into this zone.
    pub aliases: Vec<SensorId>,
}

impl Zone {
    pub fn covers_sensor(&self, id: SensorId) -> bool {
        self.sensor == id || self.aliases.contains(&id)
    }
}
