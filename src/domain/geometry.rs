use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::config::CoordinateSystem;

/// Mean Earth radius (IUGG), metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Flattens input coordinates into a local metric plane.
///
/// Corridors span a few kilometres at most, so an equirectangular projection
/// about the corridor centre keeps distortion well under a percent. Planar
/// input passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LocalProjection {
    Identity,
    Equirectangular { lon0: f64, lat0: f64, cos_lat0: f64 },
}

impl LocalProjection {
    pub fn for_system(system: CoordinateSystem, origin: Coord) -> Self {
        match system {
            CoordinateSystem::Planar => LocalProjection::Identity,
            CoordinateSystem::Geographic => LocalProjection::Equirectangular {
                lon0: origin.x,
                lat0: origin.y,
                cos_lat0: origin.y.to_radians().cos(),
            },
        }
    }

    pub fn project(&self, c: Coord) -> Coord {
        match *self {
            LocalProjection::Identity => c,
            LocalProjection::Equirectangular {
                lon0,
                lat0,
                cos_lat0,
            } => Coord {
                x: (c.x - lon0).to_radians() * EARTH_RADIUS_M * cos_lat0,
                y: (c.y - lat0).to_radians() * EARTH_RADIUS_M,
            },
        }
    }

    pub fn unproject(&self, c: Coord) -> Coord {
        match *self {
            LocalProjection::Identity => c,
            LocalProjection::Equirectangular {
                lon0,
                lat0,
                cos_lat0,
            } => Coord {
                x: lon0 + (c.x / (EARTH_RADIUS_M * cos_lat0)).to_degrees(),
                y: lat0 + (c.y / EARTH_RADIUS_M).to_degrees(),
            },
        }
    }
}

#[inline]
pub fn distance_2(a: Coord, b: Coord) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

#[inline]
pub fn euclidean(a: Coord, b: Coord) -> f64 {
    distance_2(a, b).sqrt()
}

#[inline]
pub fn manhattan(a: Coord, b: Coord) -> f64 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}

#[inline]
pub fn is_finite_coord(c: Coord) -> bool {
    c.x.is_finite() && c.y.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equirectangular_round_trips() {
        let proj = LocalProjection::for_system(
            CoordinateSystem::Geographic,
            Coord { x: -3.70, y: 40.42 },
        );
        let p = Coord { x: -3.69, y: 40.43 };
        let back = proj.unproject(proj.project(p));
        assert!((back.x - p.x).abs() < 1e-12);
        assert!((back.y - p.y).abs() < 1e-12);
    }

    #[test]
    fn one_millidegree_of_latitude_is_about_111_metres() {
        let proj =
            LocalProjection::for_system(CoordinateSystem::Geographic, Coord { x: 0.0, y: 0.0 });
        let p = proj.project(Coord { x: 0.0, y: 0.001 });
        assert!((p.y - 111.19).abs() < 0.1, "got {}", p.y);
    }
}
