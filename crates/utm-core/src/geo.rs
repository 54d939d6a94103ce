//! Spatial math for planning and conflict detection.

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate distance between two points in meters using the Haversine formula.
///
/// Every horizontal-distance comparison in the system goes through this
/// function so that planner costs, separation checks and vehicle assignment
/// all agree on what "distance" means.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Vertical separation between two altitudes in meters.
pub fn vertical_distance(alt1_m: f64, alt2_m: f64) -> f64 {
    (alt1_m - alt2_m).abs()
}

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Axis-aligned latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Containment inclusive of the rectangle boundary.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// Centroid as (lat, lon), the reference point for degree/meter scaling.
    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Whether the straight segment between two (lat, lon) points touches
    /// the rectangle, boundary included. Slab clipping in coordinate space,
    /// exact for the axis-aligned zones this system uses.
    pub fn intersects_segment(&self, from: (f64, f64), to: (f64, f64)) -> bool {
        let mut t_min = 0.0f64;
        let mut t_max = 1.0f64;
        for (start, delta, lo, hi) in [
            (from.0, to.0 - from.0, self.min_lat, self.max_lat),
            (from.1, to.1 - from.1, self.min_lon, self.max_lon),
        ] {
            if delta.abs() < f64::EPSILON {
                if start < lo || start > hi {
                    return false;
                }
            } else {
                let mut t0 = (lo - start) / delta;
                let mut t1 = (hi - start) / delta;
                if t0 > t1 {
                    std::mem::swap(&mut t0, &mut t1);
                }
                t_min = t_min.max(t0);
                t_max = t_max.min(t1);
                if t_min > t_max {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn haversine_same_point() {
        let dist = haversine_distance(37.7749, -122.4194, 37.7749, -122.4194);
        assert!(dist < 0.001);
    }

    #[test]
    fn bbox_contains_boundary() {
        let bbox = BoundingBox::new(37.60, 37.80, -122.45, -122.35);
        assert!(bbox.contains(37.60, -122.45));
        assert!(bbox.contains(37.70, -122.40));
        assert!(!bbox.contains(37.59, -122.40));
        assert!(!bbox.contains(37.70, -122.34));
    }

    #[test]
    fn segment_intersection_catches_corner_clips() {
        let bbox = BoundingBox::new(37.70, 37.72, -122.42, -122.40);
        // Straight through.
        assert!(bbox.intersects_segment((37.69, -122.41), (37.73, -122.41)));
        // Diagonal clipping the north-east corner with both ends outside.
        assert!(bbox.intersects_segment((37.725, -122.405), (37.715, -122.395)));
        // Passing just outside that corner.
        assert!(!bbox.intersects_segment((37.725, -122.3995), (37.721, -122.395)));
        // Fully inside.
        assert!(bbox.intersects_segment((37.705, -122.415), (37.715, -122.405)));
        // Degenerate segment outside.
        assert!(!bbox.intersects_segment((37.69, -122.41), (37.69, -122.41)));
    }
}
