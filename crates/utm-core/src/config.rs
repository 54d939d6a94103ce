//! Operational parameters and airspace data for the UTM core.

use serde::{Deserialize, Serialize};

use crate::geo::BoundingBox;
use crate::geofence::{Zone, ZoneKind};

/// Configuration for the whole core: grid and time discretization,
/// separation minima, vehicle performance, altitude lanes, airspace zones
/// and resolver limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtmConfig {
    /// Horizontal grid cell side in meters.
    pub grid_resolution_m: f64,
    /// Planner and detector time step in seconds.
    pub time_resolution_s: f64,
    /// Minimum horizontal separation in meters.
    pub horizontal_separation_m: f64,
    /// Minimum vertical separation in meters.
    pub vertical_separation_m: f64,
    /// Hard vehicle speed limit in m/s.
    pub drone_max_speed_mps: f64,
    /// Commanded cruise speed in m/s.
    pub drone_cruise_speed_mps: f64,
    /// Minimum allowed altitude in meters.
    pub min_altitude_m: f64,
    /// Maximum allowed altitude in meters.
    pub max_altitude_m: f64,
    /// Altitude lanes for north/south-bound traffic.
    pub north_south_lanes_m: Vec<f64>,
    /// Altitude lanes for east/west-bound traffic.
    pub east_west_lanes_m: Vec<f64>,
    /// Geographic boundary outside which no planning occurs.
    pub operational_bounds: BoundingBox,
    /// Static airspace constraints, prohibited and cost-weighted.
    pub zones: Vec<Zone>,
    /// Upper bound on A* node expansions per search.
    pub max_expansions: usize,
    /// Maximum dynamic-replan attempts in the resolver.
    pub max_resolve_retries: u32,
    /// Lower bound for the speed-damping factor.
    pub speed_min_ratio: f64,
    /// Initial soft penalty (meter-equivalent) for nodes near committed
    /// traffic; doubled on each replan retry.
    pub dynamic_penalty_m: f64,
    /// Overall per-request deadline in seconds.
    pub request_deadline_s: f64,
    /// Ground dwell at the pickup between the repositioning and carrying
    /// legs, in seconds.
    pub pickup_dwell_s: f64,
}

impl Default for UtmConfig {
    /// Defaults for the San Francisco proof-of-concept operational area.
    fn default() -> Self {
        Self {
            grid_resolution_m: 50.0,
            time_resolution_s: 5.0,
            horizontal_separation_m: 30.0,
            vertical_separation_m: 15.0,
            drone_max_speed_mps: 15.0,
            drone_cruise_speed_mps: 10.0,
            min_altitude_m: 20.0,
            max_altitude_m: 120.0,
            north_south_lanes_m: vec![50.0, 90.0],
            east_west_lanes_m: vec![30.0, 70.0, 110.0],
            operational_bounds: BoundingBox::new(37.60, 37.80, -122.45, -122.35),
            zones: default_zones(),
            max_expansions: 200_000,
            max_resolve_retries: 3,
            speed_min_ratio: 0.3,
            dynamic_penalty_m: 400.0,
            request_deadline_s: 5.0,
            pickup_dwell_s: 30.0,
        }
    }
}

impl UtmConfig {
    /// Union of both direction classes' lane sets, ascending.
    pub fn all_lanes(&self) -> Vec<f64> {
        let mut lanes: Vec<f64> = self
            .north_south_lanes_m
            .iter()
            .chain(self.east_west_lanes_m.iter())
            .copied()
            .collect();
        lanes.sort_by(f64::total_cmp);
        lanes.dedup_by(|a, b| (*a - *b).abs() < 0.5);
        lanes
    }
}

fn default_zones() -> Vec<Zone> {
    vec![
        Zone {
            name: "Airport Restricted Airspace".to_string(),
            bounds: BoundingBox::new(37.6000, 37.6250, -122.3850, -122.3720),
            kind: ZoneKind::NoFly,
        },
        Zone {
            name: "Military Base".to_string(),
            bounds: BoundingBox::new(37.7650, 37.7850, -122.4100, -122.3900),
            kind: ZoneKind::NoFly,
        },
        Zone {
            name: "Elementary School Zone".to_string(),
            bounds: BoundingBox::new(37.7650, 37.7700, -122.4350, -122.4300),
            kind: ZoneKind::Sensitive { multiplier: 5.0 },
        },
        Zone {
            name: "Hospital Complex".to_string(),
            bounds: BoundingBox::new(37.7500, 37.7550, -122.4050, -122.4000),
            kind: ZoneKind::Sensitive { multiplier: 4.0 },
        },
        Zone {
            name: "Residential High Density".to_string(),
            bounds: BoundingBox::new(37.7300, 37.7400, -122.4200, -122.4100),
            kind: ZoneKind::Sensitive { multiplier: 2.0 },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = UtmConfig::default();
        assert!(config.drone_cruise_speed_mps <= config.drone_max_speed_mps);
        for lane in config.all_lanes() {
            assert!(lane >= config.min_altitude_m && lane <= config.max_altitude_m);
        }
        for zone in &config.zones {
            assert!(zone.bounds.min_lat < zone.bounds.max_lat);
            assert!(zone.bounds.min_lon < zone.bounds.max_lon);
        }
    }

    #[test]
    fn cardinal_step_is_cruise_feasible() {
        let config = UtmConfig::default();
        let step_speed = config.grid_resolution_m / config.time_resolution_s;
        assert!(step_speed <= config.drone_max_speed_mps);
        let diagonal_speed = step_speed * std::f64::consts::SQRT_2;
        assert!(diagonal_speed <= config.drone_max_speed_mps);
    }
}
