//! Core data models for the UTM system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::haversine_distance;

/// Integer vehicle identifier. Trajectories and missions refer to vehicles
/// by id only, never by reference.
pub type VehicleId = u32;

/// Mission identifier (UUID string).
pub type MissionId = String;

/// 3D position: WGS-84 degrees, altitude in meters above ground level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64, alt_m: f64) -> Self {
        Self { lat, lon, alt_m }
    }

    pub fn horizontal_distance_to(&self, other: &Position) -> f64 {
        haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

/// A position stamped with time, in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point4D {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
    pub t_s: f64,
}

impl Point4D {
    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lon, self.alt_m)
    }
}

/// A trajectory waypoint: a 4D point plus the commanded speed on the
/// segment departing it. The final waypoint of a trajectory has speed 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
    pub t_s: f64,
    pub speed_mps: f64,
}

impl Waypoint {
    pub fn point(&self) -> Point4D {
        Point4D {
            lat: self.lat,
            lon: self.lon,
            alt_m: self.alt_m,
            t_s: self.t_s,
        }
    }
}

/// An ordered sequence of waypoints with strictly increasing times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub waypoints: Vec<Waypoint>,
}

impl Trajectory {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        debug_assert!(
            waypoints.windows(2).all(|w| w[0].t_s < w[1].t_s),
            "waypoint times must be strictly increasing"
        );
        Self { waypoints }
    }

    pub fn start_time(&self) -> f64 {
        self.waypoints.first().map(|w| w.t_s).unwrap_or(0.0)
    }

    pub fn end_time(&self) -> f64 {
        self.waypoints.last().map(|w| w.t_s).unwrap_or(0.0)
    }

    pub fn duration_s(&self) -> f64 {
        self.end_time() - self.start_time()
    }

    /// Total horizontal path length in meters.
    pub fn total_distance_m(&self) -> f64 {
        self.waypoints
            .windows(2)
            .map(|w| haversine_distance(w[0].lat, w[0].lon, w[1].lat, w[1].lon))
            .sum()
    }

    /// Whether this trajectory's time span overlaps `[t_start, t_end]`.
    pub fn overlaps(&self, t_start: f64, t_end: f64) -> bool {
        !self.waypoints.is_empty() && self.start_time() <= t_end && self.end_time() >= t_start
    }

    /// Linearly interpolated position at time `t_s`, or `None` outside the
    /// trajectory's time span. Binary search keeps this cheap inside the
    /// planner's dynamic-obstacle loop.
    pub fn position_at(&self, t_s: f64) -> Option<Point4D> {
        let first = self.waypoints.first()?;
        let last = self.waypoints.last()?;
        if t_s < first.t_s || t_s > last.t_s {
            return None;
        }
        let idx = self.waypoints.partition_point(|wp| wp.t_s <= t_s);
        if idx == self.waypoints.len() {
            return Some(last.point());
        }
        let a = &self.waypoints[idx - 1];
        let b = &self.waypoints[idx];
        let span = b.t_s - a.t_s;
        let ratio = if span > 0.0 { (t_s - a.t_s) / span } else { 0.0 };
        Some(Point4D {
            lat: a.lat + ratio * (b.lat - a.lat),
            lon: a.lon + ratio * (b.lon - a.lon),
            alt_m: a.alt_m + ratio * (b.alt_m - a.alt_m),
            t_s,
        })
    }
}

/// Operational state of a vehicle. Only `Idle` vehicles are assignable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    Idle,
    Assigned,
    InFlight,
    Returning,
    Unavailable,
}

/// A fleet vehicle. State is owned by the trajectory store and changes only
/// through committer operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub state: VehicleState,
    pub position: Position,
    pub battery_pct: f64,
    pub current_mission: Option<MissionId>,
    pub last_update: DateTime<Utc>,
}

/// Mission lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPhase {
    Planned,
    EnRoutePickup,
    Carrying,
    Delivered,
    Failed,
}

impl MissionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionPhase::Delivered | MissionPhase::Failed)
    }

    /// Legal forward transitions: the linear delivery sequence, with `Failed`
    /// reachable from any non-terminal phase.
    pub fn can_transition_to(&self, next: MissionPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            MissionPhase::Failed => true,
            MissionPhase::EnRoutePickup => *self == MissionPhase::Planned,
            MissionPhase::Carrying => *self == MissionPhase::EnRoutePickup,
            MissionPhase::Delivered => *self == MissionPhase::Carrying,
            MissionPhase::Planned => false,
        }
    }
}

/// A committed delivery mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub vehicle_id: VehicleId,
    pub pickup: Position,
    pub delivery: Position,
    pub trajectory: Trajectory,
    pub phase: MissionPhase,
    pub created_at: DateTime<Utc>,
}
