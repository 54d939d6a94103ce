//! UTM core - pure planning, geofencing and conflict-detection logic
//!
//! This crate contains the domain models and airspace algorithms with no
//! I/O and no async runtime. The stateful service layer lives in
//! `utm-service`.

pub mod config;
pub mod conflict;
pub mod error;
pub mod geo;
pub mod geofence;
pub mod models;
pub mod planner;

pub use config::UtmConfig;
pub use conflict::{Conflict, ConflictDetector, ConflictSeverity};
pub use error::PlanError;
pub use geofence::{GeofenceIndex, Zone, ZoneKind};
pub use models::{
    Mission, MissionId, MissionPhase, Point4D, Position, Trajectory, Vehicle, VehicleId,
    VehicleState, Waypoint,
};
pub use planner::{DirectionClass, PlanConstraints, Planner};
