//! Request-level error types surfaced through the service API.

use thiserror::Error;
use utm_core::models::{MissionId, MissionPhase, VehicleId};
use utm_core::PlanError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// Pickup or delivery outside the operational bounds or inside a
    /// no-fly zone. Reported at intake, before any state changes.
    #[error("pickup or delivery lies outside the operational area or in prohibited airspace")]
    OutOfBounds,
    /// No idle vehicle at request time; the client may retry.
    #[error("no idle vehicle is available")]
    NoVehicle,
    /// The planner exhausted its budget or proved no path exists.
    #[error("no route could be planned: {0}")]
    Unroutable(PlanError),
    /// Conflicts remained after every resolution strategy.
    #[error("conflicts remained after all resolution attempts")]
    ResolutionFailed,
    /// The request exceeded its overall deadline.
    #[error("request exceeded its {0:.1}s deadline")]
    Timeout(f64),
    #[error("vehicle {0} is not registered")]
    UnknownVehicle(VehicleId),
    #[error("mission {0} is not known")]
    UnknownMission(MissionId),
    #[error("illegal mission phase transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: MissionPhase,
        to: MissionPhase,
    },
}
