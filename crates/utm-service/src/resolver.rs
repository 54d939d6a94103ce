//! Conflict resolution and mission commit.
//!
//! One delivery request runs through a bounded loop: reserve the nearest
//! idle vehicle, plan, detect conflicts against the committed set, and if
//! any remain apply the resolution ladder - altitude re-stratification
//! (once), speed damping (once), then dynamic replans with an escalating
//! soft penalty. Planning and detection run against snapshots; the commit
//! itself revalidates inside the store's critical section and restarts the
//! loop at most once if newer traffic invalidated the candidate.

use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use utm_core::models::{Mission, MissionPhase, Position, Trajectory, Vehicle};
use utm_core::{Conflict, ConflictDetector, GeofenceIndex, PlanConstraints, PlanError, Planner, UtmConfig};

use crate::error::RequestError;
use crate::events::{EventBus, UtmEvent};
use crate::store::TrajectoryStore;

enum CommitOutcome {
    Committed(Mission),
    Invalidated,
}

pub struct Resolver<'a> {
    config: &'a UtmConfig,
    geofence: &'a GeofenceIndex,
    store: &'a TrajectoryStore,
    events: &'a EventBus,
}

impl<'a> Resolver<'a> {
    pub fn new(
        config: &'a UtmConfig,
        geofence: &'a GeofenceIndex,
        store: &'a TrajectoryStore,
        events: &'a EventBus,
    ) -> Self {
        Self {
            config,
            geofence,
            store,
            events,
        }
    }

    /// Handle one delivery request end to end. On any non-success exit the
    /// provisional vehicle reservation is released and no state survives.
    pub fn submit(
        &self,
        pickup: Position,
        delivery: Position,
        t0_s: f64,
    ) -> Result<Mission, RequestError> {
        self.validate_endpoints(&pickup, &delivery)?;
        let vehicle = self
            .store
            .reserve_nearest_idle(&pickup)
            .ok_or(RequestError::NoVehicle)?;
        let result = self.resolve(&vehicle, pickup, delivery, t0_s);
        if result.is_err() {
            self.store.release_reservation(vehicle.id);
        }
        result
    }

    fn validate_endpoints(
        &self,
        pickup: &Position,
        delivery: &Position,
    ) -> Result<(), RequestError> {
        let bounds = &self.config.operational_bounds;
        for point in [pickup, delivery] {
            if !bounds.contains(point.lat, point.lon)
                || self.geofence.is_no_fly(point.lat, point.lon)
            {
                return Err(RequestError::OutOfBounds);
            }
        }
        Ok(())
    }

    fn resolve(
        &self,
        vehicle: &Vehicle,
        pickup: Position,
        delivery: Position,
        t0_s: f64,
    ) -> Result<Mission, RequestError> {
        let deadline = Instant::now() + Duration::from_secs_f64(self.config.request_deadline_s);
        let mission_id = Uuid::new_v4().to_string();
        let detector = ConflictDetector::new(self.config);

        let mut forbidden_lanes: Vec<f64> = Vec::new();
        let mut trajectory = self
            .plan_mission(vehicle, &pickup, &delivery, t0_s, &forbidden_lanes, &[], 0.0)
            .map_err(RequestError::Unroutable)?;

        let mut altitude_tried = false;
        let mut damping_tried = false;
        let mut replans = 0u32;
        let mut penalty = self.config.dynamic_penalty_m;
        let mut commit_restarts = 0u32;
        let mut conflicts_seen = 0usize;

        loop {
            if Instant::now() > deadline {
                return Err(RequestError::Timeout(self.config.request_deadline_s));
            }

            let active = self
                .store
                .active_between(trajectory.start_time(), trajectory.end_time());
            let conflicts = detector.detect(
                &mission_id,
                &trajectory,
                active.iter().map(|m| (m.id.as_str(), &m.trajectory)),
            );

            if conflicts.is_empty() {
                match self.try_commit(&detector, &mission_id, vehicle, &pickup, &delivery, &trajectory)? {
                    CommitOutcome::Committed(mission) => {
                        if conflicts_seen > 0 {
                            self.store.note_conflicts_resolved(conflicts_seen);
                        }
                        return Ok(mission);
                    }
                    CommitOutcome::Invalidated => {
                        commit_restarts += 1;
                        if commit_restarts > 1 {
                            return Err(RequestError::ResolutionFailed);
                        }
                        tracing::debug!(
                            mission_id = %mission_id,
                            "commit invalidated by newer traffic, restarting"
                        );
                        continue;
                    }
                }
            }

            self.store.note_conflicts_detected(conflicts.len());
            conflicts_seen += conflicts.len();
            for conflict in &conflicts {
                self.events.publish(UtmEvent::ConflictDetected {
                    conflict: conflict.clone(),
                });
            }
            tracing::info!(
                mission_id = %mission_id,
                conflicts = conflicts.len(),
                altitude_tried,
                damping_tried,
                replans,
                "resolving conflicts"
            );

            if !altitude_tried {
                altitude_tried = true;
                if let Some(replanned) = self.restratify(
                    vehicle,
                    &pickup,
                    &delivery,
                    t0_s,
                    &mut forbidden_lanes,
                    &trajectory,
                    &conflicts,
                ) {
                    trajectory = replanned;
                    continue;
                }
            }

            if !damping_tried {
                damping_tried = true;
                if let Some(damped) = self.damp(&trajectory, &conflicts) {
                    trajectory = damped;
                    continue;
                }
            }

            if replans < self.config.max_resolve_retries {
                replans += 1;
                let obstacles: Vec<Trajectory> =
                    active.into_iter().map(|m| m.trajectory).collect();
                match self.plan_mission(
                    vehicle,
                    &pickup,
                    &delivery,
                    t0_s,
                    &forbidden_lanes,
                    &obstacles,
                    penalty,
                ) {
                    Ok(replanned) => {
                        trajectory = replanned;
                    }
                    Err(err) => {
                        tracing::warn!(mission_id = %mission_id, error = %err, "dynamic replan failed");
                    }
                }
                penalty *= 2.0;
                continue;
            }

            return Err(RequestError::ResolutionFailed);
        }
    }

    /// The commit critical section of the optimistic pipeline: re-read the
    /// active set, re-run detection against the latest snapshot, then
    /// either commit atomically or report the candidate invalidated.
    fn try_commit(
        &self,
        detector: &ConflictDetector<'_>,
        mission_id: &str,
        vehicle: &Vehicle,
        pickup: &Position,
        delivery: &Position,
        trajectory: &Trajectory,
    ) -> Result<CommitOutcome, RequestError> {
        let guard = self.store.lock_commits();
        let active = self
            .store
            .active_between(trajectory.start_time(), trajectory.end_time());
        let conflicts = detector.detect(
            mission_id,
            trajectory,
            active.iter().map(|m| (m.id.as_str(), &m.trajectory)),
        );
        if !conflicts.is_empty() {
            drop(guard);
            self.store.note_conflicts_detected(conflicts.len());
            return Ok(CommitOutcome::Invalidated);
        }

        let mission = Mission {
            id: mission_id.to_string(),
            vehicle_id: vehicle.id,
            pickup: *pickup,
            delivery: *delivery,
            trajectory: trajectory.clone(),
            phase: MissionPhase::Planned,
            created_at: Utc::now(),
        };
        self.store.insert(&guard, mission.clone())?;
        drop(guard);

        tracing::info!(
            mission_id = %mission.id,
            vehicle_id = mission.vehicle_id,
            distance_m = mission.trajectory.total_distance_m(),
            duration_s = mission.trajectory.duration_s(),
            "mission committed"
        );
        self.events.publish(UtmEvent::MissionCreated {
            mission: mission.clone(),
        });
        Ok(CommitOutcome::Committed(mission))
    }

    /// Plan the full mission trajectory: a repositioning leg from the
    /// vehicle to the pickup (skipped when the vehicle already sits there),
    /// a ground dwell for loading, then the carrying leg to the delivery.
    fn plan_mission(
        &self,
        vehicle: &Vehicle,
        pickup: &Position,
        delivery: &Position,
        t0_s: f64,
        forbidden_lanes: &[f64],
        obstacles: &[Trajectory],
        penalty_m: f64,
    ) -> Result<Trajectory, PlanError> {
        let planner = Planner::new(self.config, self.geofence);
        let constraints = PlanConstraints {
            forbidden_lanes,
            obstacles,
            penalty_m,
        };

        let mut waypoints = Vec::new();
        let mut depart = t0_s;
        let at_pickup =
            vehicle.position.lat == pickup.lat && vehicle.position.lon == pickup.lon;
        if !at_pickup {
            let leg = planner.plan(vehicle.position, *pickup, depart, &constraints)?;
            depart = leg.end_time() + self.config.pickup_dwell_s.max(self.config.time_resolution_s);
            waypoints.extend(leg.waypoints);
        }
        let carrying = planner.plan(*pickup, *delivery, depart, &constraints)?;
        waypoints.extend(carrying.waypoints);
        Ok(Trajectory::new(waypoints))
    }

    /// Strategy (a): forbid the lane the earliest conflict happened in and
    /// replan in the alternate lane of the same direction class. Reverts
    /// the lane ban if no plan exists without it.
    fn restratify(
        &self,
        vehicle: &Vehicle,
        pickup: &Position,
        delivery: &Position,
        t0_s: f64,
        forbidden_lanes: &mut Vec<f64>,
        trajectory: &Trajectory,
        conflicts: &[Conflict],
    ) -> Option<Trajectory> {
        let earliest = conflicts
            .iter()
            .min_by(|a, b| a.t_s.total_cmp(&b.t_s))?;
        let alt = trajectory.position_at(earliest.t_s)?.alt_m;
        let lane = self
            .config
            .all_lanes()
            .into_iter()
            .min_by(|a, b| (a - alt).abs().total_cmp(&(b - alt).abs()))?;
        forbidden_lanes.push(lane);
        match self.plan_mission(vehicle, pickup, delivery, t0_s, forbidden_lanes, &[], 0.0) {
            Ok(replanned) => Some(replanned),
            Err(_) => {
                forbidden_lanes.pop();
                None
            }
        }
    }

    /// Strategy (b): slow the vehicle ahead of the earliest conflict so it
    /// arrives at the conflict point at least one time step later, then
    /// resume cruise. The damping factor is the minimum over all conflicts,
    /// floored at the configured ratio.
    fn damp(&self, trajectory: &Trajectory, conflicts: &[Conflict]) -> Option<Trajectory> {
        let t0 = trajectory.start_time();
        let step = self.config.time_resolution_s;
        let mut factor = 1.0f64;
        for conflict in conflicts {
            let lead = conflict.t_s - t0;
            if lead <= 0.0 {
                return None;
            }
            factor = factor.min(lead / (lead + step));
        }
        let factor = factor.max(self.config.speed_min_ratio);
        if factor >= 1.0 {
            return None;
        }
        let earliest = conflicts
            .iter()
            .map(|c| c.t_s)
            .fold(f64::INFINITY, f64::min);
        let delay = (earliest - t0) * (1.0 / factor - 1.0);

        let waypoints = trajectory
            .waypoints
            .iter()
            .map(|wp| {
                let mut wp = *wp;
                if wp.t_s < earliest {
                    wp.t_s = t0 + (wp.t_s - t0) / factor;
                    if wp.speed_mps > 0.0 {
                        wp.speed_mps *= factor;
                    }
                } else {
                    wp.t_s += delay;
                }
                wp
            })
            .collect();
        Some(Trajectory::new(waypoints))
    }
}
