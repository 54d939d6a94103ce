//! In-memory trajectory store: the single mutable shared resource.
//!
//! Vehicles and committed missions live in concurrent maps; every mutation
//! that touches the vehicle-state/mission coupling runs inside one commit
//! section so external observers always see a conflict-free, consistent
//! committed set.

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use utm_core::models::{
    Mission, MissionId, MissionPhase, Point4D, Position, Vehicle, VehicleId, VehicleState,
};

use crate::error::RequestError;

/// Proof that the holder is inside the commit critical section.
pub struct CommitGuard<'a> {
    _inner: MutexGuard<'a, ()>,
}

pub struct TrajectoryStore {
    vehicles: DashMap<VehicleId, Vehicle>,
    missions: DashMap<MissionId, Mission>,
    /// Vehicles provisionally held by an in-flight resolver loop. Reserved
    /// vehicles stay `Idle` but are skipped by assignment until the loop
    /// commits or releases them.
    reserved: DashSet<VehicleId>,
    commit: Mutex<()>,
    vehicle_counter: AtomicU32,
    conflicts_detected: AtomicU64,
    conflicts_resolved: AtomicU64,
}

impl TrajectoryStore {
    pub fn new() -> Self {
        Self {
            vehicles: DashMap::new(),
            missions: DashMap::new(),
            reserved: DashSet::new(),
            commit: Mutex::new(()),
            vehicle_counter: AtomicU32::new(1),
            conflicts_detected: AtomicU64::new(0),
            conflicts_resolved: AtomicU64::new(0),
        }
    }

    pub fn lock_commits(&self) -> CommitGuard<'_> {
        CommitGuard {
            _inner: self.commit.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Add a new vehicle to the fleet, idle and fully charged.
    pub fn register_vehicle(&self, position: Position) -> Vehicle {
        let id = self.vehicle_counter.fetch_add(1, Ordering::SeqCst);
        let vehicle = Vehicle {
            id,
            state: VehicleState::Idle,
            position,
            battery_pct: 100.0,
            current_mission: None,
            last_update: Utc::now(),
        };
        self.vehicles.insert(id, vehicle.clone());
        vehicle
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<Vehicle> {
        self.vehicles.get(&id).map(|entry| entry.value().clone())
    }

    pub fn vehicles(&self) -> Vec<Vehicle> {
        let mut vehicles: Vec<Vehicle> =
            self.vehicles.iter().map(|entry| entry.value().clone()).collect();
        vehicles.sort_by_key(|v| v.id);
        vehicles
    }

    pub fn mission(&self, id: &str) -> Option<Mission> {
        self.missions.get(id).map(|entry| entry.value().clone())
    }

    pub fn missions(&self) -> Vec<Mission> {
        let mut missions: Vec<Mission> =
            self.missions.iter().map(|entry| entry.value().clone()).collect();
        missions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        missions
    }

    /// Committed trajectories whose time spans overlap `[t_start, t_end]`.
    /// Terminal missions no longer count as committed traffic.
    pub fn active_between(&self, t_start: f64, t_end: f64) -> Vec<Mission> {
        self.missions
            .iter()
            .filter(|entry| {
                let mission = entry.value();
                !mission.phase.is_terminal() && mission.trajectory.overlaps(t_start, t_end)
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Reserve the idle vehicle nearest to the pickup; ties break on the
    /// lowest vehicle id. The reservation keeps the vehicle out of other
    /// assignments until it is committed or released.
    pub fn reserve_nearest_idle(&self, pickup: &Position) -> Option<Vehicle> {
        let _guard = self.lock_commits();
        let mut best: Option<(f64, Vehicle)> = None;
        for entry in self.vehicles.iter() {
            let vehicle = entry.value();
            if vehicle.state != VehicleState::Idle || self.reserved.contains(&vehicle.id) {
                continue;
            }
            let dist = vehicle.position.horizontal_distance_to(pickup);
            let closer = match &best {
                None => true,
                Some((best_dist, best_vehicle)) => {
                    dist < *best_dist || (dist == *best_dist && vehicle.id < best_vehicle.id)
                }
            };
            if closer {
                best = Some((dist, vehicle.clone()));
            }
        }
        let (_, vehicle) = best?;
        self.reserved.insert(vehicle.id);
        Some(vehicle)
    }

    pub fn release_reservation(&self, id: VehicleId) {
        self.reserved.remove(&id);
    }

    /// Commit a mission: the vehicle transitions `Idle -> Assigned` and the
    /// trajectory joins the committed set, atomically. The caller must be
    /// inside the commit section.
    pub fn insert(&self, _guard: &CommitGuard<'_>, mission: Mission) -> Result<(), RequestError> {
        let Some(mut vehicle) = self.vehicles.get_mut(&mission.vehicle_id) else {
            return Err(RequestError::UnknownVehicle(mission.vehicle_id));
        };
        if vehicle.state != VehicleState::Idle {
            return Err(RequestError::NoVehicle);
        }
        vehicle.state = VehicleState::Assigned;
        vehicle.current_mission = Some(mission.id.clone());
        drop(vehicle);
        self.reserved.remove(&mission.vehicle_id);
        self.missions.insert(mission.id.clone(), mission);
        Ok(())
    }

    /// Advance a mission's phase, keeping the owning vehicle's state in
    /// step. Terminal phases release the vehicle: `Delivered` back to idle,
    /// `Failed` to unavailable. The mission record is retained for
    /// observers; `active_between` stops returning it.
    pub fn advance_phase(
        &self,
        mission_id: &str,
        phase: MissionPhase,
    ) -> Result<Mission, RequestError> {
        let _guard = self.lock_commits();
        let Some(mut entry) = self.missions.get_mut(mission_id) else {
            return Err(RequestError::UnknownMission(mission_id.to_string()));
        };
        let current = entry.phase;
        if !current.can_transition_to(phase) {
            return Err(RequestError::IllegalTransition {
                from: current,
                to: phase,
            });
        }
        entry.phase = phase;
        let mission = entry.value().clone();
        drop(entry);

        if let Some(mut vehicle) = self.vehicles.get_mut(&mission.vehicle_id) {
            vehicle.state = match phase {
                MissionPhase::Planned => VehicleState::Assigned,
                MissionPhase::EnRoutePickup | MissionPhase::Carrying => VehicleState::InFlight,
                MissionPhase::Delivered => VehicleState::Idle,
                MissionPhase::Failed => VehicleState::Unavailable,
            };
            if phase.is_terminal() {
                vehicle.current_mission = None;
            }
        }
        Ok(mission)
    }

    pub fn update_telemetry(
        &self,
        id: VehicleId,
        point: Point4D,
        battery_pct: f64,
    ) -> Result<Vehicle, RequestError> {
        let Some(mut vehicle) = self.vehicles.get_mut(&id) else {
            return Err(RequestError::UnknownVehicle(id));
        };
        vehicle.position = Position::new(point.lat, point.lon, point.alt_m);
        vehicle.battery_pct = battery_pct;
        vehicle.last_update = Utc::now();
        Ok(vehicle.clone())
    }

    pub fn note_conflicts_detected(&self, count: usize) {
        self.conflicts_detected
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn note_conflicts_resolved(&self, count: usize) {
        self.conflicts_resolved
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn conflicts_detected(&self) -> u64 {
        self.conflicts_detected.load(Ordering::Relaxed)
    }

    pub fn conflicts_resolved(&self) -> u64 {
        self.conflicts_resolved.load(Ordering::Relaxed)
    }
}

impl Default for TrajectoryStore {
    fn default() -> Self {
        Self::new()
    }
}
