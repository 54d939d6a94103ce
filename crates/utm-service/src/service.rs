//! The narrow API the HTTP/WS layer and the simulator consume.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use utm_core::models::{
    Mission, MissionId, MissionPhase, Point4D, Position, Vehicle, VehicleId, VehicleState,
};
use utm_core::{GeofenceIndex, UtmConfig};

use crate::error::RequestError;
use crate::events::{EventBus, UtmEvent};
use crate::resolver::Resolver;
use crate::store::TrajectoryStore;

/// Aggregate counters for dashboards and health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub vehicles_total: usize,
    pub vehicles_idle: usize,
    pub active_missions: usize,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
}

/// The UTM core service: owns the trajectory store, the geofence index and
/// the event bus, and mediates every externally visible operation.
pub struct UtmService {
    config: UtmConfig,
    geofence: GeofenceIndex,
    store: TrajectoryStore,
    events: EventBus,
}

impl UtmService {
    pub fn new(config: UtmConfig) -> Self {
        let geofence = GeofenceIndex::new(config.zones.clone());
        tracing::info!(
            zones = config.zones.len(),
            bounds = ?config.operational_bounds,
            "UTM core initialized"
        );
        Self {
            config,
            geofence,
            store: TrajectoryStore::new(),
            events: EventBus::default(),
        }
    }

    /// Build a service from defaults plus `UTM_*` environment overrides.
    pub fn from_env() -> Self {
        Self::new(crate::config::load_from_env())
    }

    pub fn config(&self) -> &UtmConfig {
        &self.config
    }

    /// Add a vehicle to the fleet at the given position, idle and ready
    /// for assignment.
    pub fn register_vehicle(&self, position: Position) -> VehicleId {
        let vehicle = self.store.register_vehicle(position);
        tracing::info!(vehicle_id = vehicle.id, "vehicle registered");
        let id = vehicle.id;
        self.events.publish(UtmEvent::VehicleUpdated { vehicle });
        id
    }

    /// Submit a delivery request departing now.
    pub fn submit_delivery(
        &self,
        pickup: Position,
        delivery: Position,
    ) -> Result<MissionId, RequestError> {
        let now_s = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.submit_delivery_at(pickup, delivery, now_s)
    }

    /// Submit a delivery request with an explicit departure time in seconds
    /// since the Unix epoch. The simulator uses this for reproducible
    /// timelines.
    pub fn submit_delivery_at(
        &self,
        pickup: Position,
        delivery: Position,
        t0_s: f64,
    ) -> Result<MissionId, RequestError> {
        let resolver = Resolver::new(&self.config, &self.geofence, &self.store, &self.events);
        resolver
            .submit(pickup, delivery, t0_s)
            .map(|mission| mission.id)
    }

    pub fn list_missions(&self) -> Vec<Mission> {
        self.store.missions()
    }

    pub fn mission(&self, mission_id: &str) -> Option<Mission> {
        self.store.mission(mission_id)
    }

    pub fn list_vehicles(&self) -> Vec<Vehicle> {
        self.store.vehicles()
    }

    /// Ingest a telemetry fix for a vehicle.
    pub fn update_vehicle_telemetry(
        &self,
        vehicle_id: VehicleId,
        point: Point4D,
        battery_pct: f64,
    ) -> Result<(), RequestError> {
        let vehicle = self.store.update_telemetry(vehicle_id, point, battery_pct)?;
        self.events.publish(UtmEvent::VehicleUpdated { vehicle });
        Ok(())
    }

    /// Advance a mission through its lifecycle. Terminal phases release the
    /// vehicle and retire the trajectory from the committed set.
    pub fn mark_mission_phase(
        &self,
        mission_id: &str,
        phase: MissionPhase,
    ) -> Result<(), RequestError> {
        let mission = self.store.advance_phase(mission_id, phase)?;
        tracing::info!(mission_id = %mission.id, ?phase, "mission phase changed");
        self.events.publish(UtmEvent::MissionPhaseChanged {
            mission_id: mission.id,
            phase,
        });
        Ok(())
    }

    /// Subscribe to the core's event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<UtmEvent> {
        self.events.subscribe()
    }

    pub fn system_status(&self) -> SystemStatus {
        let vehicles = self.store.vehicles();
        SystemStatus {
            vehicles_total: vehicles.len(),
            vehicles_idle: vehicles
                .iter()
                .filter(|v| v.state == VehicleState::Idle)
                .count(),
            active_missions: self
                .store
                .missions()
                .iter()
                .filter(|m| !m.phase.is_terminal())
                .count(),
            conflicts_detected: self.store.conflicts_detected(),
            conflicts_resolved: self.store.conflicts_resolved(),
        }
    }
}
