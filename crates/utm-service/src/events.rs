//! Fire-and-forget event fan-out for external observers.

use serde::Serialize;
use tokio::sync::broadcast;
use utm_core::models::{Mission, MissionId, MissionPhase, Vehicle};
use utm_core::Conflict;

/// Events published by the core; the API layer drains these onto its
/// WebSocket connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UtmEvent {
    VehicleUpdated { vehicle: Vehicle },
    MissionCreated { mission: Mission },
    MissionPhaseChanged { mission_id: MissionId, phase: MissionPhase },
    ConflictDetected { conflict: Conflict },
}

/// Broadcast bus. Publishing never blocks and never fails; events sent
/// with no subscribers are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UtmEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UtmEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: UtmEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
