//! Telemetry ingestion, mission lifecycle and the event stream.

use utm_core::models::{MissionPhase, Point4D, Position, VehicleState};
use utm_core::UtmConfig;
use utm_service::{RequestError, UtmEvent, UtmService};

fn service() -> UtmService {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    UtmService::new(UtmConfig {
        request_deadline_s: 60.0,
        ..UtmConfig::default()
    })
}

fn pos(lat: f64, lon: f64) -> Position {
    Position::new(lat, lon, 30.0)
}

fn fix(lat: f64, lon: f64, alt: f64, t: f64) -> Point4D {
    Point4D {
        lat,
        lon,
        alt_m: alt,
        t_s: t,
    }
}

#[test]
fn telemetry_updates_position_and_battery() {
    let service = service();
    let vehicle_id = service.register_vehicle(pos(37.70, -122.40));

    service
        .update_vehicle_telemetry(vehicle_id, fix(37.71, -122.41, 50.0, 10.0), 87.5)
        .unwrap();

    let vehicles = service.list_vehicles();
    assert_eq!(vehicles.len(), 1);
    let vehicle = &vehicles[0];
    assert_eq!(vehicle.position.lat, 37.71);
    assert_eq!(vehicle.position.lon, -122.41);
    assert_eq!(vehicle.position.alt_m, 50.0);
    assert_eq!(vehicle.battery_pct, 87.5);
}

#[test]
fn unknown_vehicle_and_mission_are_rejected() {
    let service = service();
    assert_eq!(
        service.update_vehicle_telemetry(99, fix(37.70, -122.40, 30.0, 0.0), 100.0),
        Err(RequestError::UnknownVehicle(99))
    );
    assert_eq!(
        service.mark_mission_phase("no-such-mission", MissionPhase::Carrying),
        Err(RequestError::UnknownMission("no-such-mission".to_string()))
    );
}

#[test]
fn mission_lifecycle_drives_vehicle_state() {
    let service = service();
    let pickup = pos(37.77, -122.43);
    let vehicle_id = service.register_vehicle(pickup);
    let mission_id = service
        .submit_delivery_at(pickup, pos(37.75, -122.41), 0.0)
        .unwrap();

    let state = |service: &UtmService| service.list_vehicles()[0].state;
    assert_eq!(state(&service), VehicleState::Assigned);

    service
        .mark_mission_phase(&mission_id, MissionPhase::EnRoutePickup)
        .unwrap();
    assert_eq!(state(&service), VehicleState::InFlight);

    // Skipping ahead is interface misuse.
    let err = service
        .mark_mission_phase(&mission_id, MissionPhase::Delivered)
        .unwrap_err();
    assert!(matches!(err, RequestError::IllegalTransition { .. }));

    service
        .mark_mission_phase(&mission_id, MissionPhase::Carrying)
        .unwrap();
    service
        .mark_mission_phase(&mission_id, MissionPhase::Delivered)
        .unwrap();
    let vehicle = &service.list_vehicles()[0];
    assert_eq!(vehicle.state, VehicleState::Idle);
    assert!(vehicle.current_mission.is_none());
    assert_eq!(vehicle.id, vehicle_id);

    let mission = service.mission(&mission_id).unwrap();
    assert_eq!(mission.phase, MissionPhase::Delivered);
}

#[test]
fn failed_mission_parks_the_vehicle_unavailable() {
    let service = service();
    let pickup = pos(37.77, -122.43);
    service.register_vehicle(pickup);
    let mission_id = service
        .submit_delivery_at(pickup, pos(37.75, -122.41), 0.0)
        .unwrap();

    service
        .mark_mission_phase(&mission_id, MissionPhase::Failed)
        .unwrap();
    assert_eq!(service.list_vehicles()[0].state, VehicleState::Unavailable);

    // An unavailable vehicle is not assignable.
    assert_eq!(
        service.submit_delivery_at(pickup, pos(37.75, -122.41), 0.0),
        Err(RequestError::NoVehicle)
    );
}

#[tokio::test]
async fn event_stream_reports_the_mission_lifecycle() {
    let service = service();
    let mut events = service.subscribe_events();

    let pickup = pos(37.77, -122.43);
    let vehicle_id = service.register_vehicle(pickup);
    let mission_id = service
        .submit_delivery_at(pickup, pos(37.75, -122.41), 0.0)
        .unwrap();
    service
        .mark_mission_phase(&mission_id, MissionPhase::EnRoutePickup)
        .unwrap();

    match events.try_recv().unwrap() {
        UtmEvent::VehicleUpdated { vehicle } => assert_eq!(vehicle.id, vehicle_id),
        other => panic!("expected VehicleUpdated, got {other:?}"),
    }
    match events.try_recv().unwrap() {
        UtmEvent::MissionCreated { mission } => {
            assert_eq!(mission.id, mission_id);
            assert_eq!(mission.vehicle_id, vehicle_id);
        }
        other => panic!("expected MissionCreated, got {other:?}"),
    }
    match events.try_recv().unwrap() {
        UtmEvent::MissionPhaseChanged { mission_id: id, phase } => {
            assert_eq!(id, mission_id);
            assert_eq!(phase, MissionPhase::EnRoutePickup);
        }
        other => panic!("expected MissionPhaseChanged, got {other:?}"),
    }
}

#[tokio::test]
async fn conflicting_requests_emit_conflict_events() {
    let service = service();
    let pickup = pos(37.77, -122.43);
    service.register_vehicle(pickup);
    service.register_vehicle(pickup);

    let first = service
        .submit_delivery_at(pickup, pos(37.75, -122.41), 0.0)
        .unwrap();
    let mut events = service.subscribe_events();
    service
        .submit_delivery_at(pickup, pos(37.75, -122.41), 0.0)
        .unwrap();

    let mut saw_conflict = false;
    while let Ok(event) = events.try_recv() {
        if let UtmEvent::ConflictDetected { conflict } = event {
            assert_eq!(conflict.mission_b, first);
            saw_conflict = true;
        }
    }
    assert!(saw_conflict, "same-origin departures must report a conflict");

    let status = service.system_status();
    assert!(status.conflicts_detected >= 1);
    assert!(status.conflicts_resolved >= 1);
}

#[test]
fn system_status_tracks_fleet_and_missions() {
    let service = service();
    let pickup = pos(37.77, -122.43);
    service.register_vehicle(pickup);
    service.register_vehicle(pos(37.70, -122.36));

    let status = service.system_status();
    assert_eq!(status.vehicles_total, 2);
    assert_eq!(status.vehicles_idle, 2);
    assert_eq!(status.active_missions, 0);

    let mission_id = service
        .submit_delivery_at(pickup, pos(37.75, -122.41), 0.0)
        .unwrap();
    let status = service.system_status();
    assert_eq!(status.vehicles_idle, 1);
    assert_eq!(status.active_missions, 1);

    service
        .mark_mission_phase(&mission_id, MissionPhase::Failed)
        .unwrap();
    let status = service.system_status();
    assert_eq!(status.active_missions, 0);
    assert_eq!(status.vehicles_idle, 1);
}

#[test]
fn events_serialize_with_a_type_tag() {
    let service = service();
    let mut events = service.subscribe_events();
    service.register_vehicle(pos(37.70, -122.40));
    let event = events.try_recv().unwrap();
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "vehicle_updated");
    assert_eq!(json["vehicle"]["state"], "idle");
}
