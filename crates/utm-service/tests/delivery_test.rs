//! End-to-end delivery scenarios over the San Francisco operational area.
//!
//! Each test drives the service through its public API and then checks the
//! universal invariants of the committed set: conflict-freedom, geofence
//! respect, vehicle exclusivity, monotone time, speed feasibility and
//! altitude legality.

use utm_core::models::{Mission, Position};
use utm_core::{ConflictDetector, GeofenceIndex, UtmConfig};
use utm_service::{RequestError, UtmService};

fn test_config() -> UtmConfig {
    // Planning-heavy scenarios in debug builds should not trip the
    // production 5s request deadline.
    UtmConfig {
        request_deadline_s: 60.0,
        ..UtmConfig::default()
    }
}

fn service() -> UtmService {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    UtmService::new(test_config())
}

fn pos(lat: f64, lon: f64) -> Position {
    Position::new(lat, lon, 30.0)
}

/// Assert every universal invariant over the currently committed set.
fn assert_invariants(service: &UtmService) {
    let config = test_config();
    let geofence = GeofenceIndex::new(config.zones.clone());
    let detector = ConflictDetector::new(&config);
    let missions: Vec<Mission> = service
        .list_missions()
        .into_iter()
        .filter(|m| !m.phase.is_terminal())
        .collect();
    let lanes = config.all_lanes();

    for (i, a) in missions.iter().enumerate() {
        // Conflict-freedom across every committed pair.
        for b in missions.iter().skip(i + 1) {
            assert!(
                detector
                    .check_pair(&a.id, &a.trajectory, &b.id, &b.trajectory)
                    .is_none(),
                "committed missions {} and {} violate separation",
                a.id,
                b.id
            );
        }

        // Monotone time, speed feasibility, geofence respect per segment.
        for pair in a.trajectory.waypoints.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            assert!(from.t_s < to.t_s, "times must be strictly increasing");
            let dist = utm_core::geo::haversine_distance(from.lat, from.lon, to.lat, to.lon);
            let dt = to.t_s - from.t_s;
            assert!(
                dist / dt <= config.drone_max_speed_mps + 1e-9,
                "segment requires {:.1} m/s",
                dist / dt
            );
            assert!(
                !geofence.segment_crosses_no_fly((from.lat, from.lon), (to.lat, to.lon)),
                "mission {} crosses a no-fly zone",
                a.id
            );
        }

        // Altitude legality.
        for wp in &a.trajectory.waypoints {
            assert!(
                lanes.iter().any(|lane| (lane - wp.alt_m).abs() < 0.5),
                "waypoint altitude {} is not a configured lane",
                wp.alt_m
            );
        }
    }

    // Vehicle exclusivity.
    let mut vehicle_ids: Vec<_> = missions.iter().map(|m| m.vehicle_id).collect();
    vehicle_ids.sort_unstable();
    let before = vehicle_ids.len();
    vehicle_ids.dedup();
    assert_eq!(before, vehicle_ids.len(), "a vehicle carries two missions");
}

#[test]
fn s1_direct_delivery_uses_an_east_lane() {
    let service = service();
    let pickup = pos(37.77, -122.43);
    let delivery = pos(37.75, -122.41);
    service.register_vehicle(pickup);

    let mission_id = service.submit_delivery_at(pickup, delivery, 0.0).unwrap();
    let mission = service.mission(&mission_id).unwrap();

    let first = mission.trajectory.waypoints.first().unwrap();
    let last = mission.trajectory.waypoints.last().unwrap();
    assert_eq!((first.lat, first.lon), (pickup.lat, pickup.lon));
    assert_eq!((last.lat, last.lon), (delivery.lat, delivery.lon));
    assert_eq!(last.speed_mps, 0.0);

    // The request is as much east as south, so it flies an east/west lane.
    let config = test_config();
    for wp in &mission.trajectory.waypoints {
        assert!(config.east_west_lanes_m.contains(&wp.alt_m));
    }
    // Nothing to dodge: the path stays close to the straight line.
    let straight = pickup.horizontal_distance_to(&delivery);
    assert!(mission.trajectory.total_distance_m() < straight * 1.25);
    assert_invariants(&service);
}

#[test]
fn s2_five_simultaneous_identical_requests_stay_conflict_free() {
    let service = service();
    let pickup = pos(37.77, -122.43);
    let delivery = pos(37.75, -122.41);
    for _ in 0..5 {
        service.register_vehicle(pickup);
    }

    let mut committed = Vec::new();
    let mut failures = 0;
    for _ in 0..5 {
        match service.submit_delivery_at(pickup, delivery, 0.0) {
            Ok(mission_id) => committed.push(mission_id),
            Err(RequestError::ResolutionFailed) => failures += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert!(committed.len() >= 2, "lane stratification fits at least two");
    assert_eq!(committed.len() + failures, 5);
    assert_invariants(&service);

    // Departing the same point at the same instant, the committed flights
    // must spread across altitude lanes (or have been damped).
    let config = test_config();
    let mut lanes_used: Vec<f64> = Vec::new();
    let mut any_damped = false;
    for mission_id in &committed {
        let mission = service.mission(mission_id).unwrap();
        for wp in &mission.trajectory.waypoints {
            if !lanes_used.iter().any(|l| (l - wp.alt_m).abs() < 0.5) {
                lanes_used.push(wp.alt_m);
            }
            if wp.speed_mps > 0.0 && wp.speed_mps < config.drone_cruise_speed_mps {
                any_damped = true;
            }
        }
    }
    assert!(lanes_used.len() >= 2 || any_damped);
}

#[test]
fn s3_long_route_detours_around_the_airport() {
    let service = service();
    let pickup = pos(37.77, -122.43);
    let delivery = pos(37.61, -122.37);
    service.register_vehicle(pickup);

    let mission_id = service.submit_delivery_at(pickup, delivery, 0.0).unwrap();
    let mission = service.mission(&mission_id).unwrap();

    // The straight line clips the airport restricted airspace, so the
    // planned path must be longer than the direct distance and never touch
    // the rectangle (assert_invariants checks every segment).
    let straight = pickup.horizontal_distance_to(&delivery);
    assert!(mission.trajectory.total_distance_m() > straight);
    assert_invariants(&service);
}

#[test]
fn s4_path_keeps_out_of_the_hospital_cost_zone() {
    let service = service();
    let pickup = pos(37.78, -122.44);
    let delivery = pos(37.74, -122.40);
    service.register_vehicle(pickup);

    let mission_id = service.submit_delivery_at(pickup, delivery, 0.0).unwrap();
    let mission = service.mission(&mission_id).unwrap();

    let config = test_config();
    let hospital = config
        .zones
        .iter()
        .find(|z| z.name == "Hospital Complex")
        .map(|z| z.bounds)
        .unwrap();
    for wp in &mission.trajectory.waypoints {
        assert!(
            !hospital.contains(wp.lat, wp.lon),
            "waypoint inside the 4x hospital zone"
        );
    }
    assert_invariants(&service);
}

#[test]
fn s5_pickup_inside_the_airport_is_out_of_bounds() {
    let service = service();
    service.register_vehicle(pos(37.75, -122.41));

    let err = service
        .submit_delivery_at(pos(37.61, -122.38), pos(37.75, -122.41), 0.0)
        .unwrap_err();
    assert_eq!(err, RequestError::OutOfBounds);
    assert!(service.list_missions().is_empty());

    // Outside the operational bounds entirely.
    let err = service
        .submit_delivery_at(pos(37.75, -122.41), pos(37.50, -122.41), 0.0)
        .unwrap_err();
    assert_eq!(err, RequestError::OutOfBounds);
}

#[test]
fn s6_opposed_requests_separate_by_lane_or_timing() {
    let service = service();
    let a = pos(37.77, -122.43);
    let b = pos(37.75, -122.41);
    service.register_vehicle(a);
    service.register_vehicle(b);

    let outbound = service.submit_delivery_at(a, b, 0.0).unwrap();
    let inbound = service.submit_delivery_at(b, a, 0.0).unwrap();
    assert_invariants(&service);

    let config = test_config();
    let outbound = service.mission(&outbound).unwrap();
    let inbound = service.mission(&inbound).unwrap();
    let outbound_lanes: Vec<f64> = outbound
        .trajectory
        .waypoints
        .iter()
        .map(|wp| wp.alt_m)
        .collect();
    let inbound_lanes: Vec<f64> = inbound
        .trajectory
        .waypoints
        .iter()
        .map(|wp| wp.alt_m)
        .collect();
    let altitudes_differ = outbound_lanes
        .iter()
        .zip(inbound_lanes.iter().rev())
        .any(|(a, b)| (a - b).abs() >= 0.5);
    let inbound_damped = inbound
        .trajectory
        .waypoints
        .iter()
        .any(|wp| wp.speed_mps > 0.0 && wp.speed_mps < config.drone_cruise_speed_mps);
    assert!(altitudes_differ || inbound_damped);
}

#[test]
fn no_idle_vehicle_is_reported_and_retriable() {
    let service = service();
    let err = service
        .submit_delivery_at(pos(37.77, -122.43), pos(37.75, -122.41), 0.0)
        .unwrap_err();
    assert_eq!(err, RequestError::NoVehicle);

    // Registering a vehicle makes the identical retry succeed.
    service.register_vehicle(pos(37.77, -122.43));
    assert!(service
        .submit_delivery_at(pos(37.77, -122.43), pos(37.75, -122.41), 0.0)
        .is_ok());
}

#[test]
fn pickup_equal_to_delivery_is_unroutable() {
    let service = service();
    let point = pos(37.75, -122.41);
    service.register_vehicle(point);

    let err = service.submit_delivery_at(point, point, 0.0).unwrap_err();
    assert!(matches!(err, RequestError::Unroutable(_)));

    // The failed request released its provisional reservation.
    assert!(service
        .submit_delivery_at(point, pos(37.76, -122.40), 0.0)
        .is_ok());
}

#[test]
fn identical_requests_yield_distinct_missions() {
    let service = service();
    let pickup = pos(37.77, -122.43);
    let delivery = pos(37.75, -122.41);
    service.register_vehicle(pickup);
    service.register_vehicle(pickup);

    let first = service.submit_delivery_at(pickup, delivery, 0.0).unwrap();
    let second = service.submit_delivery_at(pickup, delivery, 0.0).unwrap();
    assert_ne!(first, second);
    assert_eq!(service.list_missions().len(), 2);
    assert_invariants(&service);
}

#[test]
fn resubmission_after_removal_costs_the_same() {
    let service = service();
    let pickup = pos(37.77, -122.43);
    let delivery = pos(37.75, -122.41);
    service.register_vehicle(pickup);

    let first = service.submit_delivery_at(pickup, delivery, 0.0).unwrap();
    let first_distance = service.mission(&first).unwrap().trajectory.total_distance_m();

    use utm_core::models::MissionPhase;
    service
        .mark_mission_phase(&first, MissionPhase::EnRoutePickup)
        .unwrap();
    service
        .mark_mission_phase(&first, MissionPhase::Carrying)
        .unwrap();
    service
        .mark_mission_phase(&first, MissionPhase::Delivered)
        .unwrap();

    let second = service.submit_delivery_at(pickup, delivery, 1_000.0).unwrap();
    let second_distance = service
        .mission(&second)
        .unwrap()
        .trajectory
        .total_distance_m();
    assert!((first_distance - second_distance).abs() < 1e-6);
}

#[test]
fn zero_deadline_surfaces_timeout_and_releases_the_vehicle() {
    let service = UtmService::new(UtmConfig {
        request_deadline_s: 0.0,
        ..UtmConfig::default()
    });
    let pickup = pos(37.77, -122.43);
    service.register_vehicle(pickup);

    let err = service
        .submit_delivery_at(pickup, pos(37.75, -122.41), 0.0)
        .unwrap_err();
    assert!(matches!(err, RequestError::Timeout(_)));
    assert!(service.list_missions().is_empty());
    let vehicles = service.list_vehicles();
    assert_eq!(vehicles.len(), 1);
    assert!(vehicles[0].current_mission.is_none());
}
