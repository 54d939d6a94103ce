//! Time-aware A* over a discretized lat/lon/altitude/time lattice.
//!
//! The search runs in a single altitude lane chosen from the direction
//! class of the request; lane entry and exit happen at the trajectory
//! endpoints. Time advances one step per move, which lets the resolver
//! penalize nodes that pass close to already-committed traffic.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::config::UtmConfig;
use crate::error::PlanError;
use crate::geo::{haversine_distance, meters_per_deg_lat, meters_per_deg_lon, vertical_distance};
use crate::geofence::GeofenceIndex;
use crate::models::{Position, Trajectory, Waypoint};

const NEIGHBOR_DELTAS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Cardinal direction class of a request, used for altitude stratification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionClass {
    NorthSouth,
    EastWest,
}

impl DirectionClass {
    /// Classify by the dominant coordinate delta in degrees; ties (within
    /// rounding noise) count as east/west.
    pub fn between(from: &Position, to: &Position) -> Self {
        let dlat = (to.lat - from.lat).abs();
        let dlon = (to.lon - from.lon).abs();
        if dlat > dlon + 1e-9 {
            DirectionClass::NorthSouth
        } else {
            DirectionClass::EastWest
        }
    }

    pub fn lanes<'c>(&self, config: &'c UtmConfig) -> &'c [f64] {
        match self {
            DirectionClass::NorthSouth => &config.north_south_lanes_m,
            DirectionClass::EastWest => &config.east_west_lanes_m,
        }
    }
}

/// Optional constraints a caller layers onto a search.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanConstraints<'a> {
    /// Lane altitudes the search may not use.
    pub forbidden_lanes: &'a [f64],
    /// Committed trajectories treated as soft dynamic obstacles.
    pub obstacles: &'a [Trajectory],
    /// Meter-equivalent penalty added to nodes within separation minima of
    /// an obstacle at the node's time.
    pub penalty_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct NodeKey {
    ix: i32,
    iy: i32,
    iz: u8,
    it: u32,
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f: f64,
    h: f64,
    seq: u64,
    key: NodeKey,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    // Inverted so the BinaryHeap pops the lowest f first; ties break on
    // lower h, then earliest insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The horizontal lattice over the operational bounds.
#[derive(Debug, Clone, Copy)]
struct Grid {
    min_lat: f64,
    min_lon: f64,
    dlat_deg: f64,
    dlon_deg: f64,
    nx: i32,
    ny: i32,
}

impl Grid {
    fn new(config: &UtmConfig) -> Self {
        let bounds = config.operational_bounds;
        let (center_lat, _) = bounds.centroid();
        let dlat_deg = config.grid_resolution_m / meters_per_deg_lat(center_lat);
        let dlon_deg = config.grid_resolution_m / meters_per_deg_lon(center_lat);
        Self {
            min_lat: bounds.min_lat,
            min_lon: bounds.min_lon,
            dlat_deg,
            dlon_deg,
            nx: ((bounds.max_lon - bounds.min_lon) / dlon_deg).floor() as i32,
            ny: ((bounds.max_lat - bounds.min_lat) / dlat_deg).floor() as i32,
        }
    }

    // Clamped into range so a coordinate on the literal upper boundary
    // (which rounds one past the last lattice row) still maps to a cell
    // the search can reach.
    fn cell_of(&self, lat: f64, lon: f64) -> (i32, i32) {
        (
            (((lon - self.min_lon) / self.dlon_deg).round() as i32).clamp(0, self.nx),
            (((lat - self.min_lat) / self.dlat_deg).round() as i32).clamp(0, self.ny),
        )
    }

    fn center(&self, ix: i32, iy: i32) -> (f64, f64) {
        (
            self.min_lat + f64::from(iy) * self.dlat_deg,
            self.min_lon + f64::from(ix) * self.dlon_deg,
        )
    }

    fn in_range(&self, ix: i32, iy: i32) -> bool {
        ix >= 0 && ix <= self.nx && iy >= 0 && iy <= self.ny
    }
}

/// 4D A* planner over the configured operational area.
pub struct Planner<'a> {
    config: &'a UtmConfig,
    geofence: &'a GeofenceIndex,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a UtmConfig, geofence: &'a GeofenceIndex) -> Self {
        Self { config, geofence }
    }

    /// Plan a single leg from `start` to `goal` departing at `t0_s`.
    ///
    /// The leg cruises in one altitude lane of the request's direction
    /// class, the allowed lane nearest the start altitude. `start` and
    /// `goal` that coincide exactly are rejected as `ZeroLength`.
    pub fn plan(
        &self,
        start: Position,
        goal: Position,
        t0_s: f64,
        constraints: &PlanConstraints<'_>,
    ) -> Result<Trajectory, PlanError> {
        if start.lat == goal.lat && start.lon == goal.lon {
            return Err(PlanError::ZeroLength);
        }
        let bounds = &self.config.operational_bounds;
        if !bounds.contains(start.lat, start.lon) || !bounds.contains(goal.lat, goal.lon) {
            return Err(PlanError::OutOfBounds);
        }
        if self.geofence.is_no_fly(start.lat, start.lon)
            || self.geofence.is_no_fly(goal.lat, goal.lon)
        {
            return Err(PlanError::OutOfBounds);
        }

        let class = DirectionClass::between(&start, &goal);
        let (iz, lane_alt) =
            select_lane(class.lanes(self.config), constraints.forbidden_lanes, start.alt_m)
                .ok_or(PlanError::NoPath)?;

        let grid = Grid::new(self.config);
        let (sx, sy) = grid.cell_of(start.lat, start.lon);
        let (gx, gy) = grid.cell_of(goal.lat, goal.lon);
        let time_step = self.config.time_resolution_s;
        // Without dynamic obstacles time influences neither cost nor
        // feasibility, so states collapse onto their spatial cell and a
        // sealed-off goal drains the open set instead of spinning through
        // ever-later copies of the same cells. Waiting in place likewise
        // only makes sense around moving traffic.
        let timed = !constraints.obstacles.is_empty();
        let stay = timed.then_some((0, 0));

        let mut open: BinaryHeap<OpenEntry> = BinaryHeap::new();
        let mut g_score: HashMap<NodeKey, f64> = HashMap::new();
        let mut came_from: HashMap<NodeKey, NodeKey> = HashMap::new();
        let mut closed: HashSet<NodeKey> = HashSet::new();
        let mut seq = 0u64;

        let start_key = NodeKey {
            ix: sx,
            iy: sy,
            iz,
            it: 0,
        };
        let (slat, slon) = grid.center(sx, sy);
        let h0 = haversine_distance(slat, slon, goal.lat, goal.lon);
        g_score.insert(start_key, 0.0);
        open.push(OpenEntry {
            f: h0,
            h: h0,
            seq,
            key: start_key,
        });

        let mut expansions = 0usize;
        let mut goal_key = None;

        while let Some(entry) = open.pop() {
            let current = entry.key;
            if !closed.insert(current) {
                continue;
            }
            expansions += 1;
            if expansions > self.config.max_expansions {
                return Err(PlanError::Exhausted(self.config.max_expansions));
            }
            if current.ix == gx && current.iy == gy {
                goal_key = Some(current);
                break;
            }

            let (clat, clon) = grid.center(current.ix, current.iy);
            let current_class = self.geofence.classify(clat, clon);
            if current_class.forbidden {
                continue;
            }
            let current_g = g_score.get(&current).copied().unwrap_or(f64::INFINITY);

            for (dx, dy) in NEIGHBOR_DELTAS.iter().copied().chain(stay) {
                let nx = current.ix + dx;
                let ny = current.iy + dy;
                if !grid.in_range(nx, ny) {
                    continue;
                }
                let next = NodeKey {
                    ix: nx,
                    iy: ny,
                    iz,
                    it: if timed { current.it + 1 } else { 0 },
                };
                if closed.contains(&next) {
                    continue;
                }
                let (nlat, nlon) = grid.center(nx, ny);
                let dist = haversine_distance(clat, clon, nlat, nlon);
                if dist / time_step > self.config.drone_max_speed_mps {
                    continue;
                }
                // The whole edge must stay clear, not just its endpoints:
                // a diagonal move can clip a rectangle corner between two
                // admissible cell centers.
                if self
                    .geofence
                    .segment_crosses_no_fly((clat, clon), (nlat, nlon))
                {
                    continue;
                }
                let next_class = self.geofence.classify(nlat, nlon);

                let mut cost = dist * 0.5 * (current_class.multiplier + next_class.multiplier);
                if timed {
                    // A node at depth d flies at t0 + (d + 1) steps; the
                    // snap off the lattice at the start occupies the first.
                    let t = t0_s + f64::from(current.it + 2) * time_step;
                    if self.near_committed_traffic(nlat, nlon, lane_alt, t, constraints.obstacles)
                    {
                        cost += constraints.penalty_m;
                    }
                }

                let tentative = current_g + cost;
                if tentative < g_score.get(&next).copied().unwrap_or(f64::INFINITY) {
                    g_score.insert(next, tentative);
                    came_from.insert(next, current);
                    let h = haversine_distance(nlat, nlon, goal.lat, goal.lon);
                    seq += 1;
                    open.push(OpenEntry {
                        f: tentative + h,
                        h,
                        seq,
                        key: next,
                    });
                }
            }
        }

        let goal_key = goal_key.ok_or(PlanError::NoPath)?;
        let mut keys = vec![goal_key];
        while let Some(prev) = came_from.get(&keys[keys.len() - 1]) {
            keys.push(*prev);
        }
        keys.reverse();

        let trajectory = self.build_trajectory(&grid, &keys, &start, &goal, lane_alt, t0_s);
        // The snaps between the exact endpoints and their cell centers are
        // the only segments the search itself never examined; they must
        // satisfy the same airspace and speed constraints as lattice edges.
        let n = trajectory.waypoints.len();
        for pair in [
            (&trajectory.waypoints[0], &trajectory.waypoints[1]),
            (&trajectory.waypoints[n - 2], &trajectory.waypoints[n - 1]),
        ] {
            if self
                .geofence
                .segment_crosses_no_fly((pair.0.lat, pair.0.lon), (pair.1.lat, pair.1.lon))
            {
                return Err(PlanError::NoPath);
            }
            let dist = haversine_distance(pair.0.lat, pair.0.lon, pair.1.lat, pair.1.lon);
            if dist / (pair.1.t_s - pair.0.t_s) > self.config.drone_max_speed_mps {
                return Err(PlanError::NoPath);
            }
        }
        Ok(trajectory)
    }

    fn near_committed_traffic(
        &self,
        lat: f64,
        lon: f64,
        alt_m: f64,
        t_s: f64,
        obstacles: &[Trajectory],
    ) -> bool {
        obstacles.iter().any(|traj| {
            traj.position_at(t_s).is_some_and(|p| {
                haversine_distance(lat, lon, p.lat, p.lon) < self.config.horizontal_separation_m
                    && vertical_distance(alt_m, p.alt_m) < self.config.vertical_separation_m
            })
        })
    }

    fn build_trajectory(
        &self,
        grid: &Grid,
        keys: &[NodeKey],
        start: &Position,
        goal: &Position,
        lane_alt: f64,
        t0_s: f64,
    ) -> Trajectory {
        let cruise = self.config.drone_cruise_speed_mps;
        let step = self.config.time_resolution_s;
        // The exact endpoints get their own time slots so the snap onto and
        // off the lattice never asks for more than half a cell per step.
        let mut waypoints = Vec::with_capacity(keys.len() + 2);
        waypoints.push(Waypoint {
            lat: start.lat,
            lon: start.lon,
            alt_m: lane_alt,
            t_s: t0_s,
            speed_mps: cruise,
        });
        // Every move advances time one step, so a node's position in the
        // reconstructed path is its time index.
        for (i, key) in keys.iter().enumerate() {
            let (lat, lon) = grid.center(key.ix, key.iy);
            waypoints.push(Waypoint {
                lat,
                lon,
                alt_m: lane_alt,
                t_s: t0_s + (i as f64 + 1.0) * step,
                speed_mps: cruise,
            });
        }
        waypoints.push(Waypoint {
            lat: goal.lat,
            lon: goal.lon,
            alt_m: lane_alt,
            t_s: t0_s + (keys.len() as f64 + 1.0) * step,
            speed_mps: 0.0,
        });
        Trajectory::new(waypoints)
    }
}

fn select_lane(lanes: &[f64], forbidden: &[f64], start_alt_m: f64) -> Option<(u8, f64)> {
    lanes
        .iter()
        .enumerate()
        .filter(|(_, lane)| !forbidden.iter().any(|f| (*f - **lane).abs() < 0.5))
        .min_by(|(_, a), (_, b)| {
            (**a - start_alt_m)
                .abs()
                .total_cmp(&(**b - start_alt_m).abs())
        })
        .map(|(i, lane)| (i as u8, *lane))
}
