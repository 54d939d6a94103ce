//! Pairwise spatio-temporal conflict detection between trajectories.

use serde::{Deserialize, Serialize};

use crate::config::UtmConfig;
use crate::geo::{haversine_distance, vertical_distance};
use crate::models::{MissionId, Point4D, Trajectory};

/// How badly the separation minima are violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Critical,
    Warning,
    Minor,
}

/// A detected separation violation between two missions at one sample time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub mission_a: MissionId,
    pub mission_b: MissionId,
    pub point_a: Point4D,
    pub point_b: Point4D,
    pub t_s: f64,
    pub horizontal_separation_m: f64,
    pub vertical_separation_m: f64,
    pub severity: ConflictSeverity,
}

/// Detects conflicts between a candidate trajectory and the committed set
/// by sampling both at a common time grid and interpolating between
/// waypoints.
pub struct ConflictDetector<'a> {
    config: &'a UtmConfig,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(config: &'a UtmConfig) -> Self {
        Self { config }
    }

    /// Check the candidate against every committed trajectory whose time
    /// span overlaps it. At most one conflict is reported per pair, the
    /// earliest.
    pub fn detect<'m, I>(
        &self,
        candidate_id: &str,
        candidate: &Trajectory,
        committed: I,
    ) -> Vec<Conflict>
    where
        I: IntoIterator<Item = (&'m str, &'m Trajectory)>,
    {
        committed
            .into_iter()
            .filter(|(id, _)| *id != candidate_id)
            .filter_map(|(id, traj)| self.check_pair(candidate_id, candidate, id, traj))
            .collect()
    }

    /// Earliest separation violation between two trajectories, if any.
    pub fn check_pair(
        &self,
        id_a: &str,
        a: &Trajectory,
        id_b: &str,
        b: &Trajectory,
    ) -> Option<Conflict> {
        let window_start = a.start_time().max(b.start_time());
        let window_end = a.end_time().min(b.end_time());
        if window_start > window_end {
            return None;
        }

        let step = self.config.time_resolution_s;
        let mut t = window_start;
        while t <= window_end + 1e-9 {
            if let (Some(pa), Some(pb)) = (a.position_at(t), b.position_at(t)) {
                let h = haversine_distance(pa.lat, pa.lon, pb.lat, pb.lon);
                let v = vertical_distance(pa.alt_m, pb.alt_m);
                if h < self.config.horizontal_separation_m
                    && v < self.config.vertical_separation_m
                {
                    return Some(Conflict {
                        mission_a: id_a.to_string(),
                        mission_b: id_b.to_string(),
                        point_a: pa,
                        point_b: pb,
                        t_s: t,
                        horizontal_separation_m: h,
                        vertical_separation_m: v,
                        severity: self.assess(h),
                    });
                }
            }
            t += step;
        }
        None
    }

    fn assess(&self, horizontal_m: f64) -> ConflictSeverity {
        let sep = self.config.horizontal_separation_m;
        if horizontal_m < sep / 2.0 {
            ConflictSeverity::Critical
        } else if horizontal_m < sep * 0.75 {
            ConflictSeverity::Warning
        } else {
            ConflictSeverity::Minor
        }
    }
}
