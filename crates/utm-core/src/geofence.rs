//! Static airspace constraints and spatial cost lookup.

use serde::{Deserialize, Serialize};

use crate::geo::BoundingBox;

/// What a zone does to traffic inside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneKind {
    /// Absolute prohibition; equivalent to an infinite cost multiplier.
    NoFly,
    /// Flight allowed but discouraged at the given cost multiplier (> 1).
    Sensitive { multiplier: f64 },
}

/// A geofenced rectangle with infinite vertical extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub bounds: BoundingBox,
    #[serde(flatten)]
    pub kind: ZoneKind,
}

/// Result of a point classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub forbidden: bool,
    pub multiplier: f64,
}

/// Immutable index over the zone set, loaded once at startup.
///
/// Lookup is a linear scan over the zones; the interface deliberately hides
/// that so a spatial index can replace it without contract changes.
#[derive(Debug, Clone)]
pub struct GeofenceIndex {
    zones: Vec<Zone>,
}

impl GeofenceIndex {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Classify a horizontal point. A point on or inside any no-fly
    /// rectangle is forbidden (the boundary itself is prohibited); otherwise
    /// the multiplier is the product of all sensitive zones containing the
    /// point, 1.0 when none match.
    pub fn classify(&self, lat: f64, lon: f64) -> Classification {
        let mut multiplier = 1.0;
        for zone in &self.zones {
            if !zone.bounds.contains(lat, lon) {
                continue;
            }
            match zone.kind {
                ZoneKind::NoFly => {
                    return Classification {
                        forbidden: true,
                        multiplier: f64::INFINITY,
                    };
                }
                ZoneKind::Sensitive { multiplier: m } => multiplier *= m,
            }
        }
        Classification {
            forbidden: false,
            multiplier,
        }
    }

    pub fn is_no_fly(&self, lat: f64, lon: f64) -> bool {
        self.classify(lat, lon).forbidden
    }

    /// Whether the straight segment between two points touches any no-fly
    /// zone. Exact for the axis-aligned rectangle zones in use.
    pub fn segment_crosses_no_fly(&self, from: (f64, f64), to: (f64, f64)) -> bool {
        self.zones.iter().any(|zone| {
            matches!(zone.kind, ZoneKind::NoFly) && zone.bounds.intersects_segment(from, to)
        })
    }
}
