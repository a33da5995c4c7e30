//! Pure derivation of the live state: great-circle distance, the lap
//! geofence, and the step from (sample, previous state) to the next state.

use geo::{Distance, Geodesic, Point};
use model::*;
use tracing::{debug, info};

const SECONDS_PER_HOUR: f64 = 3600.0;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Geofence radius around the lap anchor, meters.
    pub lap_radius_m: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { lap_radius_m: 20.0 }
    }
}

/// Geodesic (WGS-84) distance in meters.
///
/// Exactly zero for coincident points and bit-for-bit symmetric: the pair is
/// put in a fixed order before it reaches the solver.
pub fn distance_m(a: Position, b: Position) -> f64 {
    if a == b {
        return 0.0;
    }
    let (a, b) = if (a.lat, a.lng) <= (b.lat, b.lng) {
        (a, b)
    } else {
        (b, a)
    };
    let d = Geodesic::distance(Point::new(a.lng, a.lat), Point::new(b.lng, b.lat));
    d.max(0.0)
}

pub fn distance_km(a: Position, b: Position) -> f64 {
    distance_m(a, b) / 1000.0
}

/// Entering-edge detector: true only when the previous position was outside
/// the radius and the current one is on or inside it.
pub fn crossed(anchor: Position, radius_m: f64, previous: Position, current: Position) -> bool {
    let prev_dist = distance_m(previous, anchor);
    let cur_dist = distance_m(current, anchor);
    prev_dist > radius_m && cur_dist <= radius_m
}

/// Derive the next live state from `sample`.
///
/// Speed divides by the elapsed time floored at one hour, so any interval
/// shorter than that reports `distance / 1h`.
pub fn derive(sample: &Sample, previous: Option<&State>, cfg: &EngineConfig) -> State {
    let prev = match previous {
        Some(p) => p,
        None => return State::baseline(sample.clone()),
    };

    let elapsed_s = (sample.created_at - prev.created_at()).as_seconds_f64();
    let delta_h = (elapsed_s / SECONDS_PER_HOUR).max(1.0);
    let d = distance_km(sample.position(), prev.position());

    let mut next = State {
        sample: sample.clone(),
        speed: d / delta_h,
        distance_travelled: prev.distance_travelled + d,
        laps: prev.laps,
        lap_anchor: prev.lap_anchor,
    };

    if let Some(anchor) = next.lap_anchor {
        if crossed(anchor, cfg.lap_radius_m, prev.position(), sample.position()) {
            next.laps += 1;
            info!(laps = next.laps, "lap geofence entered");
        }
    }

    debug!(
        speed = next.speed,
        distance = next.distance_travelled,
        laps = next.laps,
        "state derived"
    );
    next
}
