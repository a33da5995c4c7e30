use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A point on the globe, degrees.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite, latitude within ±90 and longitude within ±180.
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("position out of range: lat {lat}, lng {lng}")]
pub struct PositionOutOfRange {
    pub lat: f64,
    pub lng: f64,
}

/// One raw telemetry frame as sent by the boat.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    // electrical
    pub controller_watts: i32,
    pub time_to_go: i64,
    pub controller_volts: f64,
    pub mppt_volts: f64,
    pub mppt_watts: f64,

    // mechanical
    pub motor_temp: f64,
    pub motor_revolutions: f64,

    pub position_lat: f64,
    pub position_lng: f64,
}

impl Sample {
    pub fn position(&self) -> Position {
        Position::new(self.position_lat, self.position_lng)
    }

    pub fn check_position(&self) -> Result<Position, PositionOutOfRange> {
        let p = self.position();
        if p.in_range() {
            Ok(p)
        } else {
            Err(PositionOutOfRange { lat: p.lat, lng: p.lng })
        }
    }
}

/// The live record derived from a sample and its predecessor.
///
/// On the wire the anchor is flattened into `lapAnchorLat`/`lapAnchorLng`,
/// which must be given together or not at all.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StateWire", into = "StateWire")]
pub struct State {
    pub sample: Sample,
    /// km/h
    pub speed: f64,
    /// km
    pub distance_travelled: f64,
    pub laps: u32,
    pub lap_anchor: Option<Position>,
}

impl State {
    /// Baseline state for a sample with no history behind it.
    pub fn baseline(sample: Sample) -> Self {
        Self {
            sample,
            speed: 0.0,
            distance_travelled: 0.0,
            laps: 0,
            lap_anchor: None,
        }
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.sample.created_at
    }

    pub fn position(&self) -> Position {
        self.sample.position()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateWire {
    #[serde(flatten)]
    sample: Sample,
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    distance_travelled: f64,
    #[serde(default)]
    laps: u32,
    #[serde(default)]
    lap_anchor_lat: Option<f64>,
    #[serde(default)]
    lap_anchor_lng: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
#[error("lapAnchorLat and lapAnchorLng must be set together")]
pub struct HalfAnchor;

impl TryFrom<StateWire> for State {
    type Error = HalfAnchor;

    fn try_from(w: StateWire) -> Result<Self, Self::Error> {
        let lap_anchor = match (w.lap_anchor_lat, w.lap_anchor_lng) {
            (Some(lat), Some(lng)) => Some(Position::new(lat, lng)),
            (None, None) => None,
            _ => return Err(HalfAnchor),
        };
        Ok(State {
            sample: w.sample,
            speed: w.speed,
            distance_travelled: w.distance_travelled,
            laps: w.laps,
            lap_anchor,
        })
    }
}

impl From<State> for StateWire {
    fn from(s: State) -> Self {
        StateWire {
            sample: s.sample,
            speed: s.speed,
            distance_travelled: s.distance_travelled,
            laps: s.laps,
            lap_anchor_lat: s.lap_anchor.map(|p| p.lat),
            lap_anchor_lng: s.lap_anchor.map(|p| p.lng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use time::macros::datetime;

    fn sample_json() -> Value {
        json!({
            "createdAt": "2024-06-01T12:00:00Z",
            "controllerWatts": 850,
            "timeToGo": 5400,
            "controllerVolts": 48.2,
            "mpptVolts": 52.1,
            "mpptWatts": 310.5,
            "motorTemp": 41.0,
            "motorRevolutions": 1200.0,
            "positionLat": 59.9386,
            "positionLng": 30.3141
        })
    }

    #[test]
    fn test_sample_from_wire() {
        let s: Sample = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(s.created_at, datetime!(2024-06-01 12:00:00 UTC));
        assert_eq!(s.controller_watts, 850);
        assert_eq!(s.position(), Position::new(59.9386, 30.3141));
    }

    #[test]
    fn test_sample_missing_field_rejected() {
        let mut v = sample_json();
        v.as_object_mut().unwrap().remove("motorTemp");
        assert!(serde_json::from_value::<Sample>(v).is_err());
    }

    #[test]
    fn test_position_range() {
        let mut s: Sample = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(s.check_position(), Ok(Position::new(59.9386, 30.3141)));

        s.position_lat = 95.0;
        let err = s.check_position().unwrap_err();
        assert_eq!(err, PositionOutOfRange { lat: 95.0, lng: 30.3141 });

        s.position_lat = 90.0;
        s.position_lng = -180.5;
        assert!(s.check_position().is_err());
        s.position_lng = f64::NAN;
        assert!(s.check_position().is_err());
        assert!(Position::new(-90.0, 180.0).in_range());
    }

    #[test]
    fn test_state_without_anchor_defaults() {
        let st: State = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(st.speed, 0.0);
        assert_eq!(st.distance_travelled, 0.0);
        assert_eq!(st.laps, 0);
        assert!(st.lap_anchor.is_none());

        let out = serde_json::to_value(&st).unwrap();
        assert_eq!(out["positionLat"], json!(59.9386));
        assert_eq!(out["lapAnchorLat"], Value::Null);
    }

    #[test]
    fn test_state_anchor_flattened() {
        let mut v = sample_json();
        let o = v.as_object_mut().unwrap();
        o.insert("laps".into(), json!(3));
        o.insert("distanceTravelled".into(), json!(12.5));
        o.insert("lapAnchorLat".into(), json!(59.9));
        o.insert("lapAnchorLng".into(), json!(30.3));

        let st: State = serde_json::from_value(v).unwrap();
        assert_eq!(st.laps, 3);
        assert_eq!(st.lap_anchor, Some(Position::new(59.9, 30.3)));

        let back: State = serde_json::from_str(&serde_json::to_string(&st).unwrap()).unwrap();
        assert_eq!(back, st);
    }

    #[test]
    fn test_state_half_anchor_rejected() {
        let mut v = sample_json();
        v.as_object_mut()
            .unwrap()
            .insert("lapAnchorLat".into(), json!(59.9));
        assert!(serde_json::from_value::<State>(v).is_err());
    }
}
