use std::path::PathBuf;

use boat_ingest_core::PolicyConfig;
use time::Duration;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub policy: PolicyConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = get("BOAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let mut policy = PolicyConfig::default();
        if let Some(secs) = parse_num::<i64>(&get, "BOAT_REMEMBER_DELAY_S", |s| *s >= 0) {
            policy.remember_delay = Duration::seconds(secs);
        }
        let radius_ok = |r: &f64| r.is_finite() && *r >= 0.0;
        if let Some(radius) = parse_num::<f64>(&get, "BOAT_LAP_RADIUS_M", radius_ok) {
            policy.engine.lap_radius_m = radius;
        }

        Self { data_dir, policy }
    }
}

fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boat-live")
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    valid: impl Fn(&T) -> bool,
) -> Option<T> {
    let raw = get(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) if valid(&v) => Some(v),
        _ => {
            warn!(key, value = %raw, "ignoring invalid setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg.policy.remember_delay, Duration::seconds(60));
        assert_eq!(cfg.policy.engine.lap_radius_m, 20.0);
        assert!(cfg.data_dir.ends_with("boat-live"));
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("BOAT_DATA_DIR", "/var/lib/boat"),
            ("BOAT_REMEMBER_DELAY_S", "15"),
            ("BOAT_LAP_RADIUS_M", "twenty"),
        ]));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/boat"));
        assert_eq!(cfg.policy.remember_delay, Duration::seconds(15));
        assert_eq!(cfg.policy.engine.lap_radius_m, 20.0);
    }

    #[test]
    fn test_negative_values_fall_back() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("BOAT_REMEMBER_DELAY_S", "-5"),
            ("BOAT_LAP_RADIUS_M", "-1.5"),
        ]));
        assert_eq!(cfg.policy.remember_delay, Duration::seconds(60));
        assert_eq!(cfg.policy.engine.lap_radius_m, 20.0);

        let cfg = AppConfig::from_lookup(lookup(&[("BOAT_REMEMBER_DELAY_S", "0")]));
        assert_eq!(cfg.policy.remember_delay, Duration::ZERO);
    }
}
