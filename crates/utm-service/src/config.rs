//! Environment overrides for the core configuration.

use std::env;

use utm_core::UtmConfig;

/// Build a config from the defaults, overridden by `UTM_*` environment
/// variables where present. Zone sets and bounds are structured data and
/// are supplied programmatically via `UtmConfig` (which is serde-enabled)
/// rather than through the environment.
pub fn load_from_env() -> UtmConfig {
    let mut config = UtmConfig::default();
    if let Some(v) = env_f64("UTM_GRID_RESOLUTION_M") {
        config.grid_resolution_m = v;
    }
    if let Some(v) = env_f64("UTM_TIME_RESOLUTION_S") {
        config.time_resolution_s = v;
    }
    if let Some(v) = env_f64("UTM_HORIZONTAL_SEPARATION_M") {
        config.horizontal_separation_m = v;
    }
    if let Some(v) = env_f64("UTM_VERTICAL_SEPARATION_M") {
        config.vertical_separation_m = v;
    }
    if let Some(v) = env_f64("UTM_DRONE_MAX_SPEED_MPS") {
        config.drone_max_speed_mps = v;
    }
    if let Some(v) = env_f64("UTM_DRONE_CRUISE_SPEED_MPS") {
        config.drone_cruise_speed_mps = v;
    }
    if let Some(v) = env_parse::<usize>("UTM_MAX_EXPANSIONS") {
        config.max_expansions = v;
    }
    if let Some(v) = env_parse::<u32>("UTM_MAX_RESOLVE_RETRIES") {
        config.max_resolve_retries = v;
    }
    if let Some(v) = env_f64("UTM_SPEED_MIN_RATIO") {
        config.speed_min_ratio = v;
    }
    if let Some(v) = env_f64("UTM_DYNAMIC_PENALTY_M") {
        config.dynamic_penalty_m = v;
    }
    if let Some(v) = env_f64("UTM_REQUEST_DEADLINE_S") {
        config.request_deadline_s = v;
    }
    if let Some(v) = env_f64("UTM_PICKUP_DWELL_S") {
        config.pickup_dwell_s = v;
    }
    config
}

fn env_f64(key: &str) -> Option<f64> {
    env_parse(key)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}
