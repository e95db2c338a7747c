use std::str::FromStr;
use std::time::Duration;

use crate::services::sensors::SensorKind;

/// Refresh cadence for each F1 data source.
#[derive(Debug, Clone)]
pub struct RefreshIntervals {
    pub schedule: Duration,
    pub standings: Duration,
    pub last_race: Duration,
    pub season_results: Duration,
    pub qualifying: Duration,
}

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Ergast-compatible API root, without trailing slash.
    pub f1_api_base_url: String,
    /// met.no Locationforecast 2.0 root, without trailing slash.
    pub weather_api_base_url: String,
    pub weather_user_agent: String,
    /// Prefix for sensor entity names (`{prefix}_{key}`).
    pub sensor_name: String,
    pub enabled_sensors: Vec<SensorKind>,
    pub refresh: RefreshIntervals,
    /// Highest round number probed when resolving the qualifying source.
    pub qualifying_max_round: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", 8080),
            f1_api_base_url: env_url("F1_API_BASE_URL", "https://api.jolpi.ca/ergast/f1"),
            weather_api_base_url: env_url(
                "WEATHER_API_BASE_URL",
                "https://api.met.no/weatherapi/locationforecast/2.0",
            ),
            weather_user_agent: std::env::var("WEATHER_USER_AGENT")
                .unwrap_or_else(|_| "f1-sensor/0.1 github.com/f1-sensor/f1-sensor".to_string()),
            sensor_name: std::env::var("SENSOR_NAME").unwrap_or_else(|_| "F1".to_string()),
            enabled_sensors: std::env::var("ENABLED_SENSORS")
                .map(|raw| parse_enabled_sensors(&raw))
                .unwrap_or_else(|_| SensorKind::DEFAULT_ENABLED.to_vec()),
            refresh: RefreshIntervals {
                schedule: Duration::from_secs(env_or("SCHEDULE_REFRESH_SECS", 3600)),
                standings: Duration::from_secs(env_or("STANDINGS_REFRESH_SECS", 3600)),
                last_race: Duration::from_secs(env_or("LAST_RACE_REFRESH_SECS", 3600)),
                season_results: Duration::from_secs(env_or("SEASON_RESULTS_REFRESH_SECS", 21600)),
                qualifying: Duration::from_secs(env_or("QUALIFYING_REFRESH_SECS", 3600)),
            },
            qualifying_max_round: env_or("QUALIFYING_MAX_ROUND", 24),
        }
    }
}

/// Read and parse an environment variable, falling back to `default` when it
/// is unset or unparsable.
fn env_or<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value '{}' for {}, using default {}", raw, key, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_url(key: &str, default: &str) -> String {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Parse a comma-separated list of sensor keys. Unknown keys are skipped,
/// duplicates keep their first position.
pub fn parse_enabled_sensors(raw: &str) -> Vec<SensorKind> {
    let mut kinds = Vec::new();
    for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        match key.parse::<SensorKind>() {
            Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
            Ok(_) => {}
            Err(_) => tracing::warn!("Ignoring unknown sensor key '{}'", key),
        }
    }
    kinds
}
