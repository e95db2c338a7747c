//! Sensor hub: the set of enabled sensors and the sources they read from.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::services::coordinator::{RemoteEndpoint, SourceCoordinator};
use crate::services::derive::{self, Reading};
use crate::services::fetcher::JsonFetcher;
use crate::services::qualifying::{resolve_qualifying_round, QualifyingProbe};
use crate::services::weather::WeatherSensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    NextRace,
    CurrentSeason,
    DriverStandings,
    ConstructorStandings,
    Weather,
    LastRaceResults,
    SeasonResults,
    LastQualifying,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown sensor key: {0}")]
pub struct UnknownSensorKey(pub String);

impl SensorKind {
    pub const ALL: [SensorKind; 8] = [
        SensorKind::NextRace,
        SensorKind::CurrentSeason,
        SensorKind::DriverStandings,
        SensorKind::ConstructorStandings,
        SensorKind::Weather,
        SensorKind::LastRaceResults,
        SensorKind::SeasonResults,
        SensorKind::LastQualifying,
    ];

    /// Enabled when `ENABLED_SENSORS` is unset. `last_qualifying` is opt-in.
    pub const DEFAULT_ENABLED: [SensorKind; 7] = [
        SensorKind::NextRace,
        SensorKind::CurrentSeason,
        SensorKind::DriverStandings,
        SensorKind::ConstructorStandings,
        SensorKind::Weather,
        SensorKind::LastRaceResults,
        SensorKind::SeasonResults,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SensorKind::NextRace => "next_race",
            SensorKind::CurrentSeason => "current_season",
            SensorKind::DriverStandings => "driver_standings",
            SensorKind::ConstructorStandings => "constructor_standings",
            SensorKind::Weather => "weather",
            SensorKind::LastRaceResults => "last_race_results",
            SensorKind::SeasonResults => "season_results",
            SensorKind::LastQualifying => "last_qualifying",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            SensorKind::NextRace => "mdi:flag-checkered",
            SensorKind::CurrentSeason => "mdi:calendar-month",
            SensorKind::DriverStandings => "mdi:account-multiple-check",
            SensorKind::ConstructorStandings => "mdi:factory",
            SensorKind::Weather => "mdi:weather-partly-cloudy",
            SensorKind::LastRaceResults => "mdi:trophy",
            SensorKind::SeasonResults => "mdi:podium",
            SensorKind::LastQualifying => "mdi:timer-outline",
        }
    }

    pub fn device_class(self) -> Option<&'static str> {
        match self {
            SensorKind::NextRace => Some("timestamp"),
            _ => None,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SensorKind {
    type Err = UnknownSensorKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| UnknownSensorKey(s.to_string()))
    }
}

/// One sensor as served over HTTP.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SensorReading {
    /// Sensor key, e.g. `next_race`
    pub key: String,
    /// Entity name (`{prefix}_{key}`)
    pub name: String,
    pub unique_id: String,
    pub icon: String,
    pub device_class: Option<String>,
    /// Whether the backing source currently has fresh data
    pub available: bool,
    /// Display value
    #[schema(value_type = Object)]
    pub state: Value,
    #[schema(value_type = Object)]
    pub attributes: Map<String, Value>,
}

/// The F1 data coordinators, one per upstream endpoint.
#[derive(Clone)]
pub struct Sources {
    pub schedule: Arc<SourceCoordinator>,
    pub driver_standings: Arc<SourceCoordinator>,
    pub constructor_standings: Arc<SourceCoordinator>,
    pub last_race: Arc<SourceCoordinator>,
    pub season_results: Arc<SourceCoordinator>,
    pub qualifying: Arc<SourceCoordinator>,
}

impl Sources {
    /// Build every coordinator and load it once, one after another. The
    /// qualifying round is resolved from the loaded schedule before the
    /// qualifying source is created.
    pub async fn start(
        config: &AppConfig,
        fetcher: Arc<dyn JsonFetcher>,
        now: DateTime<Utc>,
    ) -> Self {
        let base = &config.f1_api_base_url;
        let refresh = &config.refresh;

        let schedule = start_source(
            "race_schedule",
            format!("{}/current.json", base),
            refresh.schedule,
            &fetcher,
        )
        .await;
        let driver_standings = start_source(
            "driver_standings",
            format!("{}/current/driverstandings.json", base),
            refresh.standings,
            &fetcher,
        )
        .await;
        let constructor_standings = start_source(
            "constructor_standings",
            format!("{}/current/constructorstandings.json", base),
            refresh.standings,
            &fetcher,
        )
        .await;
        let last_race = start_source(
            "last_race_results",
            format!("{}/current/last/results.json", base),
            refresh.last_race,
            &fetcher,
        )
        .await;
        let season_results = start_source(
            "season_results",
            format!("{}/current/results.json?limit=100", base),
            refresh.season_results,
            &fetcher,
        )
        .await;

        let rounds = QualifyingProbe::new(base, config.qualifying_max_round);
        let schedule_payload = schedule.payload().await;
        let round =
            resolve_qualifying_round(fetcher.clone(), &rounds, schedule_payload.as_deref(), now)
                .await;
        let qualifying = start_source(
            "qualifying",
            rounds.url_for(round),
            refresh.qualifying,
            &fetcher,
        )
        .await;

        Self {
            schedule,
            driver_standings,
            constructor_standings,
            last_race,
            season_results,
            qualifying,
        }
    }

    pub fn all(&self) -> [&Arc<SourceCoordinator>; 6] {
        [
            &self.schedule,
            &self.driver_standings,
            &self.constructor_standings,
            &self.last_race,
            &self.season_results,
            &self.qualifying,
        ]
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<SourceCoordinator>> {
        self.all().into_iter().find(|c| c.name() == name)
    }
}

/// Build a coordinator and await its first refresh. A failed first refresh
/// is logged; the coordinator starts without data and retries on its timer.
async fn start_source(
    name: &str,
    url: String,
    refresh_interval: Duration,
    fetcher: &Arc<dyn JsonFetcher>,
) -> Arc<SourceCoordinator> {
    let coordinator =
        SourceCoordinator::new(name, RemoteEndpoint::new(url, refresh_interval), fetcher.clone());
    match coordinator.refresh().await {
        Ok(_) => tracing::info!("Source {}: initial data loaded", name),
        Err(e) => tracing::error!("Source {}: initial refresh failed: {}", name, e),
    }
    coordinator
}

/// Enabled sensors plus everything they read from. Cheap to clone; shared as
/// axum state.
#[derive(Clone)]
pub struct SensorHub {
    prefix: String,
    enabled: Vec<SensorKind>,
    sources: Sources,
    weather: Option<Arc<WeatherSensor>>,
}

impl SensorHub {
    pub fn new(
        prefix: impl Into<String>,
        enabled: Vec<SensorKind>,
        sources: Sources,
        weather: Option<Arc<WeatherSensor>>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            enabled,
            sources,
            weather,
        }
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub fn enabled(&self) -> &[SensorKind] {
        &self.enabled
    }

    pub fn is_enabled(&self, kind: SensorKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Read one sensor. `None` if it is not enabled.
    pub async fn read(&self, kind: SensorKind, now: DateTime<Utc>) -> Option<SensorReading> {
        if !self.is_enabled(kind) {
            return None;
        }

        let (available, reading) = match kind {
            SensorKind::Weather => match &self.weather {
                Some(weather) => (weather.has_data().await, weather.reading().await),
                None => (false, Reading::unknown()),
            },
            SensorKind::NextRace => self.derived(kind, |p| derive::next_race(p, now)).await,
            SensorKind::CurrentSeason => self.derived(kind, derive::current_season).await,
            SensorKind::DriverStandings => self.derived(kind, derive::driver_standings).await,
            SensorKind::ConstructorStandings => {
                self.derived(kind, derive::constructor_standings).await
            }
            SensorKind::LastRaceResults => self.derived(kind, derive::last_race_results).await,
            SensorKind::SeasonResults => self.derived(kind, derive::season_results).await,
            SensorKind::LastQualifying => self.derived(kind, derive::last_qualifying).await,
        };

        Some(SensorReading {
            key: kind.key().to_string(),
            name: format!("{}_{}", self.prefix, kind.key()),
            unique_id: format!("{}_{}_unique", self.prefix, kind.key()),
            icon: kind.icon().to_string(),
            device_class: kind.device_class().map(str::to_string),
            available,
            state: reading.state,
            attributes: reading.attributes,
        })
    }

    /// Every enabled sensor, in configuration order.
    pub async fn read_all(&self, now: DateTime<Utc>) -> Vec<SensorReading> {
        let mut readings = Vec::with_capacity(self.enabled.len());
        for &kind in &self.enabled {
            if let Some(reading) = self.read(kind, now).await {
                readings.push(reading);
            }
        }
        readings
    }

    /// Availability of the backing source plus the derivation over its payload.
    async fn derived(
        &self,
        kind: SensorKind,
        f: impl FnOnce(Option<&Value>) -> Reading,
    ) -> (bool, Reading) {
        let source = self.source_for(kind);
        let payload = source.payload().await;
        (source.is_available().await, f(payload.as_deref()))
    }

    fn source_for(&self, kind: SensorKind) -> &Arc<SourceCoordinator> {
        match kind {
            SensorKind::NextRace | SensorKind::CurrentSeason | SensorKind::Weather => {
                &self.sources.schedule
            }
            SensorKind::DriverStandings => &self.sources.driver_standings,
            SensorKind::ConstructorStandings => &self.sources.constructor_standings,
            SensorKind::LastRaceResults => &self.sources.last_race,
            SensorKind::SeasonResults => &self.sources.season_results,
            SensorKind::LastQualifying => &self.sources.qualifying,
        }
    }
}
