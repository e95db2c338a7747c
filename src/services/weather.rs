//! Race weather from the MET Norway Locationforecast 2.0 API.
//!
//! The weather sensor follows the race-schedule coordinator: it is updated
//! once when attached and again after every successful schedule refresh.
//! Each update resolves the next race, fetches the `compact` forecast for its
//! circuit and keeps two samples: "current" (first entry of the feed) and
//! "race day" (the entry on the race's UTC date closest to the start).
//! See: https://api.met.no/weatherapi/locationforecast/2.0/documentation

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, RwLock};

use crate::errors::ListenerError;
use crate::services::coordinator::{ListenerHandle, SourceCoordinator, SourcePayload};
use crate::services::derive::Reading;
use crate::services::fetcher::{JsonFetcher, FETCH_TIMEOUT};
use crate::services::schedule::find_next_race;

/// 16-point compass; north appears twice so that 350° rounds up to "N".
const COMPASS_POINTS: [(&str, f64); 17] = [
    ("N", 0.0),
    ("NNE", 22.5),
    ("NE", 45.0),
    ("ENE", 67.5),
    ("E", 90.0),
    ("ESE", 112.5),
    ("SE", 135.0),
    ("SSE", 157.5),
    ("S", 180.0),
    ("SSW", 202.5),
    ("SW", 225.0),
    ("WSW", 247.5),
    ("W", 270.0),
    ("WNW", 292.5),
    ("NW", 315.0),
    ("NNW", 337.5),
    ("N", 360.0),
];

/// Nearest compass point for a "wind from" direction in degrees.
/// Ties go to the point listed first.
pub fn compass_abbreviation(degrees: f64) -> Option<&'static str> {
    if !degrees.is_finite() {
        return None;
    }
    COMPASS_POINTS
        .iter()
        .min_by(|a, b| (a.1 - degrees).abs().total_cmp(&(b.1 - degrees).abs()))
        .map(|(name, _)| *name)
}

// --- met.no compact JSON response types ---
// Every field is optional: a missing key reads as `None`, a key of the wrong
// type fails the whole document.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetResponse {
    properties: MetProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetProperties {
    timeseries: Vec<MetTimeseries>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetTimeseries {
    time: Option<String>,
    data: MetData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetData {
    instant: MetInstant,
    next_1_hours: Option<MetPeriod>,
    next_6_hours: Option<MetPeriod>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetInstant {
    details: MetInstantDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetInstantDetails {
    air_temperature: Option<f64>,
    relative_humidity: Option<f64>,
    cloud_area_fraction: Option<f64>,
    wind_speed: Option<f64>,
    wind_from_direction: Option<f64>,
    precipitation_amount: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetPeriod {
    details: Option<MetPeriodDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetPeriodDetails {
    precipitation_amount: Option<f64>,
}

impl MetPeriod {
    fn precipitation(&self) -> Option<f64> {
        self.details.as_ref().and_then(|d| d.precipitation_amount)
    }
}

/// One forecast sample. All fields `None` means "no sample".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherSample {
    pub time: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub precipitation: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<&'static str>,
    pub wind_from_direction_degrees: Option<f64>,
}

impl WeatherSample {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Read one `timeseries` entry.
    fn from_entry(entry: &MetTimeseries) -> Self {
        let data = &entry.data;
        let instant = &data.instant.details;

        // Instant details first, then the 1 h period, then the 6 h period.
        let precipitation = instant
            .precipitation_amount
            .or_else(|| data.next_1_hours.as_ref().and_then(MetPeriod::precipitation))
            .or_else(|| data.next_6_hours.as_ref().and_then(MetPeriod::precipitation))
            .unwrap_or(0.0);

        Self {
            time: entry.time.clone(),
            temperature: instant.air_temperature,
            humidity: instant.relative_humidity,
            cloud_cover: instant.cloud_area_fraction,
            precipitation: Some(precipitation),
            wind_speed: instant.wind_speed,
            wind_direction: instant.wind_from_direction.and_then(compass_abbreviation),
            wind_from_direction_degrees: instant.wind_from_direction,
        }
    }

    fn write_attributes(&self, prefix: &str, attrs: &mut Map<String, Value>) {
        let unit = |u: &str| {
            if self.is_empty() {
                Value::Null
            } else {
                Value::String(u.to_string())
            }
        };
        let mut put = |key: &str, value: Value| {
            attrs.insert(format!("{}_{}", prefix, key), value);
        };

        put("time", json!(self.time));
        put("temperature", json!(self.temperature));
        put("temperature_unit", unit("celsius"));
        put("humidity", json!(self.humidity));
        put("humidity_unit", unit("%"));
        put("cloud_cover", json!(self.cloud_cover));
        put("cloud_cover_unit", unit("%"));
        put("precipitation", json!(self.precipitation));
        put("precipitation_unit", unit("mm"));
        put("wind_speed", json!(self.wind_speed));
        put("wind_speed_unit", unit("m/s"));
        put("wind_direction", json!(self.wind_direction));
        put("wind_from_direction_degrees", json!(self.wind_from_direction_degrees));
        put("wind_from_direction_unit", unit("degrees"));
    }
}

/// Result of one successful weather update.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherState {
    pub current: WeatherSample,
    pub race: WeatherSample,
}

impl WeatherState {
    /// Build both samples from a forecast. `Ok(None)` if the feed has no
    /// entries; an error if the document does not have the expected shape.
    pub fn from_forecast(
        forecast: &Value,
        race_start: Option<DateTime<Utc>>,
    ) -> Result<Option<Self>, serde_json::Error> {
        let response = MetResponse::deserialize(forecast)?;
        let timeseries = &response.properties.timeseries;

        let Some(first) = timeseries.first() else {
            return Ok(None);
        };
        let race = race_start
            .and_then(|start| race_day_entry(timeseries, start))
            .map(WeatherSample::from_entry)
            .unwrap_or_default();

        Ok(Some(Self {
            current: WeatherSample::from_entry(first),
            race,
        }))
    }

    pub fn reading(&self) -> Reading {
        let mut attrs = Map::new();
        self.current.write_attributes("current", &mut attrs);
        self.race.write_attributes("race", &mut attrs);
        Reading::new(json!(self.current.temperature), attrs)
    }
}

/// Entry on the same UTC date as `start` with the smallest time difference.
/// The earlier entry wins a tie.
fn race_day_entry(timeseries: &[MetTimeseries], start: DateTime<Utc>) -> Option<&MetTimeseries> {
    let race_date = start.date_naive();
    timeseries
        .iter()
        .filter_map(|entry| {
            let time = entry.time.as_deref()?;
            let time = DateTime::parse_from_rfc3339(time).ok()?.with_timezone(&Utc);
            (time.date_naive() == race_date).then_some((entry, time))
        })
        .min_by_key(|(_, time)| (*time - start).num_seconds().unsigned_abs())
        .map(|(entry, _)| entry)
}

pub fn forecast_url(base_url: &str, lat: f64, lon: f64) -> String {
    // met.no asks for at most 4 decimals.
    format!("{}/compact?lat={:.4}&lon={:.4}", base_url, lat, lon)
}

pub struct WeatherSensor {
    schedule: Arc<SourceCoordinator>,
    fetcher: Arc<dyn JsonFetcher>,
    base_url: String,
    state: RwLock<Option<WeatherState>>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl WeatherSensor {
    /// A sensor that is not yet following the schedule. See [`WeatherSensor::attach`].
    pub fn new(
        schedule: Arc<SourceCoordinator>,
        fetcher: Arc<dyn JsonFetcher>,
        base_url: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            schedule,
            fetcher,
            base_url: base_url.into(),
            state: RwLock::new(None),
            listener: Mutex::new(None),
        })
    }

    /// Create a sensor, register it on the schedule coordinator and run the
    /// first update. Must be called inside a tokio runtime.
    pub fn attach(
        schedule: Arc<SourceCoordinator>,
        fetcher: Arc<dyn JsonFetcher>,
        base_url: impl Into<String>,
    ) -> Arc<Self> {
        let sensor = Self::new(schedule.clone(), fetcher, base_url);
        let (tx, rx) = mpsc::unbounded_channel::<()>();

        let trigger = tx.clone();
        let handle = schedule.add_listener(Box::new(move |_: &SourcePayload| {
            trigger
                .send(())
                .map_err(|_| ListenerError::Failed("weather update task is gone".to_string()))
        }));
        *sensor.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        tokio::spawn(Self::update_loop(Arc::downgrade(&sensor), rx));
        // Initial update; the sender is dropped right after.
        let _ = tx.send(());

        tracing::info!(
            "Weather sensor attached to source {} ({} listeners)",
            schedule.name(),
            schedule.listener_count()
        );
        sensor
    }

    /// Runs until the listener (and with it the last sender) is gone or the
    /// sensor is dropped.
    async fn update_loop(sensor: Weak<Self>, mut rx: mpsc::UnboundedReceiver<()>) {
        while rx.recv().await.is_some() {
            let Some(sensor) = sensor.upgrade() else {
                break;
            };
            sensor.update(Utc::now()).await;
        }
        tracing::debug!("Weather update task stopped");
    }

    /// Stop following schedule refreshes. The last state is kept.
    pub fn detach(&self) {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.remove();
            tracing::info!("Weather sensor detached");
        }
    }

    /// One update cycle. Every failure is logged and leaves the prior state.
    pub async fn update(&self, now: DateTime<Utc>) {
        let schedule = self.schedule.payload().await;
        let Some(race) = find_next_race(schedule.as_deref(), now) else {
            tracing::debug!("Weather: no upcoming race, keeping previous state");
            return;
        };
        let Some((lat, lon)) = race.circuit.coordinates() else {
            tracing::debug!(
                "Weather: no coordinates for round {:?}, keeping previous state",
                race.round
            );
            return;
        };

        let url = forecast_url(&self.base_url, lat, lon);
        let forecast = match self.fetcher.fetch(&url, FETCH_TIMEOUT).await {
            Ok(forecast) => forecast,
            Err(e) => {
                tracing::warn!("Weather: forecast fetch failed: {}", e);
                return;
            }
        };

        match WeatherState::from_forecast(&forecast, race.start()) {
            Ok(Some(state)) => {
                tracing::debug!(
                    "Weather: updated for {} (race day sample: {})",
                    race.name.as_deref().unwrap_or("next race"),
                    !state.race.is_empty()
                );
                *self.state.write().await = Some(state);
            }
            Ok(None) => {
                tracing::warn!("Weather: forecast has no timeseries, keeping previous state")
            }
            Err(e) => tracing::warn!(
                "Weather: forecast structure error, keeping previous state: {}",
                e
            ),
        }
    }

    pub async fn state(&self) -> Option<WeatherState> {
        self.state.read().await.clone()
    }

    pub async fn has_data(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Display value (current temperature) and attributes.
    pub async fn reading(&self) -> Reading {
        self.state()
            .await
            .map(|state| state.reading())
            .unwrap_or_else(Reading::unknown)
    }
}

impl Drop for WeatherSensor {
    fn drop(&mut self) {
        self.detach();
    }
}
