//! Race calendar model.
//!
//! Reads races out of an Ergast-style `MRData.RaceTable.Races` payload. Races
//! are assumed to be listed in ascending date order; [`find_next_race`] returns
//! the first race (by scan) that starts after `now` and does not re-sort.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;

use crate::helpers::{json_array, json_f64, json_str};

const RACES_PATH: &[&str] = &["MRData", "RaceTable", "Races"];

/// Time assumed when a race or session has a date but no time.
const DEFAULT_TIME: &str = "00:00:00Z";

/// Start of one session of a race weekend.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTime {
    pub date: Option<String>,
    pub time: Option<String>,
}

impl SessionTime {
    fn from_json(value: Option<&Value>) -> Option<Self> {
        let value = value?;
        Some(Self {
            date: json_str(value, &["date"]).map(str::to_string),
            time: json_str(value, &["time"]).map(str::to_string),
        })
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        combine_date_time(self.date.as_deref(), self.time.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Circuit {
    pub id: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    /// Kept as the upstream string; see [`Circuit::coordinates`].
    pub lat: Option<String>,
    pub long: Option<String>,
    pub locality: Option<String>,
    pub country: Option<String>,
}

impl Circuit {
    /// Parsed `(lat, lon)`, or `None` if either is missing or not numeric.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = self.lat.as_deref()?.trim().parse::<f64>().ok()?;
        let lon = self.long.as_deref()?.trim().parse::<f64>().ok()?;
        (lat.is_finite() && lon.is_finite()).then_some((lat, lon))
    }
}

/// A race weekend as read from the schedule payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Race {
    pub season: Option<String>,
    pub round: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub circuit: Circuit,
    pub first_practice: Option<SessionTime>,
    pub second_practice: Option<SessionTime>,
    pub third_practice: Option<SessionTime>,
    pub qualifying: Option<SessionTime>,
    pub sprint_qualifying: Option<SessionTime>,
    pub sprint: Option<SessionTime>,
}

impl Race {
    /// Read a race from one entry of `Races`. Never fails; absent or
    /// mistyped fields become `None`.
    pub fn from_json(value: &Value) -> Self {
        let text = |path: &[&str]| json_str(value, path).map(str::to_string);
        // Ergast sends coordinates as strings, but accept numbers as well.
        let coord = |key: &str| {
            json_str(value, &["Circuit", "Location", key])
                .map(str::to_string)
                .or_else(|| json_f64(value, &["Circuit", "Location", key]).map(|n| n.to_string()))
        };

        Self {
            season: text(&["season"]),
            round: text(&["round"]),
            name: text(&["raceName"]),
            url: text(&["url"]),
            date: text(&["date"]),
            time: text(&["time"]),
            circuit: Circuit {
                id: text(&["Circuit", "circuitId"]),
                name: text(&["Circuit", "circuitName"]),
                url: text(&["Circuit", "url"]),
                lat: coord("lat"),
                long: coord("long"),
                locality: text(&["Circuit", "Location", "locality"]),
                country: text(&["Circuit", "Location", "country"]),
            },
            first_practice: SessionTime::from_json(value.get("FirstPractice")),
            second_practice: SessionTime::from_json(value.get("SecondPractice")),
            third_practice: SessionTime::from_json(value.get("ThirdPractice")),
            qualifying: SessionTime::from_json(value.get("Qualifying")),
            // Older seasons call the sprint qualifying session "SprintShootout".
            sprint_qualifying: SessionTime::from_json(
                value
                    .get("SprintQualifying")
                    .or_else(|| value.get("SprintShootout")),
            ),
            sprint: SessionTime::from_json(value.get("Sprint")),
        }
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        combine_date_time(self.date.as_deref(), self.time.as_deref())
    }

    /// Round number, if present and numeric.
    pub fn round_number(&self) -> Option<u32> {
        self.round.as_deref()?.trim().parse().ok()
    }
}

/// Combine an Ergast `date` (`YYYY-MM-DD`) and optional `time`
/// (`HH:MM:SS[Z|±hh:mm]`) into a UTC instant. A missing time means midnight UTC.
pub fn combine_date_time(date: Option<&str>, time: Option<&str>) -> Option<DateTime<Utc>> {
    let date = date?.trim();
    let time = time.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TIME);

    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{}T{}", date, time)) {
        return Some(dt.with_timezone(&Utc));
    }

    // Times without an offset are taken as UTC.
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let clock = NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .ok()?;
    Some(day.and_time(clock).and_utc())
}

/// Raw race entries of a schedule (or results) payload.
pub fn race_entries(payload: &Value) -> &[Value] {
    json_array(payload, RACES_PATH)
}

/// First race, in payload order, whose start is strictly after `now`.
///
/// Races with an unparsable start are skipped. `None` means the season has
/// no remaining races (or no data).
pub fn find_next_race(payload: Option<&Value>, now: DateTime<Utc>) -> Option<Race> {
    race_entries(payload?)
        .iter()
        .map(Race::from_json)
        .find(|race| race.start().is_some_and(|start| start > now))
}
