//! Sensor derivations.
//!
//! Every function here is a pure read over a cached payload: it returns the
//! sensor's display value and attributes, recomputed on each call. Missing or
//! mistyped upstream fields become `null`, `0` or empty attributes; nothing in
//! this module can fail.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::helpers::{json_array, json_clone, json_str};
use crate::services::schedule::{find_next_race, race_entries, SessionTime};

const STANDINGS_LISTS_PATH: &[&str] = &["MRData", "StandingsTable", "StandingsLists"];

/// Display value plus attributes of one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Display value (`null` when unknown)
    pub state: Value,
    pub attributes: Map<String, Value>,
}

impl Reading {
    pub fn new(state: Value, attributes: Map<String, Value>) -> Self {
        Self { state, attributes }
    }

    /// No data: `null` state, no attributes.
    pub fn unknown() -> Self {
        Self::new(Value::Null, Map::new())
    }
}

fn iso(dt: Option<DateTime<Utc>>) -> Value {
    dt.map(|d| Value::String(d.to_rfc3339()))
        .unwrap_or(Value::Null)
}

fn session_start(session: &Option<SessionTime>) -> Value {
    iso(session.as_ref().and_then(SessionTime::start))
}

fn text(s: &Option<String>) -> Value {
    s.clone().map(Value::String).unwrap_or(Value::Null)
}

/// Next race: start time plus race, circuit and session details.
pub fn next_race(payload: Option<&Value>, now: DateTime<Utc>) -> Reading {
    let Some(race) = find_next_race(payload, now) else {
        return Reading::unknown();
    };

    let mut attrs = Map::new();
    attrs.insert("season".into(), text(&race.season));
    attrs.insert("round".into(), text(&race.round));
    attrs.insert("race_name".into(), text(&race.name));
    attrs.insert("race_url".into(), text(&race.url));
    attrs.insert("circuit_id".into(), text(&race.circuit.id));
    attrs.insert("circuit_name".into(), text(&race.circuit.name));
    attrs.insert("circuit_url".into(), text(&race.circuit.url));
    attrs.insert("circuit_lat".into(), text(&race.circuit.lat));
    attrs.insert("circuit_long".into(), text(&race.circuit.long));
    attrs.insert("circuit_locality".into(), text(&race.circuit.locality));
    attrs.insert("circuit_country".into(), text(&race.circuit.country));
    attrs.insert("race_start".into(), iso(race.start()));
    attrs.insert("first_practice_start".into(), session_start(&race.first_practice));
    attrs.insert("second_practice_start".into(), session_start(&race.second_practice));
    attrs.insert("third_practice_start".into(), session_start(&race.third_practice));
    attrs.insert("qualifying_start".into(), session_start(&race.qualifying));
    attrs.insert(
        "sprint_qualifying_start".into(),
        session_start(&race.sprint_qualifying),
    );
    attrs.insert("sprint_start".into(), session_start(&race.sprint));

    Reading::new(iso(race.start()), attrs)
}

/// Current season: number of races, with the raw race list passed through.
pub fn current_season(payload: Option<&Value>) -> Reading {
    let empty = Value::Null;
    let payload = payload.unwrap_or(&empty);
    let races = race_entries(payload);

    let mut attrs = Map::new();
    attrs.insert(
        "season".into(),
        json_clone(payload, &["MRData", "RaceTable", "season"]),
    );
    attrs.insert("races".into(), Value::Array(races.to_vec()));

    Reading::new(json!(races.len()), attrs)
}

/// Standings from the first standings list only. `entries_key` is the
/// upstream list name (`DriverStandings` / `ConstructorStandings`),
/// `attribute` the attribute it is exposed under.
fn standings(payload: Option<&Value>, entries_key: &str, attribute: &str) -> Reading {
    let lists = payload.map(|p| json_array(p, STANDINGS_LISTS_PATH)).unwrap_or(&[]);
    let Some(first) = lists.first() else {
        return Reading::new(json!(0), Map::new());
    };

    let entries = json_array(first, &[entries_key]);
    let mut attrs = Map::new();
    attrs.insert("season".into(), json_clone(first, &["season"]));
    attrs.insert("round".into(), json_clone(first, &["round"]));
    attrs.insert(attribute.into(), Value::Array(entries.to_vec()));

    Reading::new(json!(entries.len()), attrs)
}

pub fn driver_standings(payload: Option<&Value>) -> Reading {
    standings(payload, "DriverStandings", "driver_standings")
}

pub fn constructor_standings(payload: Option<&Value>) -> Reading {
    standings(payload, "ConstructorStandings", "constructor_standings")
}

fn driver_summary(entry: &Value) -> Value {
    json!({
        "permanentNumber": json_clone(entry, &["Driver", "permanentNumber"]),
        "code": json_clone(entry, &["Driver", "code"]),
        "givenName": json_clone(entry, &["Driver", "givenName"]),
        "familyName": json_clone(entry, &["Driver", "familyName"]),
    })
}

fn constructor_summary(entry: &Value) -> Value {
    json!({
        "constructorId": json_clone(entry, &["Constructor", "constructorId"]),
        "name": json_clone(entry, &["Constructor", "name"]),
    })
}

/// Reduce a race result entry to the fields exposed as attributes.
/// Everything else upstream sends (lap times, grid, fastest lap) is dropped.
pub fn normalize_result(entry: &Value) -> Value {
    json!({
        "number": json_clone(entry, &["number"]),
        "position": json_clone(entry, &["position"]),
        "points": json_clone(entry, &["points"]),
        "status": json_clone(entry, &["status"]),
        "driver": driver_summary(entry),
        "constructor": constructor_summary(entry),
    })
}

/// Reduce a qualifying result entry to the fields exposed as attributes.
pub fn normalize_qualifying_result(entry: &Value) -> Value {
    json!({
        "number": json_clone(entry, &["number"]),
        "position": json_clone(entry, &["position"]),
        "q1": json_clone(entry, &["Q1"]),
        "q2": json_clone(entry, &["Q2"]),
        "q3": json_clone(entry, &["Q3"]),
        "driver": driver_summary(entry),
        "constructor": constructor_summary(entry),
    })
}

/// Family name of the first entry whose `field` equals `"1"`.
fn family_name_of_first(entries: &[Value], field: &str) -> Value {
    entries
        .iter()
        .find(|r| json_str(r, &[field]) == Some("1"))
        .and_then(|r| json_str(r, &["Driver", "familyName"]))
        .map(|name| Value::String(name.to_string()))
        .unwrap_or(Value::Null)
}

/// Last race: winner's family name, with normalized results.
pub fn last_race_results(payload: Option<&Value>) -> Reading {
    let Some(race) = payload.and_then(|p| race_entries(p).first()) else {
        return Reading::unknown();
    };

    let results = json_array(race, &["Results"]);
    let mut attrs = Map::new();
    attrs.insert("round".into(), json_clone(race, &["round"]));
    attrs.insert("race_name".into(), json_clone(race, &["raceName"]));
    attrs.insert(
        "results".into(),
        Value::Array(results.iter().map(normalize_result).collect()),
    );

    Reading::new(family_name_of_first(results, "positionText"), attrs)
}

/// Season results: number of races with results, each normalized.
pub fn season_results(payload: Option<&Value>) -> Reading {
    let races = payload.map(race_entries).unwrap_or(&[]);

    let cleaned: Vec<Value> = races
        .iter()
        .map(|race| {
            json!({
                "round": json_clone(race, &["round"]),
                "race_name": json_clone(race, &["raceName"]),
                "results": json_array(race, &["Results"])
                    .iter()
                    .map(normalize_result)
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    let mut attrs = Map::new();
    attrs.insert("races".into(), Value::Array(cleaned));
    Reading::new(json!(races.len()), attrs)
}

/// Last qualifying: pole sitter's family name, with normalized results.
pub fn last_qualifying(payload: Option<&Value>) -> Reading {
    let Some(race) = payload.and_then(|p| race_entries(p).first()) else {
        return Reading::unknown();
    };

    let results = json_array(race, &["QualifyingResults"]);
    let mut attrs = Map::new();
    attrs.insert("round".into(), json_clone(race, &["round"]));
    attrs.insert("race_name".into(), json_clone(race, &["raceName"]));
    attrs.insert(
        "results".into(),
        Value::Array(results.iter().map(normalize_qualifying_result).collect()),
    );

    Reading::new(family_name_of_first(results, "position"), attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn schedule() -> Value {
        json!({"MRData": {"RaceTable": {"season": "2025", "Races": [
            {
                "season": "2025", "round": "2", "raceName": "Past GP",
                "date": "2025-03-01", "time": "14:00:00Z"
            },
            {
                "season": "2025", "round": "4", "raceName": "Bahrain Grand Prix",
                "url": "https://example.org/bahrain",
                "date": "2025-04-13", "time": "15:00:00Z",
                "Circuit": {
                    "circuitId": "bahrain",
                    "circuitName": "Bahrain International Circuit",
                    "Location": {"lat": "26.0325", "long": "50.5106",
                                 "locality": "Sakhir", "country": "Bahrain"}
                },
                "FirstPractice": {"date": "2025-04-11", "time": "11:30:00Z"},
                "SecondPractice": {"date": "2025-04-11"},
                "Qualifying": {"time": "16:00:00Z"}
            }
        ]}}})
    }

    fn result(position: &str, family: &str) -> Value {
        json!({
            "number": "1", "position": position, "positionText": position,
            "points": "25", "status": "Finished", "grid": "3", "laps": "57",
            "Driver": {"driverId": "x", "permanentNumber": "33", "code": "VER",
                       "givenName": "Max", "familyName": family, "nationality": "Dutch"},
            "Constructor": {"constructorId": "red_bull", "name": "Red Bull", "url": "u"},
            "Time": {"millis": "5000000", "time": "1:23:45"},
            "FastestLap": {"rank": "1"}
        })
    }

    #[test]
    fn test_next_race_scenario() {
        let payload = schedule();
        let reading = next_race(Some(&payload), utc("2025-04-01T00:00:00Z"));

        assert_eq!(reading.state, json!("2025-04-13T15:00:00+00:00"));
        assert_eq!(reading.attributes["round"], json!("4"));
        assert_eq!(reading.attributes["race_name"], json!("Bahrain Grand Prix"));
        assert_eq!(reading.attributes["circuit_lat"], json!("26.0325"));
        assert_eq!(reading.attributes["circuit_country"], json!("Bahrain"));
        assert_eq!(
            reading.attributes["first_practice_start"],
            json!("2025-04-11T11:30:00+00:00")
        );
        // Date without time: midnight UTC.
        assert_eq!(
            reading.attributes["second_practice_start"],
            json!("2025-04-11T00:00:00+00:00")
        );
        // Time without date and missing sessions: null.
        assert_eq!(reading.attributes["qualifying_start"], Value::Null);
        assert_eq!(reading.attributes["sprint_start"], Value::Null);
        assert_eq!(reading.attributes["third_practice_start"], Value::Null);
    }

    #[test]
    fn test_next_race_none_remaining() {
        let payload = schedule();
        assert_eq!(
            next_race(Some(&payload), utc("2026-01-01T00:00:00Z")),
            Reading::unknown()
        );
        assert_eq!(next_race(None, Utc::now()), Reading::unknown());
    }

    #[test]
    fn test_next_race_missing_circuit_fields_are_null() {
        let payload = json!({"MRData": {"RaceTable": {"Races": [
            {"round": "9", "date": "2099-06-01", "Circuit": {"Location": null}}
        ]}}});
        let reading = next_race(Some(&payload), Utc::now());
        assert_eq!(reading.state, json!("2099-06-01T00:00:00+00:00"));
        assert_eq!(reading.attributes["circuit_name"], Value::Null);
        assert_eq!(reading.attributes["circuit_lat"], Value::Null);
        assert_eq!(reading.attributes["season"], Value::Null);
    }

    #[test]
    fn test_current_season() {
        let payload = schedule();
        let reading = current_season(Some(&payload));
        assert_eq!(reading.state, json!(2));
        assert_eq!(reading.attributes["season"], json!("2025"));
        assert_eq!(reading.attributes["races"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_current_season_absent() {
        let reading = current_season(None);
        assert_eq!(reading.state, json!(0));
        assert_eq!(reading.attributes["season"], Value::Null);
        assert_eq!(reading.attributes["races"], json!([]));
    }

    #[test]
    fn test_driver_standings() {
        let payload = json!({"MRData": {"StandingsTable": {"StandingsLists": [
            {"season": "2025", "round": "5", "DriverStandings": [
                {"position": "1", "points": "100"},
                {"position": "2", "points": "90"}
            ]},
            {"season": "2024", "round": "24", "DriverStandings": [{}, {}, {}]}
        ]}}});
        let reading = driver_standings(Some(&payload));
        assert_eq!(reading.state, json!(2));
        assert_eq!(reading.attributes["season"], json!("2025"));
        assert_eq!(reading.attributes["round"], json!("5"));
        assert_eq!(
            reading.attributes["driver_standings"][0]["points"],
            json!("100")
        );
    }

    #[test]
    fn test_constructor_standings_empty_lists() {
        let payload = json!({"MRData": {"StandingsTable": {"StandingsLists": []}}});
        let reading = constructor_standings(Some(&payload));
        assert_eq!(reading.state, json!(0));
        assert!(reading.attributes.is_empty());

        let reading = constructor_standings(None);
        assert_eq!(reading.state, json!(0));
        assert!(reading.attributes.is_empty());
    }

    #[test]
    fn test_constructor_standings_list_without_entries() {
        let payload = json!({"MRData": {"StandingsTable": {"StandingsLists": [
            {"season": "2025", "round": "1"}
        ]}}});
        let reading = constructor_standings(Some(&payload));
        assert_eq!(reading.state, json!(0));
        assert_eq!(reading.attributes["constructor_standings"], json!([]));
    }

    #[test]
    fn test_last_race_winner() {
        let payload = json!({"MRData": {"RaceTable": {"Races": [{
            "round": "5", "raceName": "Saudi Arabian Grand Prix",
            "Results": [
                {"positionText": "2", "Driver": {"familyName": "Norris"}},
                {"positionText": "1", "Driver": {"familyName": "Verstappen"}}
            ]
        }]}}});
        let reading = last_race_results(Some(&payload));
        assert_eq!(reading.state, json!("Verstappen"));
        assert_eq!(reading.attributes["round"], json!("5"));
        assert_eq!(
            reading.attributes["race_name"],
            json!("Saudi Arabian Grand Prix")
        );
        assert_eq!(reading.attributes["results"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_last_race_without_winner_or_races() {
        let payload = json!({"MRData": {"RaceTable": {"Races": [{
            "round": "5", "Results": [{"positionText": "R"}]
        }]}}});
        assert_eq!(last_race_results(Some(&payload)).state, Value::Null);

        let empty = json!({"MRData": {"RaceTable": {"Races": []}}});
        assert_eq!(last_race_results(Some(&empty)), Reading::unknown());
        assert_eq!(last_race_results(None), Reading::unknown());
    }

    #[test]
    fn test_normalize_result_drops_extra_fields() {
        let normalized = normalize_result(&result("1", "Verstappen"));
        assert_eq!(
            normalized,
            json!({
                "number": "1",
                "position": "1",
                "points": "25",
                "status": "Finished",
                "driver": {"permanentNumber": "33", "code": "VER",
                           "givenName": "Max", "familyName": "Verstappen"},
                "constructor": {"constructorId": "red_bull", "name": "Red Bull"}
            })
        );
    }

    #[test]
    fn test_normalize_result_is_deterministic() {
        let raw = result("3", "Leclerc");
        assert_eq!(normalize_result(&raw), normalize_result(&raw));
    }

    #[test]
    fn test_normalize_result_malformed_entry() {
        let normalized = normalize_result(&json!({"Driver": "?", "points": 3}));
        assert_eq!(normalized["points"], json!(3));
        assert_eq!(normalized["driver"]["familyName"], Value::Null);
        assert_eq!(normalized["constructor"]["name"], Value::Null);
    }

    #[test]
    fn test_season_results() {
        let payload = json!({"MRData": {"RaceTable": {"Races": [
            {"round": "1", "raceName": "A", "Results": [result("1", "Verstappen")]},
            {"round": "2", "raceName": "B"}
        ]}}});
        let reading = season_results(Some(&payload));
        assert_eq!(reading.state, json!(2));
        let races = reading.attributes["races"].as_array().unwrap();
        assert_eq!(races[0]["race_name"], json!("A"));
        assert_eq!(
            races[0]["results"][0]["driver"]["familyName"],
            json!("Verstappen")
        );
        assert_eq!(races[1]["results"], json!([]));
    }

    #[test]
    fn test_season_results_absent() {
        let reading = season_results(None);
        assert_eq!(reading.state, json!(0));
        assert_eq!(reading.attributes["races"], json!([]));
    }

    #[test]
    fn test_last_qualifying_pole() {
        let payload = json!({"MRData": {"RaceTable": {"Races": [{
            "round": "4", "raceName": "Bahrain Grand Prix",
            "QualifyingResults": [
                {"position": "1", "number": "81", "Q1": "1:30.1", "Q2": "1:29.9", "Q3": "1:29.5",
                 "Driver": {"familyName": "Piastri"}, "Constructor": {"constructorId": "mclaren"}},
                {"position": "2", "Driver": {"familyName": "Russell"}}
            ]
        }]}}});
        let reading = last_qualifying(Some(&payload));
        assert_eq!(reading.state, json!("Piastri"));
        let first = &reading.attributes["results"][0];
        assert_eq!(first["q3"], json!("1:29.5"));
        assert_eq!(first["constructor"]["constructorId"], json!("mclaren"));
        assert_eq!(reading.attributes["results"][1]["q1"], Value::Null);
    }
}
