//! Shared helpers for reading semi-structured JSON payloads.
//!
//! Upstream feeds are loosely typed: the Ergast schema encodes numbers as
//! strings (`"round": "5"`, `"lat": "26.0325"`) and omits keys freely. Every
//! helper here is total: a missing key, a wrong type or a `null` yields
//! `None` (or an empty slice), never a panic.

use serde_json::Value;

/// Walk a chain of object keys, returning `None` at the first missing step.
pub(crate) fn json_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Array at `path`, or an empty slice when absent or not an array.
pub(crate) fn json_array<'a>(value: &'a Value, path: &[&str]) -> &'a [Value] {
    json_path(value, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// String at `path`. Numbers are not coerced.
pub(crate) fn json_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    json_path(value, path).and_then(Value::as_str)
}

/// Value at `path` cloned for passthrough into attributes; `Null` when absent.
pub(crate) fn json_clone(value: &Value, path: &[&str]) -> Value {
    json_path(value, path).cloned().unwrap_or(Value::Null)
}

/// Numeric value at `path`, accepting both JSON numbers and numeric strings.
///
/// Non-finite results are rejected.
pub(crate) fn json_f64(value: &Value, path: &[&str]) -> Option<f64> {
    let v = json_path(value, path)?;
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_path_nested() {
        let v = json!({"MRData": {"RaceTable": {"season": "2025"}}});
        assert_eq!(
            json_path(&v, &["MRData", "RaceTable", "season"]),
            Some(&json!("2025"))
        );
        assert_eq!(json_path(&v, &["MRData", "StandingsTable"]), None);
    }

    #[test]
    fn test_json_path_through_non_object() {
        let v = json!({"MRData": "oops"});
        assert_eq!(json_path(&v, &["MRData", "RaceTable"]), None);
    }

    #[test]
    fn test_json_array_missing_is_empty() {
        let v = json!({"MRData": {}});
        assert!(json_array(&v, &["MRData", "RaceTable", "Races"]).is_empty());
    }

    #[test]
    fn test_json_array_wrong_type_is_empty() {
        let v = json!({"Races": {"not": "an array"}});
        assert!(json_array(&v, &["Races"]).is_empty());
    }

    #[test]
    fn test_json_f64_accepts_strings() {
        let v = json!({"lat": "26.0325", "long": 50.5106, "bad": "north"});
        assert_eq!(json_f64(&v, &["lat"]), Some(26.0325));
        assert_eq!(json_f64(&v, &["long"]), Some(50.5106));
        assert_eq!(json_f64(&v, &["bad"]), None);
        assert_eq!(json_f64(&v, &["missing"]), None);
    }

    #[test]
    fn test_json_f64_rejects_non_finite() {
        let v = json!({"x": "NaN", "y": "inf"});
        assert_eq!(json_f64(&v, &["x"]), None);
        assert_eq!(json_f64(&v, &["y"]), None);
    }

    #[test]
    fn test_json_clone_absent_is_null() {
        let v = json!({"a": [1, 2]});
        assert_eq!(json_clone(&v, &["a"]), json!([1, 2]));
        assert_eq!(json_clone(&v, &["b"]), Value::Null);
    }
}
