//! Defensive parsing for untrusted feed bodies.

use serde_json::Value;

use strato_common::{RawObservation, TrackError, TrackResult};

/// Parse a feed body into validated observations.
///
/// The body must be a JSON array; anything else is `UpstreamCorrupt`.
/// Individual records that are not exactly three finite in-range numbers
/// are dropped and counted, never propagated.
pub fn parse_observations(body: &str) -> TrackResult<(Vec<RawObservation>, usize)> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| TrackError::UpstreamCorrupt(format!("not JSON: {}", e)))?;

    let records = match value {
        Value::Array(records) => records,
        other => {
            return Err(TrackError::UpstreamCorrupt(format!(
                "expected array, got {}",
                json_type(&other)
            )))
        }
    };

    let mut observations = Vec::with_capacity(records.len());
    let mut dropped = 0usize;

    for record in records {
        match parse_record(&record) {
            Some(obs) => observations.push(obs),
            None => dropped += 1,
        }
    }

    Ok((observations, dropped))
}

fn parse_record(record: &Value) -> Option<RawObservation> {
    let triple = record.as_array()?;
    if triple.len() != 3 {
        return None;
    }

    let lat = triple[0].as_f64()?;
    let lon = triple[1].as_f64()?;
    let alt_km = triple[2].as_f64()?;

    let obs = RawObservation::new(lat, lon, alt_km);
    obs.is_valid().then_some(obs)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_body() {
        let body = r#"[[45.0, -120.5, 18.2], [-10.25, 30.0, 12.9]]"#;
        let (observations, dropped) = parse_observations(body).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(dropped, 0);
        assert_eq!(observations[0].lat, 45.0);
    }

    #[test]
    fn test_mixed_corruption_is_filtered() {
        // Non-arrays, wrong arity, non-numeric, NaN-as-string, out-of-range.
        let body = r#"[
            [45.0, -120.5, 18.2],
            "garbage",
            {"lat": 1.0},
            [1.0, 2.0],
            [1.0, 2.0, 3.0, 4.0],
            [1.0, "x", 3.0],
            [95.0, 0.0, 18.0],
            [0.0, 190.0, 18.0],
            [0.0, 0.0, 200.0],
            [0.0, 0.0, 0.0],
            null,
            [-10.25, 30.0, 12.9]
        ]"#;
        let (observations, dropped) = parse_observations(body).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(dropped, 10);
    }

    #[test]
    fn test_non_array_body_is_corrupt() {
        let err = parse_observations(r#"{"data": []}"#).unwrap_err();
        assert_eq!(err.http_status_code(), 502);

        let err = parse_observations("not json at all").unwrap_err();
        assert_eq!(err.http_status_code(), 502);
    }

    #[test]
    fn test_empty_array_ok() {
        let (observations, dropped) = parse_observations("[]").unwrap();
        assert!(observations.is_empty());
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_nan_literal_rejected_by_parser() {
        // Bare NaN is not valid JSON; the whole body counts as corrupt.
        assert!(parse_observations("[[NaN, 0.0, 18.0]]").is_err());
    }
}
