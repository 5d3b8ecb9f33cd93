//! Field codec: canonicalization of raw cell values
//!
//! Spreadsheet cells are untyped at the source. Every raw value crosses this
//! boundary exactly once, so all downstream comparison works on canonical
//! `FieldValue`s instead of runtime coercion. Serialization is the inverse
//! direction: a canonical value rendered as a JSON-safe primitive.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use redline_common::fields::{FieldKind, FieldValue};
use redline_common::time;
use serde_json::Value;
use thiserror::Error;

/// Codec error
#[derive(Error, Debug)]
pub enum CodecError {
    /// Raw value cannot be coerced to the hinted kind
    #[error("cannot coerce {got} to {expected:?}")]
    TypeMismatch { expected: FieldKind, got: String },

    /// Canonical value has no JSON-safe rendering (non-finite number)
    #[error("value cannot be serialized: {0}")]
    Serialization(String),
}

/// Naive datetime formats accepted from sheet cells, tried in order.
/// `%.f` also matches the no-fraction case.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Convert a raw cell value to its canonical form under a kind hint
///
/// Blank input (JSON null or whitespace-only text) canonicalizes to `Null`
/// regardless of the hint. Lossless fallbacks are accepted: numeric text for
/// a Number hint, boolean words and exact 0/1 for a Boolean hint, numbers
/// and booleans rendered as text for a Text hint, RFC 3339 or naive-local
/// text for a DateTime hint. Anything else is a `TypeMismatch`.
///
/// `precision` pre-rounds Number values to that many decimal places;
/// equality downstream stays exact.
pub fn canonicalize(
    raw: &Value,
    hint: FieldKind,
    precision: Option<u32>,
) -> Result<FieldValue, CodecError> {
    if is_blank(raw) {
        return Ok(FieldValue::Null);
    }
    match hint {
        FieldKind::Text => canonicalize_text(raw),
        FieldKind::Number => canonicalize_number(raw, precision),
        FieldKind::Boolean => canonicalize_boolean(raw),
        FieldKind::DateTime => canonicalize_datetime(raw),
    }
}

/// Render a canonical value as a JSON-safe primitive
///
/// Datetimes become UTC ISO-8601 text with microsecond precision and an
/// explicit "Z". Non-finite numbers fail with `Serialization`; canonicalize
/// never produces one, this guards values constructed by hand.
pub fn serialize(value: &FieldValue) -> Result<Value, CodecError> {
    match value {
        FieldValue::Text(s) => Ok(Value::String(s.clone())),
        FieldValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .ok_or_else(|| CodecError::Serialization(format!("non-finite number {}", n))),
        FieldValue::Boolean(b) => Ok(Value::Bool(*b)),
        FieldValue::DateTime(dt) => Ok(Value::String(time::format_utc_micros(*dt))),
        FieldValue::Null => Ok(Value::Null),
    }
}

fn is_blank(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn mismatch(expected: FieldKind, raw: &Value) -> CodecError {
    CodecError::TypeMismatch {
        expected,
        got: describe(raw),
    }
}

fn describe(raw: &Value) -> String {
    match raw {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("text {:?}", s),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

fn canonicalize_text(raw: &Value) -> Result<FieldValue, CodecError> {
    match raw {
        Value::String(s) => Ok(FieldValue::Text(s.trim().to_string())),
        // serde_json renders the shortest round-trip form
        Value::Number(n) => Ok(FieldValue::Text(n.to_string())),
        Value::Bool(b) => Ok(FieldValue::Text(b.to_string())),
        _ => Err(mismatch(FieldKind::Text, raw)),
    }
}

fn canonicalize_number(raw: &Value, precision: Option<u32>) -> Result<FieldValue, CodecError> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(FieldValue::Number(round_to(v, precision))),
        _ => Err(mismatch(FieldKind::Number, raw)),
    }
}

fn round_to(value: f64, precision: Option<u32>) -> f64 {
    match precision {
        Some(places) => {
            let factor = 10f64.powi(places as i32);
            (value * factor).round() / factor
        }
        None => value,
    }
}

fn canonicalize_boolean(raw: &Value) -> Result<FieldValue, CodecError> {
    match raw {
        Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(FieldValue::Boolean(true)),
            "false" | "no" => Ok(FieldValue::Boolean(false)),
            _ => Err(mismatch(FieldKind::Boolean, raw)),
        },
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Ok(FieldValue::Boolean(true)),
            Some(v) if v == 0.0 => Ok(FieldValue::Boolean(false)),
            _ => Err(mismatch(FieldKind::Boolean, raw)),
        },
        _ => Err(mismatch(FieldKind::Boolean, raw)),
    }
}

fn canonicalize_datetime(raw: &Value) -> Result<FieldValue, CodecError> {
    let Value::String(text) = raw else {
        return Err(mismatch(FieldKind::DateTime, raw));
    };
    let text = text.trim();

    // Offset-aware text carries its own zone
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(FieldValue::DateTime(time::truncate_to_micros(
            dt.with_timezone(&Utc),
        )));
    }

    // Naive text is interpreted as local time; a nonexistent local time
    // (spring-forward gap) is a mismatch
    let naive = parse_naive(text).ok_or_else(|| mismatch(FieldKind::DateTime, raw))?;
    let utc = time::naive_local_to_utc(naive).ok_or_else(|| mismatch(FieldKind::DateTime, raw))?;
    Ok(FieldValue::DateTime(time::truncate_to_micros(utc)))
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    // Bare date means local midnight
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_cells_canonicalize_to_null() {
        for hint in [
            FieldKind::Text,
            FieldKind::Number,
            FieldKind::Boolean,
            FieldKind::DateTime,
        ] {
            assert_eq!(
                canonicalize(&Value::Null, hint, None).unwrap(),
                FieldValue::Null
            );
            assert_eq!(
                canonicalize(&json!("   "), hint, None).unwrap(),
                FieldValue::Null
            );
        }
    }

    #[test]
    fn test_text_hint_accepts_scalars() {
        assert_eq!(
            canonicalize(&json!("  Acme  "), FieldKind::Text, None).unwrap(),
            FieldValue::Text("Acme".to_string())
        );
        assert_eq!(
            canonicalize(&json!(42), FieldKind::Text, None).unwrap(),
            FieldValue::Text("42".to_string())
        );
        assert_eq!(
            canonicalize(&json!(true), FieldKind::Text, None).unwrap(),
            FieldValue::Text("true".to_string())
        );
    }

    #[test]
    fn test_text_hint_rejects_containers() {
        let err = canonicalize(&json!(["a"]), FieldKind::Text, None).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn test_number_hint_parses_numeric_text() {
        assert_eq!(
            canonicalize(&json!("10.5"), FieldKind::Number, None).unwrap(),
            FieldValue::Number(10.5)
        );
        assert_eq!(
            canonicalize(&json!(8), FieldKind::Number, None).unwrap(),
            FieldValue::Number(8.0)
        );
    }

    #[test]
    fn test_number_hint_rejects_non_numeric_text() {
        let err = canonicalize(&json!("eight"), FieldKind::Number, None).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn test_number_precision_pre_rounds() {
        assert_eq!(
            canonicalize(&json!(10.456), FieldKind::Number, Some(2)).unwrap(),
            FieldValue::Number(10.46)
        );
        assert_eq!(
            canonicalize(&json!("7.5"), FieldKind::Number, Some(0)).unwrap(),
            FieldValue::Number(8.0)
        );
    }

    #[test]
    fn test_boolean_hint_accepts_words_and_binary_numerics() {
        assert_eq!(
            canonicalize(&json!("Yes"), FieldKind::Boolean, None).unwrap(),
            FieldValue::Boolean(true)
        );
        assert_eq!(
            canonicalize(&json!("FALSE"), FieldKind::Boolean, None).unwrap(),
            FieldValue::Boolean(false)
        );
        assert_eq!(
            canonicalize(&json!(1), FieldKind::Boolean, None).unwrap(),
            FieldValue::Boolean(true)
        );
        assert_eq!(
            canonicalize(&json!(0.0), FieldKind::Boolean, None).unwrap(),
            FieldValue::Boolean(false)
        );
    }

    #[test]
    fn test_boolean_hint_rejects_other_numbers_and_words() {
        assert!(canonicalize(&json!(2), FieldKind::Boolean, None).is_err());
        assert!(canonicalize(&json!("maybe"), FieldKind::Boolean, None).is_err());
    }

    #[test]
    fn test_datetime_hint_parses_rfc3339_to_utc() {
        let value = canonicalize(
            &json!("2024-03-01T12:30:00.123456+02:00"),
            FieldKind::DateTime,
            None,
        )
        .unwrap();
        match value {
            FieldValue::DateTime(dt) => {
                assert_eq!(time::format_utc_micros(dt), "2024-03-01T10:30:00.123456Z");
            }
            other => panic!("expected datetime, got {:?}", other),
        }
    }

    #[test]
    fn test_datetime_hint_accepts_naive_local_text() {
        // Mid-January is unambiguous in every timezone
        assert!(canonicalize(&json!("2024-01-15 09:30:00"), FieldKind::DateTime, None).is_ok());
        assert!(canonicalize(&json!("2024-01-15T09:30"), FieldKind::DateTime, None).is_ok());
        assert!(canonicalize(&json!("2024-01-15"), FieldKind::DateTime, None).is_ok());
    }

    #[test]
    fn test_datetime_hint_rejects_non_date_text() {
        assert!(canonicalize(&json!("not a date"), FieldKind::DateTime, None).is_err());
        assert!(canonicalize(&json!(12345), FieldKind::DateTime, None).is_err());
    }

    #[test]
    fn test_serialize_datetime_is_utc_micros_with_z() {
        let value =
            canonicalize(&json!("2024-03-01T10:30:00.123456Z"), FieldKind::DateTime, None).unwrap();
        assert_eq!(
            serialize(&value).unwrap(),
            json!("2024-03-01T10:30:00.123456Z")
        );
    }

    #[test]
    fn test_serialize_rejects_non_finite_numbers() {
        let err = serialize(&FieldValue::Number(f64::NAN)).unwrap_err();
        assert!(matches!(err, CodecError::Serialization(_)));
        assert!(serialize(&FieldValue::Number(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_codec_round_trip_is_idempotent() {
        let cases = [
            (json!("Acme"), FieldKind::Text, None),
            (json!(10.25), FieldKind::Number, None),
            (json!(10.456), FieldKind::Number, Some(2)),
            (json!(true), FieldKind::Boolean, None),
            (json!("2024-03-01T10:30:00.123456Z"), FieldKind::DateTime, None),
            (Value::Null, FieldKind::Text, None),
        ];
        for (raw, hint, precision) in cases {
            let first = canonicalize(&raw, hint, precision).unwrap();
            let serialized = serialize(&first).unwrap();
            let second = canonicalize(&serialized, hint, precision).unwrap();
            assert_eq!(first, second, "round trip diverged for {:?}", raw);
        }
    }
}
