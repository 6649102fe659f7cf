//! Row and value conversion helpers.
//!
//! Snapshot values travel as `serde_json::Value`; shadow and primary tables
//! store them as libSQL values according to the field's storage type. These
//! helpers keep that mapping in one place and handle the dual datetime
//! format (`SQLite`'s `datetime('now')` vs Rust's `to_rfc3339()`).

use annal_core::enums::FieldType;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::AuditError;

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// Handles both RFC 3339 (`"2026-02-09T14:30:00+00:00"`) and `SQLite`'s default
/// format (`"2026-02-09 14:30:00"`).
///
/// # Errors
///
/// Returns `AuditError::Query` if the string cannot be parsed as either format.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AuditError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| AuditError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Read a nullable TEXT column. Returns `None` for both SQL NULL and empty string.
///
/// # Errors
///
/// Returns `AuditError` if the column read fails.
pub fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>, AuditError> {
    match row.get::<Option<String>>(idx)? {
        Some(s) if s.is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Extract an optional JSON value from a TEXT column.
///
/// # Errors
///
/// Returns `AuditError::Query` if a non-empty string contains invalid JSON.
pub fn parse_optional_json(s: Option<&str>) -> Result<Option<Value>, AuditError> {
    match s {
        Some(s) if !s.is_empty() => {
            let val = serde_json::from_str(s)
                .map_err(|e| AuditError::Query(format!("Invalid JSON in column: {e}")))?;
            Ok(Some(val))
        }
        _ => Ok(None),
    }
}

/// Double-quote an SQL identifier.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `?{start}, ?{start+1}, ...` with `count` entries.
#[must_use]
pub fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert a snapshot value to the libSQL value stored for `field_type`.
///
/// Known types are strict: a value of the wrong JSON shape is an error.
/// `Custom` types are converted by JSON shape alone.
///
/// # Errors
///
/// Returns a description of the mismatch.
pub fn to_sql_value(field_type: &FieldType, value: &Value) -> Result<libsql::Value, String> {
    if value.is_null() {
        return Ok(libsql::Value::Null);
    }
    let mismatch = || format!("expected {field_type}, got {value}");
    match field_type {
        FieldType::Integer => value
            .as_i64()
            .map(libsql::Value::Integer)
            .ok_or_else(mismatch),
        FieldType::Float => value.as_f64().map(libsql::Value::Real).ok_or_else(mismatch),
        FieldType::Text => value
            .as_str()
            .map(|s| libsql::Value::Text(s.to_string()))
            .ok_or_else(mismatch),
        FieldType::Boolean => match value {
            Value::Bool(b) => Ok(libsql::Value::Integer(i64::from(*b))),
            Value::Number(n) if matches!(n.as_i64(), Some(0 | 1)) => {
                Ok(libsql::Value::Integer(n.as_i64().unwrap_or_default()))
            }
            _ => Err(mismatch()),
        },
        FieldType::DateTime => {
            let s = value.as_str().ok_or_else(mismatch)?;
            parse_datetime(s).map_err(|e| e.to_string())?;
            Ok(libsql::Value::Text(s.to_string()))
        }
        FieldType::Json => Ok(libsql::Value::Text(value.to_string())),
        FieldType::Custom(_) => Ok(loose_sql_value(value)),
    }
}

fn loose_sql_value(value: &Value) -> libsql::Value {
    match value {
        Value::Null => libsql::Value::Null,
        Value::Bool(b) => libsql::Value::Integer(i64::from(*b)),
        Value::Number(n) => n.as_i64().map_or_else(
            || libsql::Value::Real(n.as_f64().unwrap_or_default()),
            libsql::Value::Integer,
        ),
        Value::String(s) => libsql::Value::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => libsql::Value::Text(value.to_string()),
    }
}

/// Convert a stored libSQL value back to a snapshot value.
///
/// # Errors
///
/// Returns a description of the mismatch.
pub fn from_sql_value(field_type: &FieldType, value: libsql::Value) -> Result<Value, String> {
    use libsql::Value as Sql;

    match (field_type, value) {
        (_, Sql::Null) => Ok(Value::Null),
        (FieldType::Integer, Sql::Integer(i)) => Ok(Value::from(i)),
        (FieldType::Float, Sql::Real(f)) => Ok(Value::from(f)),
        #[allow(clippy::cast_precision_loss)]
        (FieldType::Float, Sql::Integer(i)) => Ok(Value::from(i as f64)),
        (FieldType::Text | FieldType::DateTime, Sql::Text(s)) => Ok(Value::String(s)),
        (FieldType::Boolean, Sql::Integer(i)) => Ok(Value::Bool(i != 0)),
        (FieldType::Json, Sql::Text(s)) => {
            serde_json::from_str(&s).map_err(|e| format!("invalid JSON: {e}"))
        }
        (FieldType::Custom(_), Sql::Integer(i)) => Ok(Value::from(i)),
        (FieldType::Custom(_), Sql::Real(f)) => Ok(Value::from(f)),
        (FieldType::Custom(_), Sql::Text(s)) => Ok(Value::String(s)),
        (field_type, other) => Err(format!("cannot read {other:?} as {field_type}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn parse_rfc3339() {
        let dt = parse_datetime("2026-02-09T14:30:00+00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-02-09T14:30:00+00:00");
    }

    #[test]
    fn parse_sqlite_format() {
        let dt = parse_datetime("2026-02-09 14:30:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-02-09T14:30:00+00:00");
    }

    #[test]
    fn parse_invalid_datetime() {
        assert!(parse_datetime("not-a-date").is_err());
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("rev"), "\"rev\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn placeholders_are_numbered() {
        assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
        assert_eq!(placeholders(4, 1), "?4");
        assert_eq!(placeholders(1, 0), "");
    }

    #[rstest]
    #[case(FieldType::Integer, json!(42))]
    #[case(FieldType::Float, json!(1.5))]
    #[case(FieldType::Text, json!("hello"))]
    #[case(FieldType::Boolean, json!(true))]
    #[case(FieldType::DateTime, json!("2026-02-09T14:30:00+00:00"))]
    #[case(FieldType::Json, json!({"tags": ["a", "b"]}))]
    #[case(FieldType::Custom("issue196type".into()), json!("payload"))]
    #[case(FieldType::Text, Value::Null)]
    fn values_survive_storage(#[case] field_type: FieldType, #[case] value: Value) {
        let stored = to_sql_value(&field_type, &value).unwrap();
        assert_eq!(from_sql_value(&field_type, stored).unwrap(), value);
    }

    #[rstest]
    #[case(FieldType::Integer, json!("abc"))]
    #[case(FieldType::Text, json!(5))]
    #[case(FieldType::Boolean, json!("yes"))]
    #[case(FieldType::DateTime, json!("yesterday"))]
    fn mismatched_values_are_rejected(#[case] field_type: FieldType, #[case] value: Value) {
        assert!(to_sql_value(&field_type, &value).is_err());
    }

    #[test]
    fn custom_types_convert_by_shape() {
        let custom = FieldType::Custom("money".into());
        assert!(matches!(
            to_sql_value(&custom, &json!(100)).unwrap(),
            libsql::Value::Integer(100)
        ));
        assert!(matches!(
            to_sql_value(&custom, &json!("abc")).unwrap(),
            libsql::Value::Text(_)
        ));
    }
}
