//! Native value -> storage scalar.

use crate::core::{SqlValue, Value};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;

/// Result of flattening a native value for storage
#[derive(Debug, Clone, PartialEq)]
pub enum SerializationOutcome {
    /// The stored form decodes back to the same value
    Exact(SqlValue),
    /// JSON encoding failed; `value` holds a string rendering instead
    Fallback { value: SqlValue, reason: String },
}

impl SerializationOutcome {
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn value(&self) -> &SqlValue {
        match self {
            Self::Exact(v) | Self::Fallback { value: v, .. } => v,
        }
    }

    pub fn into_value(self) -> SqlValue {
        match self {
            Self::Exact(v) | Self::Fallback { value: v, .. } => v,
        }
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn serialize(value: &Value) -> SerializationOutcome {
    let exact = match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Date(d) => SqlValue::Text(format_date(d)),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::List(_) | Value::Map(_) => {
            return match to_json(value).and_then(|json| {
                serde_json::to_string(&json).map_err(|e| e.to_string())
            }) {
                Ok(text) => SerializationOutcome::Exact(SqlValue::Text(text)),
                Err(reason) => SerializationOutcome::Fallback {
                    value: SqlValue::Text(value.to_string()),
                    reason,
                },
            };
        }
    };
    SerializationOutcome::Exact(exact)
}

/// JSON form of a nested value. Fails on non-finite floats, which JSON
/// cannot represent.
pub fn to_json(value: &Value) -> Result<JsonValue, String> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Integer(i) => JsonValue::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or_else(|| format!("cannot encode non-finite number {} as JSON", f))?,
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Date(d) => JsonValue::String(format_date(d)),
        Value::Bytes(b) => JsonValue::Array(b.iter().map(|byte| JsonValue::from(*byte)).collect()),
        Value::List(items) => JsonValue::Array(items.iter().map(to_json).collect::<Result<_, _>>()?),
        Value::Map(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| to_json(v).map(|json| (k.clone(), json)))
                .collect::<Result<_, _>>()?,
        ),
    })
}
