//! Storage scalar -> native value.
//!
//! The engine keeps only integers, reals, text and blobs, so semantic types
//! have to be recovered on read. [`HeuristicDecoder`] is the default: booleans
//! by known field name, dates by ISO-8601 shape, JSON by bracket sniffing.
//! [`SchemaDecoder`] decodes by declared field type when one is known and
//! falls back to the heuristic otherwise.

use crate::cache::BoundedCache;
use crate::core::{SqlValue, Value};
use crate::schema::generator::{FieldType, TableSpecs};
use chrono::{DateTime, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

lazy_static! {
    static ref ISO_DATE_TIME: Regex = Regex::new(
        r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d{1,9})?(Z|[+-]\d{2}:?\d{2})?$"
    )
    .expect("static pattern");
}

/// Pluggable read-side type recovery, keyed by field name
pub trait TypeDecoder: Send + Sync {
    fn decode(&self, field: &str, value: SqlValue) -> Value;

    /// Drop any memoized decisions
    fn clear_cache(&self) {}
}

/// Parse an ISO-8601 timestamp. A missing offset is read as UTC.
pub fn parse_iso_date(text: &str) -> Option<DateTime<Utc>> {
    if !ISO_DATE_TIME.is_match(text) {
        return None;
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}

/// Decide what a stored string really is. Failures fall back to the text.
pub fn decode_text(text: String) -> Value {
    if let Some(date) = parse_iso_date(&text) {
        return Value::Date(date);
    }
    if looks_like_json(&text) {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
            return Value::from(json);
        }
    }
    Value::Text(text)
}

/// Default decoder: name-based booleans, pattern-based dates and JSON
///
/// Known limitation: a boolean stored in a field outside `boolean_fields`
/// comes back as the integer 0 or 1.
pub struct HeuristicDecoder {
    boolean_fields: HashSet<String>,
    text_cache: Mutex<BoundedCache<String, Value>>,
    max_cached_len: usize,
}

impl HeuristicDecoder {
    pub fn new(boolean_fields: HashSet<String>, cache_capacity: usize, max_cached_len: usize) -> Self {
        Self {
            boolean_fields,
            text_cache: Mutex::new(BoundedCache::new(cache_capacity)),
            max_cached_len,
        }
    }

    pub fn is_boolean_field(&self, field: &str) -> bool {
        self.boolean_fields.contains(field)
    }

    pub fn cached_values(&self) -> usize {
        self.text_cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn decode_text_cached(&self, text: String) -> Value {
        // The whole string is the key, so values never share a decision
        // just because they share a prefix.
        if text.len() > self.max_cached_len {
            return decode_text(text);
        }

        {
            let cache = self.text_cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(decoded) = cache.get(&text) {
                return decoded.clone();
            }
        }

        let decoded = decode_text(text.clone());
        self.text_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(text, decoded.clone());
        decoded
    }
}

impl TypeDecoder for HeuristicDecoder {
    fn decode(&self, field: &str, value: SqlValue) -> Value {
        match value {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i @ (0 | 1)) if self.is_boolean_field(field) => Value::Boolean(i == 1),
            SqlValue::Integer(i) => Value::Integer(i),
            SqlValue::Real(f) => Value::Float(f),
            SqlValue::Blob(b) => Value::Bytes(b),
            SqlValue::Text(s) => self.decode_text_cached(s),
        }
    }

    fn clear_cache(&self) {
        self.text_cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Decoder driven by declared field types
pub struct SchemaDecoder {
    fields: HashMap<String, FieldType>,
    fallback: HeuristicDecoder,
}

impl SchemaDecoder {
    pub fn new(fields: HashMap<String, FieldType>, fallback: HeuristicDecoder) -> Self {
        Self { fields, fallback }
    }

    /// Collect field types from schema-generation specs. When two tables
    /// declare the same field differently, the first declaration wins.
    pub fn from_specs(tables: &TableSpecs, fallback: HeuristicDecoder) -> Self {
        let mut fields = HashMap::new();
        for specs in tables.values() {
            for (name, spec) in specs {
                fields.entry(name.clone()).or_insert(spec.field_type);
            }
        }
        Self::new(fields, fallback)
    }

    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.fields.get(field).copied()
    }
}

impl TypeDecoder for SchemaDecoder {
    fn decode(&self, field: &str, value: SqlValue) -> Value {
        match (self.field_type(field), value) {
            (_, SqlValue::Null) => Value::Null,
            (Some(FieldType::Boolean), SqlValue::Integer(i)) => Value::Boolean(i != 0),
            (Some(FieldType::Boolean), SqlValue::Text(s)) => match s.as_str() {
                "true" | "1" => Value::Boolean(true),
                "false" | "0" => Value::Boolean(false),
                _ => Value::Text(s),
            },
            (Some(FieldType::Date), SqlValue::Text(s)) => match parse_iso_date(&s) {
                Some(date) => Value::Date(date),
                None => Value::Text(s),
            },
            (Some(FieldType::String), SqlValue::Text(s)) => Value::Text(s),
            (Some(FieldType::Number), SqlValue::Integer(i)) => Value::Integer(i),
            (Some(FieldType::Number), SqlValue::Real(f)) => Value::Float(f),
            (_, value) => self.fallback.decode(field, value),
        }
    }

    fn clear_cache(&self) {
        self.fallback.clear_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn heuristic() -> HeuristicDecoder {
        HeuristicDecoder::new(["emailVerified".to_string()].into_iter().collect(), 16, 64)
    }

    #[test]
    fn test_boolean_only_for_known_fields() {
        let d = heuristic();
        assert_eq!(d.decode("emailVerified", SqlValue::Integer(1)), Value::Boolean(true));
        assert_eq!(d.decode("emailVerified", SqlValue::Integer(0)), Value::Boolean(false));
        assert_eq!(d.decode("emailVerified", SqlValue::Integer(2)), Value::Integer(2));
        assert_eq!(d.decode("age", SqlValue::Integer(1)), Value::Integer(1));
    }

    #[test]
    fn test_dates_recovered() {
        let d = heuristic();
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(d.decode("createdAt", SqlValue::from("2024-03-01T12:30:00.000Z")), Value::Date(expected));
        assert_eq!(d.decode("createdAt", SqlValue::from("2024-03-01T14:30:00+02:00")), Value::Date(expected));
        assert_eq!(d.decode("createdAt", SqlValue::from("2024-03-01 12:30:00")), Value::Date(expected));
        // Date-only strings stay text.
        assert_eq!(d.decode("day", SqlValue::from("2024-03-01")), Value::from("2024-03-01"));
        assert_eq!(d.decode("x", SqlValue::from("2024-13-45T99:00:00Z")), Value::from("2024-13-45T99:00:00Z"));
    }

    #[test]
    fn test_json_sniffing() {
        let d = heuristic();
        assert_eq!(
            d.decode("tags", SqlValue::from(r#"["a","b"]"#)),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
        assert!(matches!(d.decode("meta", SqlValue::from(r#"{"k":1}"#)), Value::Map(_)));
        assert_eq!(d.decode("note", SqlValue::from("[not json]")), Value::from("[not json]"));
        assert_eq!(d.decode("note", SqlValue::from("plain")), Value::from("plain"));
    }

    #[test]
    fn test_cache_is_bounded_and_keyed_by_full_value() {
        let d = HeuristicDecoder::new(HashSet::new(), 2, 64);
        d.decode("a", SqlValue::from("[1]"));
        d.decode("a", SqlValue::from("[1, 2]"));
        d.decode("a", SqlValue::from("[1, 2, 3]"));
        assert_eq!(d.cached_values(), 2);
        assert_eq!(
            d.decode("a", SqlValue::from("[1, 2]")),
            Value::List(vec![Value::Integer(1), Value::Integer(2)])
        );

        let long = format!("[{}]", "1,".repeat(40) + "1");
        d.clear_cache();
        d.decode("a", SqlValue::from(long.as_str()));
        assert_eq!(d.cached_values(), 0);
    }

    #[test]
    fn test_schema_decoder_prefers_declared_types() {
        let mut fields = HashMap::new();
        fields.insert("active".to_string(), FieldType::Boolean);
        fields.insert("code".to_string(), FieldType::String);
        let d = SchemaDecoder::new(fields, heuristic());

        assert_eq!(d.decode("active", SqlValue::Integer(1)), Value::Boolean(true));
        // Declared strings are never sniffed.
        assert_eq!(d.decode("code", SqlValue::from("[1]")), Value::from("[1]"));
        // Undeclared fields use the heuristic.
        assert_eq!(d.decode("other", SqlValue::from("[1]")), Value::List(vec![Value::Integer(1)]));
    }
}
