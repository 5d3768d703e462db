//! Bridges the JSON-ish dict values the generic Store contract speaks (`insert(table, dict)`,
//! `query(...) -> Vec<Row>`) to rusqlite's typed parameter/row API.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Row;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// A loosely-typed database row, keyed by column name.
pub type Record = HashMap<String, JsonValue>;

pub fn json_to_sql(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Null
            }
        }
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => {
            SqlValue::Text(serde_json::to_string(value).unwrap_or_default())
        }
    }
}

pub fn sql_to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => JsonValue::String(hex::encode(b)),
    }
}

/// Minimal hex encoding so the value bridge doesn't need a dedicated `hex` dependency
/// just for the rare BLOB column (vector payloads are read through typed accessors instead).
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Reads an entire row into a [`Record`] keyed by column name.
pub fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    let mut record = Record::new();
    for (idx, name) in row.as_ref().column_names().iter().enumerate() {
        let value = row.get_ref(idx)?;
        record.insert((*name).to_string(), sql_to_json(value));
    }
    Ok(record)
}

pub fn record_get_str(record: &Record, key: &str) -> Option<String> {
    match record.get(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}

pub fn record_get_i64(record: &Record, key: &str) -> Option<i64> {
    record.get(key).and_then(|v| v.as_i64())
}

pub fn record_get_f64(record: &Record, key: &str) -> Option<f64> {
    record.get(key).and_then(|v| v.as_f64())
}

pub fn record_get_bool(record: &Record, key: &str) -> bool {
    match record.get(key) {
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_i64().map(|i| i != 0).unwrap_or(false),
        _ => false,
    }
}

/// Builds a `{key: JsonValue}` map from `(&str, impl Into<JsonValue>)` pairs — the
/// ergonomic equivalent of a Python dict literal at call sites like `remember_fact`.
#[macro_export]
macro_rules! record {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map: $crate::storage::value::Record = ::std::collections::HashMap::new();
        $( map.insert($key.to_string(), ::serde_json::json!($value)); )*
        map
    }};
}

pub fn record_to_json_map(record: &Record) -> Map<String, JsonValue> {
    record.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}
