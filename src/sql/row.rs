//! Convert PostgreSQL rows to JSON objects.

use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row};

/// Row from a generated statement; columns sqlx cannot decode are projected as text by the builder.
pub fn row_to_json(row: &PgRow) -> Value {
    to_object(row, false)
}

/// Row from the simple-query protocol (text format). Any column no typed decoder
/// claims is read back as its text representation.
pub fn raw_row_to_json(row: &PgRow) -> Value {
    to_object(row, true)
}

pub fn column_names(row: &PgRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

fn to_object(row: &PgRow, text_fallback: bool) -> Value {
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let v = cell_to_value(row, col.ordinal(), text_fallback);
        map.insert(col.name().to_string(), v);
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, idx: usize, text_fallback: bool) -> Value {
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.and_then(serde_json::Number::from_f64).map(Value::Number).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
        return v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|d| Value::String(d.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v.map(|d| Value::String(d.format("%Y-%m-%d").to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v.map(|t| Value::String(t.format("%H:%M:%S%.f").to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(|b| Value::String(format!("\\x{}", hex::encode(b)))).unwrap_or(Value::Null);
    }
    if text_fallback {
        if let Ok(v) = row.try_get_unchecked::<Option<String>, _>(idx) {
            return v.map(Value::String).unwrap_or(Value::Null);
        }
    }
    Value::Null
}
