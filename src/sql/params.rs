//! Coerced column values that sqlx can bind, each with its own PostgreSQL type.

use crate::coerce::Geometry;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::{Database, Type};

/// A value ready to bind. Textual variants rely on the `$n::type` cast emitted by the builder.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Text form handed to the engine's input function (numeric, money, inet, interval, ...).
    Text(String),
    Uuid(uuid::Uuid),
    Json(Value),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Bytes(Vec<u8>),
    Geometry(Geometry),
    Array(Vec<BindValue>),
}

impl BindValue {
    /// PostgreSQL array literal, e.g. `{1,"a b",NULL}`.
    pub fn array_literal(items: &[BindValue]) -> String {
        let parts: Vec<String> = items.iter().map(BindValue::array_element).collect();
        format!("{{{}}}", parts.join(","))
    }

    fn array_element(&self) -> String {
        match self {
            BindValue::Null => "NULL".into(),
            BindValue::Bool(b) => (if *b { "t" } else { "f" }).to_string(),
            BindValue::Int(n) => n.to_string(),
            BindValue::Float(f) => f.to_string(),
            BindValue::Array(items) => BindValue::array_literal(items),
            other => quote_array_element(&other.to_text()),
        }
    }

    /// Text form of a scalar, as the engine's input function would accept it.
    pub fn to_text(&self) -> String {
        match self {
            BindValue::Null => String::new(),
            BindValue::Bool(b) => b.to_string(),
            BindValue::Int(n) => n.to_string(),
            BindValue::Float(f) => f.to_string(),
            BindValue::Text(s) => s.clone(),
            BindValue::Uuid(u) => u.to_string(),
            BindValue::Json(v) => v.to_string(),
            BindValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            BindValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            BindValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            BindValue::TimestampTz(ts) => ts.to_rfc3339(),
            BindValue::Bytes(b) => format!("\\x{}", hex::encode(b)),
            BindValue::Geometry(g) => g.to_string(),
            BindValue::Array(items) => BindValue::array_literal(items),
        }
    }
}

fn quote_array_element(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl<'q> Encode<'q, Postgres> for BindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            BindValue::Null => IsNull::Yes,
            BindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            BindValue::Int(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            BindValue::Float(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            BindValue::Text(s) => <String as Encode<Postgres>>::encode_by_ref(s, buf)?,
            BindValue::Uuid(u) => <uuid::Uuid as Encode<Postgres>>::encode_by_ref(u, buf)?,
            BindValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
            BindValue::Date(d) => <NaiveDate as Encode<Postgres>>::encode_by_ref(d, buf)?,
            BindValue::Time(t) => <NaiveTime as Encode<Postgres>>::encode_by_ref(t, buf)?,
            BindValue::Timestamp(ts) => <NaiveDateTime as Encode<Postgres>>::encode_by_ref(ts, buf)?,
            BindValue::TimestampTz(ts) => <DateTime<Utc> as Encode<Postgres>>::encode_by_ref(ts, buf)?,
            BindValue::Bytes(b) => <Vec<u8> as Encode<Postgres>>::encode_by_ref(b, buf)?,
            BindValue::Geometry(_) | BindValue::Array(_) => {
                let text = self.to_text();
                <String as Encode<Postgres>>::encode_by_ref(&text, buf)?
            }
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            BindValue::Null | BindValue::Text(_) | BindValue::Geometry(_) | BindValue::Array(_) => {
                <String as Type<Postgres>>::type_info()
            }
            BindValue::Bool(_) => <bool as Type<Postgres>>::type_info(),
            BindValue::Int(_) => <i64 as Type<Postgres>>::type_info(),
            BindValue::Float(_) => <f64 as Type<Postgres>>::type_info(),
            BindValue::Uuid(_) => <uuid::Uuid as Type<Postgres>>::type_info(),
            BindValue::Json(_) => <Value as Type<Postgres>>::type_info(),
            BindValue::Date(_) => <NaiveDate as Type<Postgres>>::type_info(),
            BindValue::Time(_) => <NaiveTime as Type<Postgres>>::type_info(),
            BindValue::Timestamp(_) => <NaiveDateTime as Type<Postgres>>::type_info(),
            BindValue::TimestampTz(_) => <DateTime<Utc> as Type<Postgres>>::type_info(),
            BindValue::Bytes(_) => <Vec<u8> as Type<Postgres>>::type_info(),
        })
    }
}

impl Type<Postgres> for BindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
