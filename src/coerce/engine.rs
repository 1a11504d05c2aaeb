//! Convert caller-supplied JSON values into bind values for a column's declared type.
//! Raw SQL never goes through here; the engine's own input functions handle that path.

use crate::coerce::geometry::{parse_geometry, GeometryKind};
use crate::coerce::network;
use crate::coerce::TypeFamily;
use crate::error::AppError;
use crate::model::ColumnDefinition;
use crate::sql::BindValue;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("valid decimal regex"));
static INTERVAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(-?\d+(?:\.\d+)?)\s*(week|day|hour|minute|min|second|sec)s?\s*$").expect("valid interval regex")
});
static TIMETZ_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\d{1,2}:\d{2}(:\d{2}(\.\d+)?)?\s*(z|utc|[+-]\d{1,2}(:?\d{2})?)?$").expect("valid timetz regex")
});

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"];

/// Coerce one value for `column`. Null stays null; an empty string becomes null on a
/// nullable column and is passed through untouched otherwise so the constraint decides.
pub fn coerce_value(column: &ColumnDefinition, value: &Value) -> Result<BindValue, AppError> {
    match value {
        Value::Null => return Ok(BindValue::Null),
        Value::String(s) if s.is_empty() => {
            return Ok(if column.nullable { BindValue::Null } else { BindValue::Text(String::new()) });
        }
        _ => {}
    }
    let family = TypeFamily::parse(&column.type_);
    coerce_as(&family, value).ok_or_else(|| AppError::coercion(&column.name, &column.type_, value))
}

/// Family dispatch. `None` means the value is not a valid representative of the family.
pub fn coerce_as(family: &TypeFamily, value: &Value) -> Option<BindValue> {
    if value.is_null() {
        return Some(BindValue::Null);
    }
    match family {
        TypeFamily::SmallInt => int_in_range(value, i64::from(i16::MIN), i64::from(i16::MAX)),
        TypeFamily::Integer => int_in_range(value, i64::from(i32::MIN), i64::from(i32::MAX)),
        TypeFamily::BigInt => int_in_range(value, i64::MIN, i64::MAX),
        TypeFamily::Real | TypeFamily::Double => to_float(value).map(BindValue::Float),
        TypeFamily::Numeric => to_decimal_text(value).map(BindValue::Text),
        TypeFamily::Boolean => to_bool(value).map(BindValue::Bool),
        TypeFamily::Json | TypeFamily::Jsonb => to_json(value).map(BindValue::Json),
        TypeFamily::Uuid => value.as_str().and_then(|s| uuid::Uuid::parse_str(s.trim()).ok()).map(BindValue::Uuid),
        TypeFamily::Date => value.as_str().and_then(parse_date).map(BindValue::Date),
        TypeFamily::Time => value.as_str().and_then(parse_time).map(BindValue::Time),
        TypeFamily::TimeTz => value
            .as_str()
            .filter(|s| TIMETZ_RE.is_match(s.trim()))
            .map(|s| BindValue::Text(s.trim().to_string())),
        TypeFamily::Timestamp => value.as_str().and_then(parse_timestamp).map(BindValue::Timestamp),
        TypeFamily::TimestampTz => value.as_str().and_then(parse_timestamptz).map(BindValue::TimestampTz),
        TypeFamily::Interval => to_interval(value).map(BindValue::Text),
        TypeFamily::Money => to_money(value).map(BindValue::Text),
        TypeFamily::Bytea => to_bytes(value).map(BindValue::Bytes),
        TypeFamily::Inet => checked_text(value, network::is_inet),
        TypeFamily::Cidr => checked_text(value, network::is_cidr),
        TypeFamily::MacAddr => checked_text(value, network::is_macaddr),
        TypeFamily::MacAddr8 => checked_text(value, network::is_macaddr8),
        TypeFamily::Bit | TypeFamily::VarBit => to_bits(value).map(BindValue::Text),
        TypeFamily::Point => parse_geometry(GeometryKind::Point, value).map(BindValue::Geometry),
        TypeFamily::Circle => parse_geometry(GeometryKind::Circle, value).map(BindValue::Geometry),
        TypeFamily::Box => parse_geometry(GeometryKind::Box, value).map(BindValue::Geometry),
        TypeFamily::Lseg => parse_geometry(GeometryKind::Lseg, value).map(BindValue::Geometry),
        // line, path and polygon go to the engine verbatim
        TypeFamily::Line | TypeFamily::Path | TypeFamily::Polygon => Some(BindValue::Text(as_plain_text(value))),
        TypeFamily::Text | TypeFamily::Unknown(_) => Some(BindValue::Text(as_plain_text(value))),
        TypeFamily::Array(inner) => to_array(inner, value).map(BindValue::Array),
    }
}

fn as_plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn checked_text(value: &Value, valid: fn(&str) -> bool) -> Option<BindValue> {
    let s = value.as_str()?.trim();
    valid(s).then(|| BindValue::Text(s.to_string()))
}

fn int_in_range(value: &Value, min: i64, max: i64) -> Option<BindValue> {
    let n = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => {
                let f = n.as_f64()?;
                if f.fract() != 0.0 || f < i64::MIN as f64 || f > i64::MAX as f64 {
                    return None;
                }
                f as i64
            }
        },
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (min..=max).contains(&n).then_some(BindValue::Int(n))
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn to_decimal_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            (DECIMAL_RE.is_match(s) || s.eq_ignore_ascii_case("nan")).then(|| s.to_string())
        }
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Structured input is kept as-is; strings must themselves be JSON documents.
fn to_json(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => serde_json::from_str(s).ok(),
        other => Some(other.clone()),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))
        .or_else(|| parse_naive_datetime(s).map(|d| d.date()))
        .or_else(|| NaiveDate::parse_from_str(s, "%Y/%m/%d").ok())
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveTime::parse_from_str(s, "%H:%M").ok())
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

fn parse_offset_datetime(s: &str) -> Option<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .or_else(|| OFFSET_DATETIME_FORMATS.iter().find_map(|f| DateTime::parse_from_str(s, f).ok()))
}

/// `timestamp` ignores any zone in the input, as PostgreSQL does.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    parse_offset_datetime(s)
        .map(|d| d.naive_local())
        .or_else(|| parse_naive_datetime(s))
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Zone-less input is taken as UTC.
fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    parse_offset_datetime(s)
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| parse_timestamp(s).map(|naive| Utc.from_utc_datetime(&naive)))
}

/// `<N> <unit>` is normalised; any other text goes to the engine unchanged.
fn to_interval(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(format!("{} seconds", n)),
        Value::String(s) => match INTERVAL_RE.captures(s) {
            Some(caps) => {
                let unit = match caps[2].to_ascii_lowercase().as_str() {
                    "min" => "minute".to_string(),
                    "sec" => "second".to_string(),
                    other => other.to_string(),
                };
                Some(format!("{} {}s", &caps[1], unit))
            }
            None => Some(s.trim().to_string()),
        },
        _ => None,
    }
}

fn to_money(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | '_') && !c.is_whitespace())
                .collect();
            DECIMAL_RE.is_match(&cleaned).then_some(cleaned)
        }
        _ => None,
    }
}

/// `\x` hex, then base64, then the literal's UTF-8 bytes.
fn to_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(s) => {
            if let Some(h) = s.strip_prefix("\\x") {
                if let Ok(bytes) = hex::decode(h) {
                    return Some(bytes);
                }
            }
            if let Ok(bytes) = general_purpose::STANDARD.decode(s) {
                return Some(bytes);
            }
            Some(s.as_bytes().to_vec())
        }
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect(),
        _ => None,
    }
}

fn to_bits(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) if n.is_u64() => n.to_string(),
        _ => return None,
    };
    s.chars().all(|c| c == '0' || c == '1').then_some(s)
}

fn to_array(inner: &TypeFamily, value: &Value) -> Option<Vec<BindValue>> {
    let items = match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => parse_brace_list(s.trim())?,
        _ => return None,
    };
    items.iter().map(|item| coerce_as(inner, item)).collect()
}

/// Parse `{a,"b c",NULL,{1,2}}` into JSON values; quoted elements are always strings,
/// bare `NULL` is null, nested braces become nested arrays.
fn parse_brace_list(s: &str) -> Option<Vec<Value>> {
    let body = s.strip_prefix('{')?.strip_suffix('}')?;
    let mut items = Vec::new();
    if body.trim().is_empty() {
        return Some(items);
    }
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i <= chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i < chars.len() && chars[i] == '"' {
            let mut buf = String::new();
            i += 1;
            loop {
                let c = *chars.get(i)?;
                i += 1;
                match c {
                    '\\' => {
                        buf.push(*chars.get(i)?);
                        i += 1;
                    }
                    '"' => break,
                    other => buf.push(other),
                }
            }
            items.push(Value::String(buf));
        } else if i < chars.len() && chars[i] == '{' {
            let start = i;
            let mut depth = 0;
            while i < chars.len() {
                match chars[i] {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            i += 1;
                            break;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            if depth != 0 {
                return None;
            }
            let nested: String = chars[start..i].iter().collect();
            items.push(Value::Array(parse_brace_list(&nested)?));
        } else {
            let start = i;
            while i < chars.len() && chars[i] != ',' {
                i += 1;
            }
            let raw: String = chars[start..i].iter().collect();
            let raw = raw.trim();
            if raw.eq_ignore_ascii_case("null") {
                items.push(Value::Null);
            } else {
                items.push(Value::String(raw.to_string()));
            }
        }
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        match chars.get(i) {
            Some(',') => i += 1,
            None => break,
            Some(_) => return None,
        }
    }
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::Geometry;
    use serde_json::json;

    fn col(type_: &str) -> ColumnDefinition {
        ColumnDefinition::new("c", type_)
    }

    fn ok(type_: &str, v: Value) -> BindValue {
        coerce_value(&col(type_), &v).unwrap_or_else(|e| panic!("{} {}: {}", type_, v, e))
    }

    fn rejected(type_: &str, v: Value) {
        match coerce_value(&col(type_), &v) {
            Err(AppError::Validation(_)) => {}
            other => panic!("{} {} should be rejected, got {:?}", type_, v, other),
        }
    }

    #[test]
    fn integers() {
        assert_eq!(ok("integer", json!("42")), BindValue::Int(42));
        assert_eq!(ok("bigserial", json!(9_000_000_000i64)), BindValue::Int(9_000_000_000));
        assert_eq!(ok("int2", json!(" -7 ")), BindValue::Int(-7));
        rejected("integer", json!("4x"));
        rejected("smallint", json!(40000));
        rejected("integer", json!(1.5));
        rejected("integer", json!(true));
    }

    #[test]
    fn floats_and_numeric() {
        assert_eq!(ok("double precision", json!("3.25")), BindValue::Float(3.25));
        assert_eq!(ok("real", json!(2)), BindValue::Float(2.0));
        assert_eq!(ok("numeric(10,2)", json!("12.50")), BindValue::Text("12.50".into()));
        rejected("numeric", json!("12,50"));
        rejected("float8", json!("abc"));
    }

    #[test]
    fn booleans() {
        for t in ["true", "T", "yes", "Y", "1"] {
            assert_eq!(ok("boolean", json!(t)), BindValue::Bool(true), "{}", t);
        }
        for f in ["false", "f", "NO", "n", "0"] {
            assert_eq!(ok("bool", json!(f)), BindValue::Bool(false), "{}", f);
        }
        assert_eq!(ok("bool", json!(true)), BindValue::Bool(true));
        rejected("boolean", json!("maybe"));
    }

    #[test]
    fn json_values() {
        assert_eq!(ok("jsonb", json!({"a": 1})), BindValue::Json(json!({"a": 1})));
        assert_eq!(ok("json", json!("[1,2]")), BindValue::Json(json!([1, 2])));
        rejected("jsonb", json!("{not json"));
    }

    #[test]
    fn uuids() {
        let u = uuid::Uuid::new_v4();
        assert_eq!(ok("uuid", json!(u.to_string())), BindValue::Uuid(u));
        rejected("uuid", json!("not-a-uuid"));
    }

    #[test]
    fn dates_and_times() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(ok("date", json!("2024-02-29")), BindValue::Date(d));
        assert_eq!(ok("date", json!("2024-02-29T10:00:00Z")), BindValue::Date(d));
        assert_eq!(ok("date", json!("2024/02/29")), BindValue::Date(d));
        rejected("date", json!("2023-02-29"));

        let ts = d.and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(ok("timestamp", json!("2024-02-29 10:30:00")), BindValue::Timestamp(ts));
        assert_eq!(ok("timestamp", json!("2024-02-29T10:30")), BindValue::Timestamp(ts));
        assert_eq!(
            ok("timestamptz", json!("2024-02-29T12:30:00+02:00")),
            BindValue::TimestampTz(Utc.from_utc_datetime(&ts))
        );
        assert_eq!(
            ok("timestamp with time zone", json!("2024-02-29 10:30:00")),
            BindValue::TimestampTz(Utc.from_utc_datetime(&ts))
        );
        rejected("timestamp", json!("yesterday-ish"));

        assert_eq!(ok("time", json!("08:15")), BindValue::Time(NaiveTime::from_hms_opt(8, 15, 0).unwrap()));
        assert_eq!(ok("timetz", json!("08:15:00+02")), BindValue::Text("08:15:00+02".into()));
        rejected("time", json!("25:99"));
        rejected("timetz", json!("noon"));
    }

    #[test]
    fn intervals_are_best_effort() {
        assert_eq!(ok("interval", json!("3 days")), BindValue::Text("3 days".into()));
        assert_eq!(ok("interval", json!("1 Hour")), BindValue::Text("1 hours".into()));
        assert_eq!(ok("interval", json!("10 min")), BindValue::Text("10 minutes".into()));
        assert_eq!(ok("interval", json!("P1Y2M")), BindValue::Text("P1Y2M".into()));
    }

    #[test]
    fn money() {
        assert_eq!(ok("money", json!("$1,234.50")), BindValue::Text("1234.50".into()));
        assert_eq!(ok("money", json!(12.5)), BindValue::Text("12.5".into()));
        rejected("money", json!("twelve dollars"));
    }

    #[test]
    fn bytea_inputs() {
        assert_eq!(ok("bytea", json!("\\xdeadbeef")), BindValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(ok("bytea", json!("aGVsbG8=")), BindValue::Bytes(b"hello".to_vec()));
        assert_eq!(ok("bytea", json!("hello world!")), BindValue::Bytes(b"hello world!".to_vec()));
        assert_eq!(ok("bytea", json!([1, 2, 255])), BindValue::Bytes(vec![1, 2, 255]));
        rejected("bytea", json!([256]));
    }

    #[test]
    fn network_addresses() {
        assert_eq!(ok("inet", json!("10.1.2.3/16")), BindValue::Text("10.1.2.3/16".into()));
        assert_eq!(ok("cidr", json!("10.1.0.0/16")), BindValue::Text("10.1.0.0/16".into()));
        assert_eq!(ok("macaddr", json!("08:00:2b:01:02:03")), BindValue::Text("08:00:2b:01:02:03".into()));
        rejected("inet", json!("999.1.1.1"));
        rejected("cidr", json!("10.1.2.3/16"));
        rejected("macaddr", json!("08:00:2b"));
        rejected("macaddr8", json!("nope"));
    }

    #[test]
    fn bit_strings() {
        assert_eq!(ok("bit(4)", json!("1010")), BindValue::Text("1010".into()));
        assert_eq!(ok("varbit", json!(101)), BindValue::Text("101".into()));
        rejected("bit(4)", json!("1020"));
    }

    #[test]
    fn arrays_coerce_each_element() {
        assert_eq!(
            ok("integer[]", json!([1, "2", null])),
            BindValue::Array(vec![BindValue::Int(1), BindValue::Int(2), BindValue::Null])
        );
        assert_eq!(
            ok("text[]", json!("{a,\"b,c\",NULL}")),
            BindValue::Array(vec![
                BindValue::Text("a".into()),
                BindValue::Text("b,c".into()),
                BindValue::Null
            ])
        );
        assert_eq!(
            ok("int[][]", json!("{{1,2},{3,4}}")),
            BindValue::Array(vec![
                BindValue::Array(vec![BindValue::Int(1), BindValue::Int(2)]),
                BindValue::Array(vec![BindValue::Int(3), BindValue::Int(4)]),
            ])
        );
        assert_eq!(ok("integer[]", json!("{}")), BindValue::Array(vec![]));
        rejected("integer[]", json!([1, "x"]));
        rejected("integer[]", json!("1,2"));
    }

    #[test]
    fn geometric_values() {
        assert_eq!(ok("point", json!("(1,2)")), BindValue::Geometry(Geometry::Point { x: 1.0, y: 2.0 }));
        assert_eq!(
            ok("circle", json!({"x": 0, "y": 0, "r": 2})),
            BindValue::Geometry(Geometry::Circle { x: 0.0, y: 0.0, r: 2.0 })
        );
        assert_eq!(ok("polygon", json!("((0,0),(1,1),(1,0))")), BindValue::Text("((0,0),(1,1),(1,0))".into()));
        rejected("point", json!("(1)"));
    }

    #[test]
    fn text_and_unknown_pass_through() {
        assert_eq!(ok("varchar(3)", json!("abcdef")), BindValue::Text("abcdef".into()));
        assert_eq!(ok("text", json!(5)), BindValue::Text("5".into()));
        assert_eq!(ok("mood", json!("happy")), BindValue::Text("happy".into()));
    }

    #[test]
    fn empty_string_policy_depends_on_nullability() {
        assert_eq!(ok("integer", json!("")), BindValue::Null);
        let required = ColumnDefinition::new("c", "integer").not_null();
        assert_eq!(coerce_value(&required, &json!("")).unwrap(), BindValue::Text(String::new()));
        assert_eq!(ok("integer", Value::Null), BindValue::Null);
    }
}
