//! Closed set of column type families. Every declared or introspected type string
//! resolves to exactly one variant; anything unrecognised lands in `Unknown`.

use once_cell::sync::Lazy;
use regex::Regex;

static TYPE_MODIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\d+(\s*,\s*\d+)?\s*\)").expect("valid type modifier regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeFamily {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Boolean,
    Json,
    Jsonb,
    Uuid,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    Money,
    Bytea,
    Inet,
    Cidr,
    MacAddr,
    MacAddr8,
    Bit,
    VarBit,
    Point,
    Circle,
    Box,
    Lseg,
    Line,
    Path,
    Polygon,
    Text,
    Array(Box<TypeFamily>),
    Unknown(String),
}

impl TypeFamily {
    /// Resolve a declared type such as `varchar(20)`, `timestamp with time zone` or `int4[]`.
    pub fn parse(type_name: &str) -> TypeFamily {
        let trimmed = type_name.trim();
        if let Some(base) = trimmed.strip_suffix("[]") {
            return TypeFamily::Array(Box::new(TypeFamily::parse(base)));
        }
        let lowered = trimmed.to_ascii_lowercase();
        let stripped = TYPE_MODIFIER_RE.replace_all(&lowered, "");
        let normalized = WHITESPACE_RE.replace_all(stripped.trim(), " ");
        match normalized.as_ref() {
            "smallint" | "int2" | "smallserial" | "serial2" => TypeFamily::SmallInt,
            "integer" | "int" | "int4" | "serial" | "serial4" => TypeFamily::Integer,
            "bigint" | "int8" | "bigserial" | "serial8" => TypeFamily::BigInt,
            "real" | "float4" => TypeFamily::Real,
            "double precision" | "float8" | "float" => TypeFamily::Double,
            "numeric" | "decimal" => TypeFamily::Numeric,
            "boolean" | "bool" => TypeFamily::Boolean,
            "json" => TypeFamily::Json,
            "jsonb" => TypeFamily::Jsonb,
            "uuid" => TypeFamily::Uuid,
            "date" => TypeFamily::Date,
            "time" | "time without time zone" => TypeFamily::Time,
            "timetz" | "time with time zone" => TypeFamily::TimeTz,
            "timestamp" | "timestamp without time zone" => TypeFamily::Timestamp,
            "timestamptz" | "timestamp with time zone" => TypeFamily::TimestampTz,
            "money" => TypeFamily::Money,
            "bytea" => TypeFamily::Bytea,
            "inet" => TypeFamily::Inet,
            "cidr" => TypeFamily::Cidr,
            "macaddr" => TypeFamily::MacAddr,
            "macaddr8" => TypeFamily::MacAddr8,
            "bit" => TypeFamily::Bit,
            "bit varying" | "varbit" => TypeFamily::VarBit,
            "point" => TypeFamily::Point,
            "circle" => TypeFamily::Circle,
            "box" => TypeFamily::Box,
            "lseg" => TypeFamily::Lseg,
            "line" => TypeFamily::Line,
            "path" => TypeFamily::Path,
            "polygon" => TypeFamily::Polygon,
            "text" | "varchar" | "character varying" | "char" | "character" | "bpchar" | "name" | "citext" => {
                TypeFamily::Text
            }
            s if s.starts_with("interval") => TypeFamily::Interval,
            _ => TypeFamily::Unknown(trimmed.to_string()),
        }
    }

    /// Type used for `$n::<type>` placeholder casts. Serial pseudo-types and
    /// length modifiers are dropped so the column's assignment cast does the checking.
    pub fn cast_name(&self) -> String {
        match self {
            TypeFamily::SmallInt => "smallint".into(),
            TypeFamily::Integer => "integer".into(),
            TypeFamily::BigInt => "bigint".into(),
            TypeFamily::Real => "real".into(),
            TypeFamily::Double => "double precision".into(),
            TypeFamily::Numeric => "numeric".into(),
            TypeFamily::Boolean => "boolean".into(),
            TypeFamily::Json => "json".into(),
            TypeFamily::Jsonb => "jsonb".into(),
            TypeFamily::Uuid => "uuid".into(),
            TypeFamily::Date => "date".into(),
            TypeFamily::Time => "time".into(),
            TypeFamily::TimeTz => "timetz".into(),
            TypeFamily::Timestamp => "timestamp".into(),
            TypeFamily::TimestampTz => "timestamptz".into(),
            TypeFamily::Interval => "interval".into(),
            TypeFamily::Money => "money".into(),
            TypeFamily::Bytea => "bytea".into(),
            TypeFamily::Inet => "inet".into(),
            TypeFamily::Cidr => "cidr".into(),
            TypeFamily::MacAddr => "macaddr".into(),
            TypeFamily::MacAddr8 => "macaddr8".into(),
            TypeFamily::Bit | TypeFamily::VarBit => "varbit".into(),
            TypeFamily::Point => "point".into(),
            TypeFamily::Circle => "circle".into(),
            TypeFamily::Box => "box".into(),
            TypeFamily::Lseg => "lseg".into(),
            TypeFamily::Line => "line".into(),
            TypeFamily::Path => "path".into(),
            TypeFamily::Polygon => "polygon".into(),
            TypeFamily::Text => "text".into(),
            TypeFamily::Array(inner) => format!("{}[]", inner.cast_name()),
            TypeFamily::Unknown(name) => name.clone(),
        }
    }

    /// Families whose wire form sqlx cannot decode into JSON directly; read back as `::text`.
    pub fn reads_as_text(&self) -> bool {
        matches!(
            self,
            TypeFamily::Numeric
                | TypeFamily::Money
                | TypeFamily::Interval
                | TypeFamily::Inet
                | TypeFamily::Cidr
                | TypeFamily::MacAddr
                | TypeFamily::MacAddr8
                | TypeFamily::Bit
                | TypeFamily::VarBit
                | TypeFamily::Point
                | TypeFamily::Circle
                | TypeFamily::Box
                | TypeFamily::Lseg
                | TypeFamily::Line
                | TypeFamily::Path
                | TypeFamily::Polygon
                | TypeFamily::Time
                | TypeFamily::TimeTz
                | TypeFamily::Unknown(_)
        )
    }

    /// Cast applied to both sides of an equality test for families PostgreSQL has no
    /// usable `=` for. Geometric `=` compares areas, so those go through text too.
    pub fn equality_cast(&self) -> Option<&'static str> {
        match self {
            TypeFamily::Json => Some("jsonb"),
            TypeFamily::Point
            | TypeFamily::Circle
            | TypeFamily::Box
            | TypeFamily::Lseg
            | TypeFamily::Line
            | TypeFamily::Path
            | TypeFamily::Polygon => Some("text"),
            TypeFamily::Array(inner) if inner.equality_cast().is_some() => Some("text"),
            _ => None,
        }
    }

    pub fn is_uuid(&self) -> bool {
        matches!(self, TypeFamily::Uuid)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeFamily::Array(_))
    }
}
