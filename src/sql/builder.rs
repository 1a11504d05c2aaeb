//! Builds DDL and parameterized DML from validated definitions.
//! Identifiers are always quoted here; values are always bound as parameters.

use crate::coerce::TypeFamily;
use crate::error::AppError;
use crate::model::{ColumnDefinition, IndexDefinition, TableDefinition};
use crate::sql::BindValue;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));
/// One optional `(n)` or `(p, s)` modifier.
const TYPE_MODIFIER: &str = r"(?:\(\s*\d+(?:\s*,\s*\d+)?\s*\))?";
static TYPE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    let bases = [
        format!(r"(?:[A-Za-z_][A-Za-z0-9_]*\.)?[A-Za-z_][A-Za-z0-9_]*{}", TYPE_MODIFIER),
        r"double\s+precision".to_string(),
        format!(r"(?:character|char|bit)\s+varying{}", TYPE_MODIFIER),
        format!(r"time(?:stamp)?{}\s+with(?:out)?\s+time\s+zone", TYPE_MODIFIER),
        format!(
            r"interval(?:\s+(?:year|month|day|hour|minute|second)(?:\s+to\s+(?:month|hour|minute|second))?)?{}",
            TYPE_MODIFIER
        ),
    ];
    Regex::new(&format!(r"^(?i:{})(?:\[\d*\])*$", bases.join("|"))).expect("valid type name regex")
});
static FUNCTION_CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*\s*\(.*\)$").expect("valid function call regex"));
const DEFAULT_KEYWORDS: &[&str] = &["current_timestamp", "current_date", "current_time", "localtimestamp", "localtime"];

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

/// Single-quoted SQL string literal.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn validate_identifier(s: &str) -> Result<(), AppError> {
    if s.len() > MAX_IDENTIFIER_LEN || !IDENTIFIER_RE.is_match(s) {
        return Err(AppError::Validation(format!("invalid identifier '{}'", s)));
    }
    Ok(())
}

/// Type names cannot be quoted. A single word passes, as do the built-in multi-word spellings;
/// trailing words such as `primary key` never do.
pub fn validate_type_name(s: &str) -> Result<(), AppError> {
    if !TYPE_NAME_RE.is_match(s.trim()) {
        return Err(AppError::Validation(format!("invalid type '{}'", s)));
    }
    Ok(())
}

/// Expression text that can be emitted verbatim: no statement breaks, no comments,
/// balanced quotes and parentheses.
fn is_contained_expression(s: &str) -> bool {
    if s.contains(';') || s.contains("--") || s.contains("/*") {
        return false;
    }
    let mut depth = 0i32;
    let mut in_quote = false;
    for c in s.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_quote
}

/// Render a column default: function calls, datetime keywords and pre-quoted literals
/// verbatim; other strings quoted; booleans and numbers as tokens; structured values as JSON text.
pub fn format_default(v: &Value) -> String {
    match v {
        Value::Null => "NULL".into(),
        Value::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            let t = s.trim();
            let verbatim = FUNCTION_CALL_RE.is_match(t)
                || DEFAULT_KEYWORDS.contains(&t.to_ascii_lowercase().as_str())
                || t.starts_with('\'');
            if verbatim && is_contained_expression(t) {
                t.to_string()
            } else {
                quote_literal(s)
            }
        }
        other => quote_literal(&other.to_string()),
    }
}

/// UUID primary keys without an explicit default get `gen_random_uuid()`.
pub fn apply_generated_defaults(columns: &mut [ColumnDefinition]) {
    for c in columns.iter_mut() {
        if c.primary_key && c.default.is_none() && TypeFamily::parse(&c.type_).is_uuid() {
            c.default = Some(Value::String("gen_random_uuid()".into()));
        }
    }
}

/// `"name" TYPE [NOT NULL] [UNIQUE] [DEFAULT expr]`; primary keys are emitted separately.
pub fn column_fragment(c: &ColumnDefinition) -> String {
    let mut def = format!("{} {}", quoted(&c.name), c.type_.trim());
    if !c.nullable || c.primary_key {
        def.push_str(" NOT NULL");
    }
    if c.unique && !c.primary_key {
        def.push_str(" UNIQUE");
    }
    if let Some(d) = &c.default {
        def.push_str(" DEFAULT ");
        def.push_str(&format_default(d));
    }
    def
}

pub fn create_table(schema: &str, def: &TableDefinition) -> String {
    let mut parts: Vec<String> = def.columns.iter().map(column_fragment).collect();
    let pk: Vec<String> = def.columns.iter().filter(|c| c.primary_key).map(|c| quoted(&c.name)).collect();
    if !pk.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }
    format!(
        "CREATE TABLE {} (\n  {}\n)",
        qualified_table(schema, &def.name),
        parts.join(",\n  ")
    )
}

/// None when the index declares no columns.
pub fn create_index(schema: &str, table: &str, idx: &IndexDefinition) -> Option<String> {
    if idx.columns.is_empty() {
        return None;
    }
    let cols: Vec<String> = idx.columns.iter().map(|c| quoted(c)).collect();
    Some(format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if idx.unique { "UNIQUE " } else { "" },
        quoted(&idx.resolved_name(table)),
        qualified_table(schema, table),
        cols.join(", ")
    ))
}

pub fn drop_table(schema: &str, table: &str, cascade: bool) -> String {
    format!(
        "DROP TABLE IF EXISTS {}{}",
        qualified_table(schema, table),
        if cascade { " CASCADE" } else { "" }
    )
}

pub fn rename_table(schema: &str, table: &str, new_name: &str) -> String {
    format!("ALTER TABLE {} RENAME TO {}", qualified_table(schema, table), quoted(new_name))
}

pub fn add_column(schema: &str, table: &str, c: &ColumnDefinition) -> String {
    format!("ALTER TABLE {} ADD COLUMN {}", qualified_table(schema, table), column_fragment(c))
}

pub fn add_primary_key(schema: &str, table: &str, columns: &[&str]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quoted(c)).collect();
    format!("ALTER TABLE {} ADD PRIMARY KEY ({})", qualified_table(schema, table), cols.join(", "))
}

pub fn drop_column(schema: &str, table: &str, column: &str) -> String {
    format!("ALTER TABLE {} DROP COLUMN {}", qualified_table(schema, table), quoted(column))
}

pub fn rename_column(schema: &str, table: &str, column: &str, new_name: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        qualified_table(schema, table),
        quoted(column),
        quoted(new_name)
    )
}

pub fn alter_column_type(schema: &str, table: &str, column: &str, type_: &str) -> String {
    let type_ = type_.trim();
    format!(
        "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
        qualified_table(schema, table),
        quoted(column),
        type_,
        quoted(column),
        type_
    )
}

pub fn alter_column_nullable(schema: &str, table: &str, column: &str, nullable: bool) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
        qualified_table(schema, table),
        quoted(column),
        if nullable { "DROP" } else { "SET" }
    )
}

/// `None` drops the default.
pub fn alter_column_default(schema: &str, table: &str, column: &str, default: Option<&Value>) -> String {
    let action = match default {
        Some(v) => format!("SET DEFAULT {}", format_default(v)),
        None => "DROP DEFAULT".to_string(),
    };
    format!("ALTER TABLE {} ALTER COLUMN {} {}", qualified_table(schema, table), quoted(column), action)
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a value and return its `$n::type` placeholder for `column`.
    fn push_param(&mut self, column: &ColumnDefinition, v: BindValue) -> String {
        self.params.push(v);
        placeholder(self.params.len(), column)
    }
}

fn placeholder(n: usize, column: &ColumnDefinition) -> String {
    let cast = TypeFamily::parse(&column.type_).cast_name();
    if validate_type_name(&cast).is_ok() {
        format!("${}::{}", n, cast)
    } else {
        format!("${}", n)
    }
}

/// SELECT list: arrays as JSON, families sqlx cannot decode as `::text`, the rest as-is.
pub fn select_projection(columns: &[ColumnDefinition]) -> String {
    if columns.is_empty() {
        return "*".into();
    }
    columns
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            let family = TypeFamily::parse(&c.type_);
            if family.is_array() {
                format!("to_jsonb({}) AS {}", q, q)
            } else if family.reads_as_text() {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// INSERT of the given column values, returning the full row (DB defaults included).
pub fn insert_row(
    schema: &str,
    table: &str,
    columns: &[ColumnDefinition],
    values: Vec<(&ColumnDefinition, BindValue)>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (c, v) in values {
        cols.push(quoted(&c.name));
        placeholders.push(q.push_param(c, v));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        qualified_table(schema, table),
        cols.join(", "),
        placeholders.join(", "),
        select_projection(columns)
    );
    q
}

/// Equality filter on one declared column.
pub struct Filter<'a> {
    pub column: &'a ColumnDefinition,
    pub value: BindValue,
}

/// `column = placeholder`, compared through a cast when the type has no plain `=`.
fn equals(column: &ColumnDefinition, placeholder: &str) -> String {
    match TypeFamily::parse(&column.type_).equality_cast() {
        Some(cast) => format!("{}::{} = {}::{}", quoted(&column.name), cast, placeholder, cast),
        None => format!("{} = {}", quoted(&column.name), placeholder),
    }
}

fn where_clause(q: &mut QueryBuf, filter: Option<Filter<'_>>) -> String {
    match filter {
        Some(f) if f.value == BindValue::Null => format!(" WHERE {} IS NULL", quoted(&f.column.name)),
        Some(f) => {
            let ph = q.push_param(f.column, f.value);
            format!(" WHERE {}", equals(f.column, &ph))
        }
        None => String::new(),
    }
}

/// One page of rows. Without an explicit order the primary key (if any) keeps paging stable.
pub fn select_page(
    schema: &str,
    table: &str,
    columns: &[ColumnDefinition],
    filter: Option<Filter<'_>>,
    order_by: Option<(&str, bool)>,
    limit: u32,
    offset: u64,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, filter);
    let order_sql = match order_by {
        Some((col, desc)) => format!(" ORDER BY {} {}", quoted(col), if desc { "DESC" } else { "ASC" }),
        None => {
            let pk: Vec<String> = columns.iter().filter(|c| c.primary_key).map(|c| quoted(&c.name)).collect();
            if pk.is_empty() {
                String::new()
            } else {
                format!(" ORDER BY {}", pk.join(", "))
            }
        }
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
        select_projection(columns),
        qualified_table(schema, table),
        where_sql,
        order_sql,
        limit,
        offset
    );
    q
}

/// COUNT(*) with the same filter as `select_page`.
pub fn count_rows(schema: &str, table: &str, filter: Option<Filter<'_>>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, filter);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(schema, table), where_sql);
    q
}

/// UPDATE by id column: SET only the given columns, RETURNING the row.
pub fn update_row(
    schema: &str,
    table: &str,
    columns: &[ColumnDefinition],
    id_column: &ColumnDefinition,
    id: BindValue,
    updates: Vec<(&ColumnDefinition, BindValue)>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(updates.len());
    for (c, v) in updates {
        let ph = q.push_param(c, v);
        sets.push(format!("{} = {}", quoted(&c.name), ph));
    }
    let id_ph = q.push_param(id_column, id);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING {}",
        qualified_table(schema, table),
        sets.join(", "),
        equals(id_column, &id_ph),
        select_projection(columns)
    );
    q
}

/// DELETE by id column.
pub fn delete_row(schema: &str, table: &str, id_column: &ColumnDefinition, id: BindValue) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_ph = q.push_param(id_column, id);
    q.sql = format!(
        "DELETE FROM {} WHERE {}",
        qualified_table(schema, table),
        equals(id_column, &id_ph)
    );
    q
}
