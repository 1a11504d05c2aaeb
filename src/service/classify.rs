//! Heuristic statement classification for ad-hoc SQL: deny-list, read-only detection and
//! recognition of the DDL/DML shapes that drive registry sync and result summaries.
//! All rules are ordered tables of regexes; this is not a SQL parser.

use crate::model::{OperationSummary, SummaryEntry};
use once_cell::sync::Lazy;
use regex::Regex;

/// Matched against the lower-cased statement. First hit wins.
static DENY_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\bdrop\s+database\b", "DROP DATABASE"),
        (r"\balter\s+system\b", "ALTER SYSTEM"),
        (r"\bcreate\s+role\b", "CREATE ROLE"),
        (r"\bdrop\s+role\b", "DROP ROLE"),
        (r"\balter\s+role\b", "ALTER ROLE"),
        (r"\bcreate\s+user\b", "CREATE USER"),
        (r"\bdrop\s+user\b", "DROP USER"),
        (r"\balter\s+user\b", "ALTER USER"),
        // `SET role = 'x'` inside an UPDATE is an assignment, not a role switch.
        (r"\bset\s+(?:(?:session|local)\s+)?role(?:\s*$|\s*;|\s+[^=\s])", "SET ROLE"),
        (r"\bpg_terminate_backend\b", "pg_terminate_backend"),
        (r"\bpg_cancel_backend\b", "pg_cancel_backend"),
        (r"\bcopy\b[\s\S]*?\b(from|to)\s+program\b", "COPY ... PROGRAM"),
        (r"\bcopy\b[\s\S]*?\bfrom\s+stdin\b", "COPY ... FROM STDIN"),
        (r"\bcopy\b[\s\S]*?\bto\s+stdin\b", "COPY ... TO STDIN"),
        (r"\bcopy\b[\s\S]*?\bto\s+stdout\b", "COPY ... TO STDOUT"),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("valid deny rule"), label))
    .collect()
});

const READ_ONLY_KEYWORDS: &[&str] = &["select", "show", "explain", "describe", "values", "table"];

static LEADING_NOISE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\s+|--[^\n]*(?:\n|$)|/\*[\s\S]*?\*/|\()*").expect("valid leading noise regex"));
static FIRST_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z]+)").expect("valid first word regex"));
static SELECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bselect\b").expect("valid select regex"));
static RETURNING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\breturning\b").expect("valid returning regex"));

/// One possibly schema-qualified, possibly quoted identifier.
const NAME: &str = r#"(?:"(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_$]*)"#;

static CREATE_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^create\s+(?:(?:global\s+|local\s+)?(?:temp|temporary)\s+|unlogged\s+)?table\s+(?:if\s+not\s+exists\s+)?({q})",
        q = qualified()
    ))
    .expect("valid create table regex")
});
static ALTER_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^alter\s+table\s+(?:if\s+exists\s+)?(?:only\s+)?({q})(?:\s+rename\s+to\s+({n}))?",
        q = qualified(),
        n = NAME
    ))
    .expect("valid alter table regex")
});
static DROP_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^drop\s+table\s+(?:if\s+exists\s+)?({l})", l = name_list())).expect("valid drop table regex")
});
static CREATE_INDEX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^create\s+(?:unique\s+)?index\s+(?:concurrently\s+)?(?:if\s+not\s+exists\s+)?(?:({q})\s+)?on\s+(?:only\s+)?({q})",
        q = qualified()
    ))
    .expect("valid create index regex")
});
static DROP_INDEX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^drop\s+index\s+(?:concurrently\s+)?(?:if\s+exists\s+)?({l})",
        l = name_list()
    ))
    .expect("valid drop index regex")
});
static INSERT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)^insert\s+into\s+({q})", q = qualified())).expect("valid insert regex"));
static UPDATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)^update\s+(?:only\s+)?({q})", q = qualified())).expect("valid update regex"));
static DELETE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^delete\s+from\s+(?:only\s+)?({q})", q = qualified())).expect("valid delete regex")
});
static TRUNCATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^truncate\s+(?:table\s+)?(?:only\s+)?({l})", l = name_list())).expect("valid truncate regex")
});

fn qualified() -> String {
    format!(r"{n}(?:\s*\.\s*{n})?", n = NAME)
}

fn name_list() -> String {
    format!(r"{q}(?:\s*,\s*{q})*", q = qualified())
}

/// Table or index reference as written, with unquoted parts folded to lower case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectName {
    pub schema: Option<String>,
    pub name: String,
}

impl ObjectName {
    /// Whether the reference resolves into `schema` (unqualified names do).
    pub fn in_schema(&self, schema: &str) -> bool {
        self.schema.as_deref().map_or(true, |s| s == schema)
    }
}

impl std::fmt::Display for ObjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(s) => write!(f, "{}.{}", s, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    CreateTable(ObjectName),
    AlterTable { table: ObjectName, rename_to: Option<String> },
    DropTable(Vec<ObjectName>),
    CreateIndex { index: Option<ObjectName>, table: ObjectName },
    DropIndex(Vec<ObjectName>),
    Insert(ObjectName),
    Update(ObjectName),
    Delete(ObjectName),
    Truncate(Vec<ObjectName>),
    Other,
}

/// Deny-list label of the first forbidden operation found, if any.
pub fn denied_operation(sql: &str) -> Option<&'static str> {
    let lower = sql.to_lowercase();
    DENY_RULES.iter().find(|(re, _)| re.is_match(&lower)).map(|(_, label)| *label)
}

/// Statement text past leading whitespace, comments and opening parentheses.
fn body(sql: &str) -> &str {
    match LEADING_NOISE_RE.find(sql) {
        Some(m) => &sql[m.end()..],
        None => sql,
    }
}

fn first_keyword(sql: &str) -> Option<String> {
    FIRST_WORD_RE.captures(body(sql)).map(|c| c[1].to_lowercase())
}

pub fn is_read_only(sql: &str) -> bool {
    match first_keyword(sql).as_deref() {
        Some("with") => SELECT_RE.is_match(&sql.to_lowercase()),
        Some(kw) => READ_ONLY_KEYWORDS.contains(&kw),
        None => false,
    }
}

pub fn has_returning(sql: &str) -> bool {
    RETURNING_RE.is_match(sql)
}

pub fn classify(sql: &str) -> Statement {
    let s = body(sql);
    if let Some(c) = CREATE_TABLE_RE.captures(s) {
        return Statement::CreateTable(parse_name(&c[1]));
    }
    if let Some(c) = ALTER_TABLE_RE.captures(s) {
        return Statement::AlterTable {
            table: parse_name(&c[1]),
            rename_to: c.get(2).map(|m| unquote(m.as_str())),
        };
    }
    if let Some(c) = DROP_TABLE_RE.captures(s) {
        return Statement::DropTable(parse_list(&c[1]));
    }
    if let Some(c) = CREATE_INDEX_RE.captures(s) {
        return Statement::CreateIndex {
            index: c.get(1).map(|m| parse_name(m.as_str())),
            table: parse_name(&c[2]),
        };
    }
    if let Some(c) = DROP_INDEX_RE.captures(s) {
        return Statement::DropIndex(parse_list(&c[1]));
    }
    if let Some(c) = INSERT_RE.captures(s) {
        return Statement::Insert(parse_name(&c[1]));
    }
    if let Some(c) = UPDATE_RE.captures(s) {
        return Statement::Update(parse_name(&c[1]));
    }
    if let Some(c) = DELETE_RE.captures(s) {
        return Statement::Delete(parse_name(&c[1]));
    }
    if let Some(c) = TRUNCATE_RE.captures(s) {
        return Statement::Truncate(parse_list(&c[1]));
    }
    Statement::Other
}

/// `"My Table"` -> `My Table`, `Users` -> `users`.
fn unquote(part: &str) -> String {
    let part = part.trim();
    if part.len() >= 2 && part.starts_with('"') && part.ends_with('"') {
        part[1..part.len() - 1].replace("\"\"", "\"")
    } else {
        part.to_lowercase()
    }
}

/// Split on `sep` outside double quotes.
fn split_outside_quotes(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quote = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        if ch == '"' {
            in_quote = !in_quote;
        } else if ch == sep && !in_quote {
            parts.push(&s[start..i]);
            start = i + ch.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn parse_name(s: &str) -> ObjectName {
    let parts = split_outside_quotes(s, '.');
    match parts.as_slice() {
        [schema, name] => ObjectName {
            schema: Some(unquote(schema)),
            name: unquote(name),
        },
        _ => ObjectName {
            schema: None,
            name: unquote(s),
        },
    }
}

fn parse_list(s: &str) -> Vec<ObjectName> {
    split_outside_quotes(s, ',').into_iter().map(parse_name).collect()
}

fn entry(operation: &str, object_type: &str, object_name: String, detail: String) -> SummaryEntry {
    SummaryEntry {
        operation: operation.into(),
        object_type: object_type.into(),
        object_name,
        detail,
        status: "success".into(),
    }
}

/// Command tag in the engine's style (`CREATE TABLE`, `INSERT 0 3`, `UPDATE 2`).
pub fn command_tag(statement: &Statement, sql: &str, rows_affected: u64) -> String {
    match statement {
        Statement::CreateTable(_) => "CREATE TABLE".into(),
        Statement::AlterTable { .. } => "ALTER TABLE".into(),
        Statement::DropTable(_) => "DROP TABLE".into(),
        Statement::CreateIndex { .. } => "CREATE INDEX".into(),
        Statement::DropIndex(_) => "DROP INDEX".into(),
        Statement::Insert(_) => format!("INSERT 0 {}", rows_affected),
        Statement::Update(_) => format!("UPDATE {}", rows_affected),
        Statement::Delete(_) => format!("DELETE {}", rows_affected),
        Statement::Truncate(_) => "TRUNCATE TABLE".into(),
        Statement::Other => {
            let kw = first_keyword(sql).unwrap_or_default().to_uppercase();
            if rows_affected > 0 {
                format!("{} {}", kw, rows_affected)
            } else {
                kw
            }
        }
    }
}

/// Structured effect of a successful mutating statement; `None` for unrecognized shapes.
pub fn summarize(statement: &Statement, rows_affected: u64) -> Option<OperationSummary> {
    let mut s = OperationSummary {
        rows_affected,
        ..Default::default()
    };
    match statement {
        Statement::CreateTable(t) => {
            s.tables_created = 1;
            s.entries.push(entry("CREATE", "TABLE", t.to_string(), "table created".into()));
        }
        Statement::AlterTable { table, rename_to } => {
            s.tables_altered = 1;
            let detail = match rename_to {
                Some(n) => format!("renamed to {}", n),
                None => "table altered".into(),
            };
            s.entries.push(entry("ALTER", "TABLE", table.to_string(), detail));
        }
        Statement::DropTable(tables) => {
            s.tables_dropped = tables.len() as u32;
            for t in tables {
                s.entries.push(entry("DROP", "TABLE", t.to_string(), "table dropped".into()));
            }
        }
        Statement::CreateIndex { index, table } => {
            s.indexes_created = 1;
            let name = index.as_ref().map(|i| i.to_string()).unwrap_or_else(|| "(generated)".into());
            s.entries.push(entry("CREATE", "INDEX", name, format!("on {}", table)));
        }
        Statement::DropIndex(indexes) => {
            s.indexes_dropped = indexes.len() as u32;
            for i in indexes {
                s.entries.push(entry("DROP", "INDEX", i.to_string(), "index dropped".into()));
            }
        }
        Statement::Insert(t) => {
            s.entries.push(entry("INSERT", "ROWS", t.to_string(), format!("{} row(s) inserted", rows_affected)));
        }
        Statement::Update(t) => {
            s.entries.push(entry("UPDATE", "ROWS", t.to_string(), format!("{} row(s) updated", rows_affected)));
        }
        Statement::Delete(t) => {
            s.entries.push(entry("DELETE", "ROWS", t.to_string(), format!("{} row(s) deleted", rows_affected)));
        }
        Statement::Truncate(tables) => {
            for t in tables {
                s.entries.push(entry("TRUNCATE", "TABLE", t.to_string(), "table truncated".into()));
            }
        }
        Statement::Other => return None,
    }
    Some(s)
}
