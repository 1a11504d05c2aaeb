//! Caller-declared table definitions and the registry record built from them.

use crate::sql::MAX_IDENTIFIER_LEN;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    /// Literal or expression; see `sql::format_default`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_true() -> bool {
    true
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, type_: impl Into<String>) -> Self {
        ColumnDefinition {
            name: name.into(),
            type_: type_.into(),
            nullable: true,
            unique: false,
            default: None,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Derived as `idx_<table>_<columns>` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDefinition {
    /// Explicit name, else `idx_<table>_<cols>` cut to the length PostgreSQL keeps.
    pub fn resolved_name(&self, table: &str) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => {
                let mut derived = format!("idx_{}_{}", table, self.columns.join("_"));
                let mut end = derived.len().min(MAX_IDENTIFIER_LEN);
                while !derived.is_char_boundary(end) {
                    end -= 1;
                }
                derived.truncate(end);
                derived
            }
        }
    }
}

/// Input to `TableService::create`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        TableDefinition {
            name: name.into(),
            columns,
            indexes: Vec::new(),
            is_public: false,
            description: None,
            metadata: Map::new(),
        }
    }
}

/// Schema document stored in the registry's `schema_doc` JSONB column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDefinition> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// One registry row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableRecord {
    pub name: String,
    #[serde(flatten)]
    pub schema: TableSchema,
    pub is_public: bool,
    pub owner_id: String,
    pub description: Option<String>,
    pub metadata: Map<String, Value>,
    pub row_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TableRecord {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.schema.column(name)
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.schema.columns
    }
}

/// Partial update of registry-level fields, with optional rename.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TableMetadataUpdate {
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Column change applied in order: rename, type, nullability, default.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ColumnUpdate {
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub default: Option<Value>,
    /// Drop the current default; ignored when `default` is set.
    #[serde(default)]
    pub drop_default: bool,
}

impl ColumnUpdate {
    pub fn is_empty(&self) -> bool {
        self.new_name.is_none()
            && self.type_.is_none()
            && self.nullable.is_none()
            && self.default.is_none()
            && !self.drop_default
    }
}

/// Paging, ordering and single-column equality filter for `TableService::get_data`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_desc: bool,
    #[serde(default)]
    pub filter_column: Option<String>,
    #[serde(default)]
    pub filter_value: Option<Value>,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    50
}

impl Default for DataQuery {
    fn default() -> Self {
        DataQuery {
            page: default_page(),
            page_size: default_page_size(),
            order_by: None,
            order_desc: false,
            filter_column: None,
            filter_value: None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl From<&ColumnDefinition> for ColumnDescriptor {
    fn from(c: &ColumnDefinition) -> Self {
        ColumnDescriptor {
            name: c.name.clone(),
            type_: c.type_.clone(),
            nullable: c.nullable,
            primary_key: c.primary_key,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_count: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32, total_count: i64) -> Self {
        let size = i64::from(page_size.max(1));
        Pagination {
            page,
            page_size,
            total_count,
            total_pages: (total_count + size - 1) / size,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TableData {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Value>,
    pub pagination: Pagination,
}

/// Outcome of reconciling the registry against the live catalog.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ResyncReport {
    pub registered: Vec<String>,
    pub deregistered: Vec<String>,
    pub refreshed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_definition_defaults_from_json() {
        let c: ColumnDefinition = serde_json::from_value(json!({"name": "title", "type": "text"})).unwrap();
        assert!(c.nullable);
        assert!(!c.unique);
        assert!(!c.primary_key);
        assert!(c.default.is_none());
    }

    #[test]
    fn index_name_is_derived_when_missing() {
        let idx = IndexDefinition { name: None, columns: vec!["a".into(), "b".into()], unique: false };
        assert_eq!(idx.resolved_name("t"), "idx_t_a_b");
    }

    #[test]
    fn derived_index_name_fits_an_identifier() {
        let table = "t".repeat(40);
        let idx = IndexDefinition { name: None, columns: vec!["c".repeat(30)], unique: false };
        let name = idx.resolved_name(&table);
        assert_eq!(name.len(), 63);
        assert!(name.starts_with(&format!("idx_{}_ccc", table)));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(Pagination::new(1, 2, 5).total_pages, 3);
        assert_eq!(Pagination::new(1, 2, 4).total_pages, 2);
        assert_eq!(Pagination::new(1, 10, 0).total_pages, 0);
    }
}
