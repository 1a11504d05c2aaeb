//! Results of ad-hoc SQL execution plus persisted history and snippets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, Serialize)]
pub struct QueryExecutionResult {
    pub success: bool,
    pub read_only: bool,
    pub execution_time_ms: f64,
    pub row_count: i64,
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<OperationSummary>,
}

impl QueryExecutionResult {
    pub fn failed(read_only: bool, execution_time_ms: f64, error: String) -> Self {
        QueryExecutionResult {
            success: false,
            read_only,
            execution_time_ms,
            error: Some(error),
            ..Default::default()
        }
    }
}

/// One line of the structured effect table shown for DDL/DML.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryEntry {
    pub operation: String,
    pub object_type: String,
    pub object_name: String,
    pub detail: String,
    pub status: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OperationSummary {
    pub tables_created: u32,
    pub tables_altered: u32,
    pub tables_dropped: u32,
    pub indexes_created: u32,
    pub indexes_dropped: u32,
    pub rows_affected: u64,
    pub entries: Vec<SummaryEntry>,
}

impl OperationSummary {
    /// Rows shaped like a result set, so callers can render the summary as a table.
    pub fn as_rows(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "operation": e.operation,
                    "object_type": e.object_type,
                    "object_name": e.object_name,
                    "detail": e.detail,
                    "status": e.status,
                })
            })
            .collect()
    }

    pub const COLUMNS: [&'static str; 5] = ["operation", "object_type", "object_name", "detail", "status"];
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueryHistoryEntry {
    pub id: i64,
    pub query: String,
    pub read_only: bool,
    pub execution_time_ms: f64,
    pub row_count: i64,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub user_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct SqlSnippet {
    pub id: uuid::Uuid,
    pub name: String,
    pub sql: String,
    pub description: Option<String>,
    pub is_shared: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewSnippet {
    pub name: String,
    pub sql: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_shared: bool,
}
