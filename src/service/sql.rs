//! Ad-hoc SQL execution: deny-list gate, read-only routing, registry sync after DDL,
//! summary shaping and per-user history. Snippet storage lives here too.

use super::classify::{self, ObjectName, Statement};
use super::script::split_statements;
use crate::catalog;
use crate::error::AppError;
use crate::model::{validate_table_name, NewSnippet, OperationSummary, QueryExecutionResult, QueryHistoryEntry, SqlSnippet};
use crate::settings::MAX_HISTORY_LIMIT;
use crate::sql::{column_names, raw_row_to_json};
use crate::state::CoreState;
use crate::store::NewTableRecord;
use sqlx::PgConnection;
use std::time::Instant;

#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptOptions {
    /// Stop at the first statement that fails instead of running the rest.
    pub stop_on_error: bool,
}

#[derive(Clone)]
pub struct SqlService {
    state: CoreState,
}

fn db_message(e: &sqlx::Error) -> String {
    match e.as_database_error() {
        Some(db) => db.message().to_string(),
        None => e.to_string(),
    }
}

impl SqlService {
    pub fn new(state: CoreState) -> Self {
        SqlService { state }
    }

    /// Run one statement as `user_id`. Forbidden operations are an error; empty input and
    /// database failures come back as an unsuccessful result.
    pub async fn execute_query(&self, sql: &str, user_id: &str) -> Result<QueryExecutionResult, AppError> {
        let sql = sql.trim();
        if sql.is_empty() {
            let result = QueryExecutionResult::failed(false, 0.0, "query is empty".into());
            self.record_history(user_id, sql, &result).await;
            return Ok(result);
        }
        if let Some(op) = classify::denied_operation(sql) {
            tracing::warn!(user = %user_id, operation = op, "denied statement");
            return Err(AppError::Security(format!("{} is not allowed", op)));
        }

        let read_only = classify::is_read_only(sql);
        let started = Instant::now();
        let outcome = if read_only { self.run_read(sql).await } else { self.run_write(sql).await };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let result = match outcome {
            Ok(mut r) => {
                r.execution_time_ms = elapsed_ms;
                r
            }
            Err(e) => {
                tracing::debug!(user = %user_id, error = %e, "statement failed");
                QueryExecutionResult::failed(read_only, elapsed_ms, db_message(&e))
            }
        };
        if result.success && !read_only {
            if let Err(e) = self.sync_registry(sql, user_id).await {
                tracing::warn!(error = %e, "registry sync after raw SQL failed");
            }
        }
        self.record_history(user_id, sql, &result).await;
        Ok(result)
    }

    async fn run_read(&self, sql: &str) -> Result<QueryExecutionResult, sqlx::Error> {
        let mut conn = self.state.pool.acquire().await?;
        tracing::debug!(sql = %sql, "raw query");
        let rows = sqlx::raw_sql(sql).fetch_all(&mut *conn).await?;
        Ok(QueryExecutionResult {
            success: true,
            read_only: true,
            row_count: rows.len() as i64,
            columns: rows.first().map(column_names).unwrap_or_default(),
            rows: rows.iter().map(raw_row_to_json).collect(),
            ..Default::default()
        })
    }

    async fn run_write(&self, sql: &str) -> Result<QueryExecutionResult, sqlx::Error> {
        let mut conn = self.state.pool.acquire().await?;
        tracing::debug!(sql = %sql, "raw statement");
        let (rows_affected, returned) = if classify::has_returning(sql) {
            let rows = sqlx::raw_sql(sql).fetch_all(&mut *conn).await?;
            (rows.len() as u64, Some(rows))
        } else {
            let done = sqlx::raw_sql(sql).execute(&mut *conn).await?;
            (done.rows_affected(), None)
        };

        let statement = classify::classify(sql);
        let tag = classify::command_tag(&statement, sql, rows_affected);
        let summary = classify::summarize(&statement, rows_affected);
        let mut result = QueryExecutionResult {
            success: true,
            read_only: false,
            row_count: rows_affected as i64,
            message: Some(tag.clone()),
            ..Default::default()
        };
        match (returned, &summary) {
            (Some(rows), _) => {
                result.columns = rows.first().map(column_names).unwrap_or_default();
                result.rows = rows.iter().map(raw_row_to_json).collect();
            }
            (None, Some(s)) => {
                result.columns = OperationSummary::COLUMNS.iter().map(|c| c.to_string()).collect();
                result.rows = s.as_rows();
            }
            (None, None) => {
                result.columns = vec!["status".into()];
                result.rows = vec![serde_json::json!({ "status": tag })];
            }
        }
        result.summary = summary;
        Ok(result)
    }

    /// Mirror raw CREATE/DROP/ALTER TABLE into the registry. Tables outside the data schema are ignored.
    async fn sync_registry(&self, sql: &str, user_id: &str) -> Result<(), AppError> {
        let schema = self.state.data_schema();
        let registry = &self.state.registry;
        match classify::classify(sql) {
            Statement::CreateTable(t) if t.in_schema(schema) => {
                let mut conn = self.state.pool.acquire().await?;
                self.register_created(&mut conn, &t, user_id).await
            }
            Statement::DropTable(tables) => {
                let mut conn = self.state.pool.acquire().await?;
                for t in tables.iter().filter(|t| t.in_schema(schema)) {
                    if !catalog::table_exists(&mut conn, schema, &t.name).await? && registry.delete_table(&mut conn, &t.name).await? {
                        tracing::info!(table = %t.name, "table deregistered after raw DROP");
                    }
                }
                Ok(())
            }
            Statement::AlterTable { table, rename_to } if table.in_schema(schema) => {
                let mut tx = self.state.pool.begin().await?;
                if !registry.is_registered(&mut tx, &table.name).await? {
                    return Ok(());
                }
                let current = match rename_to {
                    Some(new_name) => {
                        registry.rename_table(&mut tx, &table.name, &new_name).await?;
                        tracing::info!(table = %table.name, new_name = %new_name, "registry renamed after raw ALTER");
                        new_name
                    }
                    None => table.name.clone(),
                };
                if let Some(actual) = catalog::introspect_schema(&mut tx, schema, &current).await? {
                    registry.update_schema(&mut tx, &current, &actual).await?;
                }
                tx.commit().await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn register_created(&self, conn: &mut PgConnection, table: &ObjectName, user_id: &str) -> Result<(), AppError> {
        let schema = self.state.data_schema();
        let registry = &self.state.registry;
        if validate_table_name(&table.name).is_err() || registry.is_registered(conn, &table.name).await? {
            return Ok(());
        }
        let Some(table_schema) = catalog::introspect_schema(conn, schema, &table.name).await? else {
            return Ok(());
        };
        registry
            .insert_table(
                conn,
                &NewTableRecord {
                    name: &table.name,
                    schema: &table_schema,
                    is_public: false,
                    owner_id: user_id,
                    description: None,
                    metadata: &serde_json::Map::new(),
                },
            )
            .await?;
        tracing::info!(table = %table.name, owner = %user_id, "table registered after raw CREATE");
        Ok(())
    }

    async fn record_history(&self, user_id: &str, sql: &str, result: &QueryExecutionResult) {
        let outcome = match self.state.pool.acquire().await {
            Ok(mut conn) => {
                self.state
                    .registry
                    .append_history(
                        &mut conn,
                        user_id,
                        sql,
                        result.read_only,
                        result.execution_time_ms,
                        result.row_count,
                        result.error.as_deref(),
                    )
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = outcome {
            tracing::warn!(user = %user_id, error = %e, "query history write failed");
        }
    }

    /// Split `script` and run each statement in order. A denied statement aborts the run.
    pub async fn execute_script(
        &self,
        script: &str,
        user_id: &str,
        options: ScriptOptions,
    ) -> Result<Vec<QueryExecutionResult>, AppError> {
        let mut results = Vec::new();
        for statement in split_statements(script) {
            let result = self.execute_query(&statement, user_id).await?;
            let failed = !result.success;
            results.push(result);
            if failed && options.stop_on_error {
                break;
            }
        }
        Ok(results)
    }

    /// Newest first. `limit` defaults to the configured history limit and is clamped to 1..=500.
    pub async fn history(&self, user_id: &str, limit: Option<u32>) -> Result<Vec<QueryHistoryEntry>, AppError> {
        let limit = limit.unwrap_or(self.state.settings.history_limit).clamp(1, MAX_HISTORY_LIMIT);
        let mut conn = self.state.pool.acquire().await?;
        self.state.registry.fetch_history(&mut conn, user_id, limit).await
    }

    pub async fn clear_history(&self, user_id: &str) -> Result<u64, AppError> {
        let mut conn = self.state.pool.acquire().await?;
        self.state.registry.clear_history(&mut conn, user_id).await
    }

    pub async fn save_snippet(&self, user_id: &str, snippet: NewSnippet) -> Result<SqlSnippet, AppError> {
        if snippet.name.trim().is_empty() {
            return Err(AppError::Validation("snippet name is required".into()));
        }
        if snippet.sql.trim().is_empty() {
            return Err(AppError::Validation("snippet sql is required".into()));
        }
        let mut conn = self.state.pool.acquire().await?;
        self.state.registry.insert_snippet(&mut conn, user_id, &snippet).await
    }

    /// The caller's snippets plus every shared one.
    pub async fn list_snippets(&self, user_id: &str) -> Result<Vec<SqlSnippet>, AppError> {
        let mut conn = self.state.pool.acquire().await?;
        self.state.registry.list_snippets(&mut conn, user_id).await
    }

    pub async fn delete_snippet(&self, user_id: &str, id: uuid::Uuid) -> Result<(), AppError> {
        let mut conn = self.state.pool.acquire().await?;
        if !self.state.registry.delete_snippet(&mut conn, user_id, id).await? {
            return Err(AppError::NotFound("snippet not found or access denied".into()));
        }
        Ok(())
    }
}
