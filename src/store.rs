//! _sys_* table DDL and registry persistence. All _sys_* tables live in the registry schema
//! (`TABLEFORGE_SCHEMA`, default `tableforge`), apart from the caller tables they describe.

use crate::error::AppError;
use crate::model::{NewSnippet, QueryHistoryEntry, SqlSnippet, TableRecord, TableSchema};
use crate::sql::{qualified_table, quoted};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{ConnectOptions, PgConnection, PgPool};
use std::str::FromStr;

const TABLES: &str = "_sys_tables";
const HISTORY: &str = "_sys_query_history";
const SNIPPETS: &str = "_sys_sql_snippets";

/// Advisory lock key serializing sys-table bootstrap across processes.
const BOOTSTRAP_LOCK_KEY: i64 = 0x7461_626c_6566_6f72;

/// Registry, history and snippet tables in one schema.
#[derive(Clone, Debug)]
pub struct Registry {
    schema: String,
}

#[derive(sqlx::FromRow)]
struct TableRow {
    name: String,
    schema_doc: Value,
    is_public: bool,
    owner_id: String,
    description: Option<String>,
    metadata: Value,
    row_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TableRow> for TableRecord {
    type Error = AppError;

    fn try_from(row: TableRow) -> Result<Self, Self::Error> {
        let schema: TableSchema =
            serde_json::from_value(row.schema_doc).map_err(|e| AppError::Db(sqlx::Error::Decode(Box::new(e))))?;
        let metadata = match row.metadata {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        Ok(TableRecord {
            name: row.name,
            schema,
            is_public: row.is_public,
            owner_id: row.owner_id,
            description: row.description,
            metadata,
            row_count: row.row_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fields written when a table enters the registry.
pub struct NewTableRecord<'a> {
    pub name: &'a str,
    pub schema: &'a TableSchema,
    pub is_public: bool,
    pub owner_id: &'a str,
    pub description: Option<&'a str>,
    pub metadata: &'a Map<String, Value>,
}

fn schema_json(schema: &TableSchema) -> Result<Value, AppError> {
    serde_json::to_value(schema).map_err(|e| AppError::Validation(format!("schema document: {}", e)))
}

impl Registry {
    pub fn new(schema: impl Into<String>) -> Self {
        Registry { schema: schema.into() }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Schema-qualified sys table name (e.g. `"tableforge"."_sys_tables"`).
    pub fn qualified_sys_table(&self, table: &str) -> String {
        qualified_table(&self.schema, table)
    }

    /// Create the registry schema and _sys_* tables if missing. Safe to call from
    /// several processes at once.
    pub async fn ensure_sys_tables(&self, pool: &PgPool) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(BOOTSTRAP_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(&self.schema)))
            .execute(&mut *tx)
            .await?;

        let q_tables = self.qualified_sys_table(TABLES);
        let tables_ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                name TEXT PRIMARY KEY,
                schema_doc JSONB NOT NULL,
                is_public BOOLEAN NOT NULL DEFAULT FALSE,
                owner_id TEXT NOT NULL,
                description TEXT,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                row_count BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            q_tables
        );
        sqlx::query(&tables_ddl).execute(&mut *tx).await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS _sys_tables_owner_idx ON {} (owner_id)",
            q_tables
        ))
        .execute(&mut *tx)
        .await?;

        let q_history = self.qualified_sys_table(HISTORY);
        let history_ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                query TEXT NOT NULL,
                read_only BOOLEAN NOT NULL,
                execution_time_ms DOUBLE PRECISION NOT NULL,
                row_count BIGINT NOT NULL DEFAULT 0,
                error TEXT,
                executed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                user_id TEXT NOT NULL
            )
            "#,
            q_history
        );
        sqlx::query(&history_ddl).execute(&mut *tx).await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS _sys_query_history_user_idx ON {} (user_id, executed_at DESC)",
            q_history
        ))
        .execute(&mut *tx)
        .await?;

        let q_snippets = self.qualified_sys_table(SNIPPETS);
        let snippets_ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                name TEXT NOT NULL,
                sql TEXT NOT NULL,
                description TEXT,
                is_shared BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                created_by TEXT NOT NULL
            )
            "#,
            q_snippets
        );
        sqlx::query(&snippets_ddl).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn is_registered(&self, conn: &mut PgConnection, name: &str) -> Result<bool, AppError> {
        let exists: (bool,) = sqlx::query_as(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE name = $1)",
            self.qualified_sys_table(TABLES)
        ))
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists.0)
    }

    pub async fn insert_table(&self, conn: &mut PgConnection, rec: &NewTableRecord<'_>) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO {} (name, schema_doc, is_public, owner_id, description, metadata) VALUES ($1, $2, $3, $4, $5, $6)",
            self.qualified_sys_table(TABLES)
        ))
        .bind(rec.name)
        .bind(schema_json(rec.schema)?)
        .bind(rec.is_public)
        .bind(rec.owner_id)
        .bind(rec.description)
        .bind(Value::Object(rec.metadata.clone()))
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::conflict_on(rec.name, e))?;
        Ok(())
    }

    pub async fn fetch_table(&self, conn: &mut PgConnection, name: &str) -> Result<Option<TableRecord>, AppError> {
        let row: Option<TableRow> = sqlx::query_as(&format!(
            "SELECT name, schema_doc, is_public, owner_id, description, metadata, row_count, created_at, updated_at FROM {} WHERE name = $1",
            self.qualified_sys_table(TABLES)
        ))
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
        row.map(TableRecord::try_from).transpose()
    }

    /// All registered tables ordered by name, optionally only those owned by `owner_id`.
    pub async fn list_tables(&self, conn: &mut PgConnection, owner_id: Option<&str>) -> Result<Vec<TableRecord>, AppError> {
        let rows: Vec<TableRow> = sqlx::query_as(&format!(
            "SELECT name, schema_doc, is_public, owner_id, description, metadata, row_count, created_at, updated_at FROM {} WHERE ($1::text IS NULL OR owner_id = $1) ORDER BY name",
            self.qualified_sys_table(TABLES)
        ))
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.into_iter().map(TableRecord::try_from).collect()
    }

    pub async fn registered_names(&self, conn: &mut PgConnection) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT name FROM {} ORDER BY name",
            self.qualified_sys_table(TABLES)
        ))
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Returns whether a row was removed.
    pub async fn delete_table(&self, conn: &mut PgConnection, name: &str) -> Result<bool, AppError> {
        let res = sqlx::query(&format!("DELETE FROM {} WHERE name = $1", self.qualified_sys_table(TABLES)))
            .bind(name)
            .execute(&mut *conn)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn update_schema(&self, conn: &mut PgConnection, name: &str, schema: &TableSchema) -> Result<(), AppError> {
        sqlx::query(&format!(
            "UPDATE {} SET schema_doc = $2, updated_at = NOW() WHERE name = $1",
            self.qualified_sys_table(TABLES)
        ))
        .bind(name)
        .bind(schema_json(schema)?)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn rename_table(&self, conn: &mut PgConnection, name: &str, new_name: &str) -> Result<(), AppError> {
        sqlx::query(&format!(
            "UPDATE {} SET name = $2, updated_at = NOW() WHERE name = $1",
            self.qualified_sys_table(TABLES)
        ))
        .bind(name)
        .bind(new_name)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::conflict_on(new_name, e))?;
        Ok(())
    }

    /// Set description, visibility and metadata; `None` leaves a field unchanged.
    pub async fn update_fields(
        &self,
        conn: &mut PgConnection,
        name: &str,
        description: Option<&str>,
        is_public: Option<bool>,
        metadata: Option<&Map<String, Value>>,
    ) -> Result<(), AppError> {
        sqlx::query(&format!(
            "UPDATE {} SET description = COALESCE($2, description), is_public = COALESCE($3, is_public), metadata = COALESCE($4, metadata), updated_at = NOW() WHERE name = $1",
            self.qualified_sys_table(TABLES)
        ))
        .bind(name)
        .bind(description)
        .bind(is_public)
        .bind(metadata.map(|m| Value::Object(m.clone())))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn set_row_count(&self, conn: &mut PgConnection, name: &str, count: i64) -> Result<(), AppError> {
        sqlx::query(&format!(
            "UPDATE {} SET row_count = $2 WHERE name = $1",
            self.qualified_sys_table(TABLES)
        ))
        .bind(name)
        .bind(count)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn append_history(
        &self,
        conn: &mut PgConnection,
        user_id: &str,
        query: &str,
        read_only: bool,
        execution_time_ms: f64,
        row_count: i64,
        error: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO {} (query, read_only, execution_time_ms, row_count, error, user_id) VALUES ($1, $2, $3, $4, $5, $6)",
            self.qualified_sys_table(HISTORY)
        ))
        .bind(query)
        .bind(read_only)
        .bind(execution_time_ms)
        .bind(row_count)
        .bind(error)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Newest first.
    pub async fn fetch_history(&self, conn: &mut PgConnection, user_id: &str, limit: u32) -> Result<Vec<QueryHistoryEntry>, AppError> {
        let rows = sqlx::query_as::<_, QueryHistoryEntry>(&format!(
            "SELECT id, query, read_only, execution_time_ms, row_count, error, executed_at, user_id FROM {} WHERE user_id = $1 ORDER BY executed_at DESC, id DESC LIMIT $2",
            self.qualified_sys_table(HISTORY)
        ))
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    pub async fn clear_history(&self, conn: &mut PgConnection, user_id: &str) -> Result<u64, AppError> {
        let res = sqlx::query(&format!("DELETE FROM {} WHERE user_id = $1", self.qualified_sys_table(HISTORY)))
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(res.rows_affected())
    }

    pub async fn insert_snippet(&self, conn: &mut PgConnection, user_id: &str, snippet: &NewSnippet) -> Result<SqlSnippet, AppError> {
        let row = sqlx::query_as::<_, SqlSnippet>(&format!(
            "INSERT INTO {} (name, sql, description, is_shared, created_by) VALUES ($1, $2, $3, $4, $5) RETURNING id, name, sql, description, is_shared, created_at, created_by",
            self.qualified_sys_table(SNIPPETS)
        ))
        .bind(&snippet.name)
        .bind(&snippet.sql)
        .bind(&snippet.description)
        .bind(snippet.is_shared)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Snippets owned by `user_id` plus everyone's shared ones, newest first.
    pub async fn list_snippets(&self, conn: &mut PgConnection, user_id: &str) -> Result<Vec<SqlSnippet>, AppError> {
        let rows = sqlx::query_as::<_, SqlSnippet>(&format!(
            "SELECT id, name, sql, description, is_shared, created_at, created_by FROM {} WHERE created_by = $1 OR is_shared ORDER BY created_at DESC",
            self.qualified_sys_table(SNIPPETS)
        ))
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    /// Only the owner may delete; returns whether a row was removed.
    pub async fn delete_snippet(&self, conn: &mut PgConnection, user_id: &str, id: uuid::Uuid) -> Result<bool, AppError> {
        let res = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1 AND created_by = $2",
            self.qualified_sys_table(SNIPPETS)
        ))
        .bind(id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::Settings(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: PgConnection = opts.connect().await.map_err(AppError::Db)?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await
        .map_err(AppError::Db)?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quoted(&db_name)))
            .execute(&mut conn)
            .await
            .map_err(AppError::Db)?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url.rfind('/').ok_or_else(|| AppError::Settings("DATABASE_URL: no path".into()))? + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres", base);
    Ok((admin_url, db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sys_tables_are_schema_qualified_and_quoted() {
        let r = Registry::new("tableforge");
        assert_eq!(r.qualified_sys_table("_sys_tables"), "\"tableforge\".\"_sys_tables\"");
    }

    #[test]
    fn database_name_is_split_from_url() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/app?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(db, "app");
    }

    #[test]
    fn malformed_schema_document_is_a_decode_error() {
        let row = TableRow {
            name: "t".into(),
            schema_doc: serde_json::json!({"columns": "nope"}),
            is_public: false,
            owner_id: "u".into(),
            description: None,
            metadata: serde_json::json!({}),
            row_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(TableRecord::try_from(row), Err(AppError::Db(sqlx::Error::Decode(_)))));
    }
}
