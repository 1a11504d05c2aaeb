//! Table lifecycle and ad-hoc SQL services.

pub mod classify;
mod rows;
pub mod script;
mod sql;
mod tables;

pub use sql::{ScriptOptions, SqlService};
pub use tables::TableService;

use crate::sql::{row_to_json, QueryBuf};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgQueryResult};
use sqlx::query::Query;
use sqlx::{PgConnection, Postgres};

/// Run one generated DDL statement.
pub(crate) async fn exec(conn: &mut PgConnection, sql: &str) -> Result<PgQueryResult, sqlx::Error> {
    tracing::debug!(sql = %sql, "query");
    sqlx::query(sql).execute(&mut *conn).await
}

fn bind_all(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    query
}

pub(crate) async fn execute_buf(conn: &mut PgConnection, q: &QueryBuf) -> Result<PgQueryResult, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    bind_all(q).execute(&mut *conn).await
}

pub(crate) async fn fetch_all_buf(conn: &mut PgConnection, q: &QueryBuf) -> Result<Vec<Value>, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let rows = bind_all(q).fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

pub(crate) async fn fetch_optional_buf(conn: &mut PgConnection, q: &QueryBuf) -> Result<Option<Value>, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let row = bind_all(q).fetch_optional(&mut *conn).await?;
    Ok(row.map(|r| row_to_json(&r)))
}

pub(crate) async fn count_buf(conn: &mut PgConnection, q: &QueryBuf) -> Result<i64, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query_as::<_, (i64,)>(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    Ok(query.fetch_one(&mut *conn).await?.0)
}
