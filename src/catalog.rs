//! Live catalog introspection: what actually exists in PostgreSQL, independent of the registry.

use crate::error::AppError;
use crate::model::{ColumnDefinition, IndexDefinition, TableSchema};
use crate::sql::{qualified_table, quoted};
use serde_json::Value;
use sqlx::PgConnection;

/// Column as reported by `pg_attribute`.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct CatalogColumn {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
    pub default_expr: Option<String>,
    pub primary_key: bool,
    pub unique: bool,
}

/// Index as reported by `pg_index`. `constraint_backed` indexes belong to a
/// PRIMARY KEY or UNIQUE constraint and are rendered through the constraint.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct CatalogIndex {
    pub name: String,
    pub unique: bool,
    pub primary: bool,
    pub constraint_backed: bool,
    pub definition: String,
    pub columns: Vec<String>,
}

/// Non-primary table constraint (unique, check, foreign key).
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct CatalogConstraint {
    pub name: String,
    pub definition: String,
}

pub async fn table_exists(conn: &mut PgConnection, schema: &str, table: &str) -> Result<bool, AppError> {
    let exists: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2)",
    )
    .bind(schema)
    .bind(table)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists.0)
}

/// Base tables in `schema`, ordered by name.
pub async fn list_tables(conn: &mut PgConnection, schema: &str) -> Result<Vec<String>, AppError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT table_name::text FROM information_schema.tables WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name",
    )
    .bind(schema)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn columns(conn: &mut PgConnection, schema: &str, table: &str) -> Result<Vec<CatalogColumn>, AppError> {
    let rows = sqlx::query_as::<_, CatalogColumn>(
        r#"
        SELECT a.attname::text AS name,
               format_type(a.atttypid, a.atttypmod) AS type_name,
               NOT a.attnotnull AS nullable,
               pg_get_expr(d.adbin, d.adrelid) AS default_expr,
               EXISTS (
                   SELECT 1 FROM pg_index i
                   WHERE i.indrelid = c.oid AND i.indisprimary AND a.attnum = ANY(i.indkey::int2[])
               ) AS primary_key,
               EXISTS (
                   SELECT 1 FROM pg_index i
                   WHERE i.indrelid = c.oid AND i.indisunique AND NOT i.indisprimary
                     AND i.indnatts = 1 AND i.indkey[0] = a.attnum
               ) AS "unique"
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE n.nspname = $1 AND c.relname = $2 AND a.attnum > 0 AND NOT a.attisdropped
        ORDER BY a.attnum
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn indexes(conn: &mut PgConnection, schema: &str, table: &str) -> Result<Vec<CatalogIndex>, AppError> {
    let rows = sqlx::query_as::<_, CatalogIndex>(
        r#"
        SELECT ic.relname::text AS name,
               i.indisunique AS "unique",
               i.indisprimary AS "primary",
               EXISTS (SELECT 1 FROM pg_constraint con WHERE con.conindid = i.indexrelid) AS constraint_backed,
               pg_get_indexdef(i.indexrelid) AS definition,
               ARRAY(
                   SELECT a.attname::text
                   FROM unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                   JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum
                   ORDER BY k.ord
               ) AS columns
        FROM pg_index i
        JOIN pg_class ic ON ic.oid = i.indexrelid
        JOIN pg_class c ON c.oid = i.indrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relname = $2
        ORDER BY ic.relname
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn constraints(conn: &mut PgConnection, schema: &str, table: &str) -> Result<Vec<CatalogConstraint>, AppError> {
    let rows = sqlx::query_as::<_, CatalogConstraint>(
        r#"
        SELECT con.conname::text AS name, pg_get_constraintdef(con.oid) AS definition
        FROM pg_constraint con
        JOIN pg_class c ON c.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relname = $2 AND con.contype IN ('u', 'c', 'f', 'x')
        ORDER BY con.conname
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Registry schema document rebuilt from the catalog. `None` if the table does not exist.
pub async fn introspect_schema(conn: &mut PgConnection, schema: &str, table: &str) -> Result<Option<TableSchema>, AppError> {
    let cols = columns(conn, schema, table).await?;
    if cols.is_empty() {
        return Ok(None);
    }
    let idx = indexes(conn, schema, table).await?;
    Ok(Some(schema_from_catalog(&cols, &idx)))
}

/// Only plain, non-constraint indexes become `IndexDefinition`s; single-column unique
/// constraints show up as `unique` on the column instead.
pub fn schema_from_catalog(cols: &[CatalogColumn], idx: &[CatalogIndex]) -> TableSchema {
    let columns = cols
        .iter()
        .map(|c| ColumnDefinition {
            name: c.name.clone(),
            type_: c.type_name.clone(),
            nullable: c.nullable,
            unique: c.unique,
            default: c.default_expr.clone().map(Value::String),
            primary_key: c.primary_key,
        })
        .collect();
    let indexes = idx
        .iter()
        .filter(|i| !i.primary && !i.constraint_backed && !i.columns.is_empty())
        .map(|i| IndexDefinition {
            name: Some(i.name.clone()),
            columns: i.columns.clone(),
            unique: i.unique,
        })
        .collect();
    TableSchema { columns, indexes }
}

/// Best-effort CREATE TABLE (plus CREATE INDEX lines) for an existing table.
pub fn render_create_statement(
    schema: &str,
    table: &str,
    cols: &[CatalogColumn],
    constraints: &[CatalogConstraint],
    idx: &[CatalogIndex],
) -> String {
    let mut parts: Vec<String> = cols
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quoted(&c.name), c.type_name);
            if !c.nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(d) = &c.default_expr {
                def.push_str(" DEFAULT ");
                def.push_str(d);
            }
            def
        })
        .collect();
    let pk: Vec<String> = cols.iter().filter(|c| c.primary_key).map(|c| quoted(&c.name)).collect();
    if !pk.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }
    for con in constraints {
        parts.push(format!("CONSTRAINT {} {}", quoted(&con.name), con.definition));
    }
    let mut out = format!(
        "CREATE TABLE {} (\n  {}\n);",
        qualified_table(schema, table),
        parts.join(",\n  ")
    );
    for i in idx.iter().filter(|i| !i.primary && !i.constraint_backed) {
        out.push('\n');
        out.push_str(&i.definition);
        out.push(';');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: &str, nullable: bool, default: Option<&str>, pk: bool, unique: bool) -> CatalogColumn {
        CatalogColumn {
            name: name.into(),
            type_name: ty.into(),
            nullable,
            default_expr: default.map(String::from),
            primary_key: pk,
            unique,
        }
    }

    fn sample() -> (Vec<CatalogColumn>, Vec<CatalogIndex>) {
        let cols = vec![
            col("id", "integer", false, Some("nextval('t_id_seq'::regclass)"), true, false),
            col("email", "character varying(200)", false, None, false, true),
            col("score", "numeric(10,2)", true, None, false, false),
        ];
        let idx = vec![
            CatalogIndex {
                name: "t_pkey".into(),
                unique: true,
                primary: true,
                constraint_backed: true,
                definition: "CREATE UNIQUE INDEX t_pkey ON public.t USING btree (id)".into(),
                columns: vec!["id".into()],
            },
            CatalogIndex {
                name: "t_email_key".into(),
                unique: true,
                primary: false,
                constraint_backed: true,
                definition: "CREATE UNIQUE INDEX t_email_key ON public.t USING btree (email)".into(),
                columns: vec!["email".into()],
            },
            CatalogIndex {
                name: "idx_t_score".into(),
                unique: false,
                primary: false,
                constraint_backed: false,
                definition: "CREATE INDEX idx_t_score ON public.t USING btree (score)".into(),
                columns: vec!["score".into()],
            },
        ];
        (cols, idx)
    }

    #[test]
    fn schema_keeps_plain_indexes_only() {
        let (cols, idx) = sample();
        let s = schema_from_catalog(&cols, &idx);
        assert_eq!(s.columns.len(), 3);
        assert!(s.columns[0].primary_key && !s.columns[0].nullable);
        assert!(s.columns[1].unique);
        assert_eq!(s.columns[0].default, Some(Value::String("nextval('t_id_seq'::regclass)".into())));
        assert_eq!(s.indexes.len(), 1);
        assert_eq!(s.indexes[0].name.as_deref(), Some("idx_t_score"));
    }

    #[test]
    fn create_statement_lists_constraints_then_indexes() {
        let (cols, idx) = sample();
        let cons = vec![CatalogConstraint { name: "t_email_key".into(), definition: "UNIQUE (email)".into() }];
        let sql = render_create_statement("public", "t", &cols, &cons, &idx);
        assert_eq!(
            sql,
            "CREATE TABLE \"public\".\"t\" (\n  \
             \"id\" integer NOT NULL DEFAULT nextval('t_id_seq'::regclass),\n  \
             \"email\" character varying(200) NOT NULL,\n  \
             \"score\" numeric(10,2),\n  \
             PRIMARY KEY (\"id\"),\n  \
             CONSTRAINT \"t_email_key\" UNIQUE (email)\n);\n\
             CREATE INDEX idx_t_score ON public.t USING btree (score);"
        );
    }
}
