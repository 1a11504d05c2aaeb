//! Table lifecycle: catalog DDL and the matching registry write always share one transaction.

use super::exec;
use crate::catalog;
use crate::coerce::TypeFamily;
use crate::error::AppError;
use crate::model::{
    validate_column_definition, validate_index_definition, validate_table_definition, validate_table_name, ColumnDefinition,
    ColumnUpdate, IndexDefinition, ResyncReport, TableDefinition, TableMetadataUpdate, TableRecord, TableSchema,
};
use crate::sql::{self as builder, validate_identifier, validate_type_name};
use crate::state::CoreState;
use crate::store::NewTableRecord;
use sqlx::PgConnection;
use std::collections::HashSet;

/// Owner recorded for tables found in the catalog but never created through this service.
pub const SYSTEM_OWNER: &str = "system";

#[derive(Clone)]
pub struct TableService {
    state: CoreState,
}

impl TableService {
    pub fn new(state: CoreState) -> Self {
        TableService { state }
    }

    pub fn state(&self) -> &CoreState {
        &self.state
    }

    pub(super) fn schema(&self) -> &str {
        self.state.data_schema()
    }

    /// Registered table or `NotFound`.
    pub(super) async fn load(&self, conn: &mut PgConnection, name: &str) -> Result<TableRecord, AppError> {
        self.state
            .registry
            .fetch_table(conn, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("table '{}' not found", name)))
    }

    async fn ensure_name_free(&self, conn: &mut PgConnection, name: &str) -> Result<(), AppError> {
        if catalog::table_exists(conn, self.schema(), name).await? || self.state.registry.is_registered(conn, name).await? {
            return Err(AppError::AlreadyExists(format!("table '{}' already exists", name)));
        }
        Ok(())
    }

    pub async fn create(&self, owner_id: &str, definition: TableDefinition) -> Result<TableRecord, AppError> {
        let mut def = definition;
        validate_table_definition(&def)?;
        for c in def.columns.iter_mut().filter(|c| c.primary_key) {
            c.nullable = false;
        }
        builder::apply_generated_defaults(&mut def.columns);
        for idx in def.indexes.iter_mut() {
            idx.name = Some(idx.resolved_name(&def.name));
        }
        def.indexes.retain(|i| !i.columns.is_empty());

        let schema = self.schema();
        let mut tx = self.state.pool.begin().await?;
        self.ensure_name_free(&mut tx, &def.name).await?;
        exec(&mut tx, &builder::create_table(schema, &def))
            .await
            .map_err(|e| AppError::conflict_on(&def.name, e))?;
        for idx in &def.indexes {
            if let Some(sql) = builder::create_index(schema, &def.name, idx) {
                exec(&mut tx, &sql).await?;
            }
        }
        let table_schema = TableSchema {
            columns: def.columns.clone(),
            indexes: def.indexes.clone(),
        };
        self.state
            .registry
            .insert_table(
                &mut tx,
                &NewTableRecord {
                    name: &def.name,
                    schema: &table_schema,
                    is_public: def.is_public,
                    owner_id,
                    description: def.description.as_deref(),
                    metadata: &def.metadata,
                },
            )
            .await?;
        let record = self.load(&mut tx, &def.name).await?;
        tx.commit().await?;
        tracing::info!(table = %def.name, owner = %owner_id, "table created");
        Ok(record)
    }

    /// Ordered by name; `owner_id` limits the list to one owner.
    pub async fn list(&self, owner_id: Option<&str>) -> Result<Vec<TableRecord>, AppError> {
        let mut conn = self.state.pool.acquire().await?;
        self.state.registry.list_tables(&mut conn, owner_id).await
    }

    pub async fn get(&self, name: &str) -> Result<TableRecord, AppError> {
        let mut conn = self.state.pool.acquire().await?;
        self.load(&mut conn, name).await
    }

    pub async fn delete(&self, name: &str, cascade: bool) -> Result<(), AppError> {
        let mut tx = self.state.pool.begin().await?;
        self.load(&mut tx, name).await?;
        exec(&mut tx, &builder::drop_table(self.schema(), name, cascade)).await?;
        self.state.registry.delete_table(&mut tx, name).await?;
        tx.commit().await?;
        tracing::info!(table = %name, cascade, "table dropped");
        Ok(())
    }

    pub async fn update_metadata(&self, name: &str, update: TableMetadataUpdate) -> Result<TableRecord, AppError> {
        let new_name = update.new_name.as_deref().filter(|n| *n != name);
        if let Some(n) = new_name {
            validate_table_name(n)?;
        }
        let mut tx = self.state.pool.begin().await?;
        self.load(&mut tx, name).await?;
        let current = match new_name {
            Some(n) => {
                self.ensure_name_free(&mut tx, n).await?;
                exec(&mut tx, &builder::rename_table(self.schema(), name, n))
                    .await
                    .map_err(|e| AppError::conflict_on(n, e))?;
                self.state.registry.rename_table(&mut tx, name, n).await?;
                n
            }
            None => name,
        };
        self.state
            .registry
            .update_fields(
                &mut tx,
                current,
                update.description.as_deref(),
                update.is_public,
                update.metadata.as_ref(),
            )
            .await?;
        let record = self.load(&mut tx, current).await?;
        tx.commit().await?;
        if current != name {
            tracing::info!(table = %name, new_name = %current, "table renamed");
        }
        Ok(record)
    }

    pub async fn add_column(&self, name: &str, column: ColumnDefinition) -> Result<TableRecord, AppError> {
        validate_column_definition(&column)?;
        let mut column = column;
        if column.primary_key {
            column.nullable = false;
        }
        builder::apply_generated_defaults(std::slice::from_mut(&mut column));

        let schema = self.schema();
        let mut tx = self.state.pool.begin().await?;
        let record = self.load(&mut tx, name).await?;
        if record.column(&column.name).is_some() {
            return Err(AppError::Column(format!(
                "column '{}' already exists on table '{}'",
                column.name, name
            )));
        }
        let has_primary_key = !record.schema.primary_key_columns().is_empty();
        exec(&mut tx, &builder::add_column(schema, name, &column)).await?;
        if column.primary_key {
            if has_primary_key {
                tracing::warn!(table = %name, column = %column.name, "table already has a primary key; column added without it");
                column.primary_key = false;
            } else {
                exec(&mut tx, &builder::add_primary_key(schema, name, &[column.name.as_str()])).await?;
            }
        }
        let mut table_schema = record.schema;
        table_schema.columns.push(column);
        self.state.registry.update_schema(&mut tx, name, &table_schema).await?;
        let record = self.load(&mut tx, name).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Applies rename, type, nullability, then default, each as its own ALTER.
    pub async fn update_column(&self, name: &str, column: &str, update: ColumnUpdate) -> Result<TableRecord, AppError> {
        if update.is_empty() {
            return Err(AppError::Validation(format!("no changes given for column '{}'", column)));
        }
        if let Some(n) = &update.new_name {
            validate_identifier(n).map_err(|_| AppError::Validation(format!("invalid column name '{}'", n)))?;
        }
        if let Some(t) = &update.type_ {
            validate_type_name(t)?;
        }

        let schema = self.schema();
        let mut tx = self.state.pool.begin().await?;
        let record = self.load(&mut tx, name).await?;
        let existing = record.column(column).ok_or_else(|| AppError::unknown_column(name, column))?;
        if existing.primary_key && update.nullable == Some(true) {
            return Err(AppError::Column(format!(
                "primary key column '{}' cannot be made nullable",
                column
            )));
        }
        let renamed = update.new_name.as_deref().filter(|n| *n != column);
        if let Some(n) = renamed {
            if record.column(n).is_some() {
                return Err(AppError::Column(format!("column '{}' already exists on table '{}'", n, name)));
            }
        }

        let mut table_schema = record.schema.clone();
        let current = renamed.unwrap_or(column);
        if let Some(n) = renamed {
            exec(&mut tx, &builder::rename_column(schema, name, column, n)).await?;
            for idx in table_schema.indexes.iter_mut() {
                for c in idx.columns.iter_mut().filter(|c| c.as_str() == column) {
                    *c = n.to_string();
                }
            }
        }
        if let Some(t) = &update.type_ {
            exec(&mut tx, &builder::alter_column_type(schema, name, current, t)).await?;
        }
        if let Some(nullable) = update.nullable {
            exec(&mut tx, &builder::alter_column_nullable(schema, name, current, nullable)).await?;
        }
        if let Some(d) = &update.default {
            exec(&mut tx, &builder::alter_column_default(schema, name, current, Some(d))).await?;
        } else if update.drop_default {
            exec(&mut tx, &builder::alter_column_default(schema, name, current, None)).await?;
        }

        if let Some(c) = table_schema.column_mut(column) {
            if let Some(n) = renamed {
                c.name = n.to_string();
            }
            if let Some(t) = &update.type_ {
                c.type_ = t.trim().to_string();
            }
            if let Some(nullable) = update.nullable {
                c.nullable = nullable;
            }
            if let Some(d) = &update.default {
                c.default = Some(d.clone());
            } else if update.drop_default {
                c.default = None;
            }
        }
        self.state.registry.update_schema(&mut tx, name, &table_schema).await?;
        let record = self.load(&mut tx, name).await?;
        tx.commit().await?;
        Ok(record)
    }

    pub async fn delete_column(&self, name: &str, column: &str) -> Result<TableRecord, AppError> {
        let mut tx = self.state.pool.begin().await?;
        let record = self.load(&mut tx, name).await?;
        let existing = record.column(column).ok_or_else(|| AppError::unknown_column(name, column))?;
        if existing.primary_key {
            return Err(AppError::Column(format!(
                "cannot drop primary key column '{}' from table '{}'",
                column, name
            )));
        }
        exec(&mut tx, &builder::drop_column(self.schema(), name, column)).await?;
        let mut table_schema = record.schema;
        table_schema.columns.retain(|c| c.name != column);
        // the engine drops indexes that cover the column
        table_schema.indexes.retain(|i| !i.columns.iter().any(|c| c == column));
        self.state.registry.update_schema(&mut tx, name, &table_schema).await?;
        let record = self.load(&mut tx, name).await?;
        tx.commit().await?;
        Ok(record)
    }

    pub async fn add_index(&self, name: &str, index: IndexDefinition) -> Result<TableRecord, AppError> {
        if index.columns.is_empty() {
            return Err(AppError::Validation("index must list at least one column".into()));
        }
        let mut tx = self.state.pool.begin().await?;
        let record = self.load(&mut tx, name).await?;
        let declared: HashSet<&str> = record.columns().iter().map(|c| c.name.as_str()).collect();
        validate_index_definition(&index, &declared)?;
        let mut index = index;
        let index_name = index.resolved_name(name);
        if record.schema.indexes.iter().any(|i| i.resolved_name(name) == index_name) {
            return Err(AppError::AlreadyExists(format!("index '{}' already exists", index_name)));
        }
        index.name = Some(index_name);
        if let Some(sql) = builder::create_index(self.schema(), name, &index) {
            exec(&mut tx, &sql).await?;
        }
        let mut table_schema = record.schema;
        table_schema.indexes.push(index);
        self.state.registry.update_schema(&mut tx, name, &table_schema).await?;
        let record = self.load(&mut tx, name).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// CREATE TABLE text rebuilt from the live catalog; works for unregistered tables too.
    pub async fn get_create_statement(&self, name: &str) -> Result<String, AppError> {
        let schema = self.schema();
        let mut conn = self.state.pool.acquire().await?;
        if !catalog::table_exists(&mut conn, schema, name).await? {
            return Err(AppError::NotFound(format!("table '{}' not found", name)));
        }
        let cols = catalog::columns(&mut conn, schema, name).await?;
        let constraints = catalog::constraints(&mut conn, schema, name).await?;
        let idx = catalog::indexes(&mut conn, schema, name).await?;
        Ok(catalog::render_create_statement(schema, name, &cols, &constraints, &idx))
    }

    /// Reconcile the registry with the catalog: register strays, drop ghosts, repair drift.
    pub async fn resync_registry(&self) -> Result<ResyncReport, AppError> {
        let schema = self.schema();
        let registry = &self.state.registry;
        let mut report = ResyncReport::default();
        let mut tx = self.state.pool.begin().await?;

        let live: HashSet<String> = catalog::list_tables(&mut tx, schema)
            .await?
            .into_iter()
            .filter(|t| !t.starts_with("_sys_"))
            .collect();
        let registered: HashSet<String> = registry.registered_names(&mut tx).await?.into_iter().collect();

        let mut missing: Vec<&String> = live.difference(&registered).collect();
        missing.sort();
        for name in missing {
            if validate_table_name(name).is_err() {
                tracing::debug!(table = %name, "skipping table with unsupported name");
                continue;
            }
            let Some(table_schema) = catalog::introspect_schema(&mut tx, schema, name).await? else {
                continue;
            };
            registry
                .insert_table(
                    &mut tx,
                    &NewTableRecord {
                        name,
                        schema: &table_schema,
                        is_public: false,
                        owner_id: SYSTEM_OWNER,
                        description: None,
                        metadata: &serde_json::Map::new(),
                    },
                )
                .await?;
            report.registered.push(name.clone());
        }

        let mut gone: Vec<&String> = registered.difference(&live).collect();
        gone.sort();
        for name in gone {
            registry.delete_table(&mut tx, name).await?;
            report.deregistered.push(name.clone());
        }

        let mut both: Vec<&String> = registered.intersection(&live).collect();
        both.sort();
        for name in both {
            let (Some(stored), Some(actual)) = (
                registry.fetch_table(&mut tx, name).await?,
                catalog::introspect_schema(&mut tx, schema, name).await?,
            ) else {
                continue;
            };
            if has_drifted(&stored.schema, &actual) {
                registry.update_schema(&mut tx, name, &actual).await?;
                report.refreshed.push(name.clone());
            }
        }

        tx.commit().await?;
        tracing::info!(
            registered = report.registered.len(),
            deregistered = report.deregistered.len(),
            refreshed = report.refreshed.len(),
            "registry resynced"
        );
        Ok(report)
    }
}

/// Column set, order, type family, nullability or primary key differ. Spelling differences
/// such as `int` vs `integer` are not drift.
pub(crate) fn has_drifted(stored: &TableSchema, actual: &TableSchema) -> bool {
    if stored.columns.len() != actual.columns.len() {
        return true;
    }
    stored.columns.iter().zip(actual.columns.iter()).any(|(s, a)| {
        s.name != a.name
            || s.nullable != a.nullable
            || s.primary_key != a.primary_key
            || TypeFamily::parse(&s.type_) != TypeFamily::parse(&a.type_)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(cols: Vec<ColumnDefinition>) -> TableSchema {
        TableSchema { columns: cols, indexes: vec![] }
    }

    #[test]
    fn type_spelling_is_not_drift() {
        let stored = schema(vec![
            ColumnDefinition::new("id", "int").primary_key(),
            ColumnDefinition::new("at", "timestamptz"),
        ]);
        let actual = schema(vec![
            ColumnDefinition::new("id", "integer").primary_key(),
            ColumnDefinition::new("at", "timestamp with time zone"),
        ]);
        assert!(!has_drifted(&stored, &actual));
    }

    #[test]
    fn added_or_retyped_columns_are_drift() {
        let stored = schema(vec![ColumnDefinition::new("id", "integer").primary_key()]);
        let added = schema(vec![
            ColumnDefinition::new("id", "integer").primary_key(),
            ColumnDefinition::new("note", "text"),
        ]);
        assert!(has_drifted(&stored, &added));
        let retyped = schema(vec![ColumnDefinition::new("id", "bigint").primary_key()]);
        assert!(has_drifted(&stored, &retyped));
    }
}
