//! Row CRUD on registered tables. Values are coerced by declared column type and bound
//! as parameters; only validated identifiers reach the SQL text.

use super::tables::TableService;
use super::{count_buf, execute_buf, fetch_all_buf, fetch_optional_buf};
use crate::coerce::coerce_value;
use crate::error::AppError;
use crate::model::{ColumnDefinition, ColumnDescriptor, DataQuery, Pagination, TableData, TableRecord};
use crate::sql::{self as builder, BindValue, Filter};
use serde_json::{Map, Value};
use sqlx::PgConnection;

fn payload<'a>(row: &'a Value, what: &str) -> Result<&'a Map<String, Value>, AppError> {
    let obj = row
        .as_object()
        .ok_or_else(|| AppError::Validation(format!("{} must be a JSON object", what)))?;
    if obj.is_empty() {
        return Err(AppError::Validation(format!("{} is empty", what)));
    }
    Ok(obj)
}

fn coerce_fields<'r>(record: &'r TableRecord, fields: &Map<String, Value>) -> Result<Vec<(&'r ColumnDefinition, BindValue)>, AppError> {
    fields
        .iter()
        .map(|(k, v)| {
            let column = record.column(k).ok_or_else(|| AppError::unknown_column(&record.name, k))?;
            Ok((column, coerce_value(column, v)?))
        })
        .collect()
}

/// Explicit id column, else the single primary key, else `id`.
fn resolve_id_column<'r>(record: &'r TableRecord, requested: Option<&str>) -> Result<&'r ColumnDefinition, AppError> {
    let name = match requested {
        Some(n) => n,
        None => match record.schema.primary_key_columns().as_slice() {
            [only] => *only,
            _ => "id",
        },
    };
    record.column(name).ok_or_else(|| AppError::unknown_column(&record.name, name))
}

fn as_filter<'a>(f: &Option<(&'a ColumnDefinition, BindValue)>) -> Option<Filter<'a>> {
    f.as_ref().map(|(column, value)| Filter {
        column: *column,
        value: value.clone(),
    })
}

fn coerce_id(column: &ColumnDefinition, row_id: &Value) -> Result<BindValue, AppError> {
    match coerce_value(column, row_id)? {
        BindValue::Null => Err(AppError::Validation(format!("a value for '{}' is required", column.name))),
        id => Ok(id),
    }
}

impl TableService {
    /// Refresh the stored row count; failures are logged, not returned.
    async fn refresh_row_count(&self, conn: &mut PgConnection, name: &str) -> Option<i64> {
        let q = builder::count_rows(self.schema(), name, None);
        let result = match count_buf(conn, &q).await {
            Ok(n) => self.state().registry.set_row_count(conn, name, n).await.map(|_| n),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(table = %name, error = %e, "row count refresh failed");
                None
            }
        }
    }

    /// Insert one row and return it as stored, database defaults included.
    pub async fn insert_row(&self, name: &str, row: &Value) -> Result<Value, AppError> {
        let fields = payload(row, "row")?;
        let mut conn = self.state().pool.acquire().await?;
        let record = self.load(&mut conn, name).await?;
        let values = coerce_fields(&record, fields)?;
        let q = builder::insert_row(self.schema(), name, record.columns(), values);
        let inserted = fetch_optional_buf(&mut conn, &q)
            .await?
            .ok_or_else(|| AppError::Db(sqlx::Error::RowNotFound))?;
        self.refresh_row_count(&mut conn, name).await;
        Ok(inserted)
    }

    pub async fn get_data(&self, name: &str, query: DataQuery) -> Result<TableData, AppError> {
        if query.page < 1 || query.page_size < 1 {
            return Err(AppError::Validation("page and page_size must be at least 1".into()));
        }
        let page_size = query.page_size.min(self.state().settings.max_page_size);
        let mut conn = self.state().pool.acquire().await?;
        let record = self.load(&mut conn, name).await?;

        let order_by = match &query.order_by {
            Some(col) => {
                record.column(col).ok_or_else(|| AppError::unknown_column(name, col))?;
                Some((col.as_str(), query.order_desc))
            }
            None => None,
        };
        let filter = match &query.filter_column {
            Some(col) => {
                let column = record.column(col).ok_or_else(|| AppError::unknown_column(name, col))?;
                let value = coerce_value(column, query.filter_value.as_ref().unwrap_or(&Value::Null))?;
                Some((column, value))
            }
            None => None,
        };

        let offset = u64::from(query.page - 1) * u64::from(page_size);
        let page_q = builder::select_page(self.schema(), name, record.columns(), as_filter(&filter), order_by, page_size, offset);
        let rows = fetch_all_buf(&mut conn, &page_q).await?;
        let count_q = builder::count_rows(self.schema(), name, as_filter(&filter));
        let total = count_buf(&mut conn, &count_q).await?;
        if filter.is_none() {
            if let Err(e) = self.state().registry.set_row_count(&mut conn, name, total).await {
                tracing::warn!(table = %name, error = %e, "row count refresh failed");
            }
        }

        Ok(TableData {
            table: name.to_string(),
            columns: record.columns().iter().map(ColumnDescriptor::from).collect(),
            rows,
            pagination: Pagination::new(query.page, page_size, total),
        })
    }

    /// Update the row whose `id_column` equals `row_id`; `NotFound` when nothing matches.
    pub async fn update_row(&self, name: &str, row_id: &Value, id_column: Option<&str>, updates: &Value) -> Result<Value, AppError> {
        let fields = payload(updates, "update")?;
        let mut conn = self.state().pool.acquire().await?;
        let record = self.load(&mut conn, name).await?;
        let id_col = resolve_id_column(&record, id_column)?;
        let id = coerce_id(id_col, row_id)?;
        let values = coerce_fields(&record, fields)?;
        let q = builder::update_row(self.schema(), name, record.columns(), id_col, id, values);
        fetch_optional_buf(&mut conn, &q)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("row {} not found in table '{}'", row_id, name)))
    }

    pub async fn delete_row(&self, name: &str, row_id: &Value, id_column: Option<&str>) -> Result<(), AppError> {
        let mut conn = self.state().pool.acquire().await?;
        let record = self.load(&mut conn, name).await?;
        let id_col = resolve_id_column(&record, id_column)?;
        let id = coerce_id(id_col, row_id)?;
        let q = builder::delete_row(self.schema(), name, id_col, id);
        let res = execute_buf(&mut conn, &q).await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("row {} not found in table '{}'", row_id, name)));
        }
        self.refresh_row_count(&mut conn, name).await;
        Ok(())
    }
}
