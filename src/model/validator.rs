//! Definition validation: identifiers, types, duplicate columns, index references.
//! Runs before any DDL so a rejected definition never leaves a partial schema behind.

use crate::error::AppError;
use crate::model::{ColumnDefinition, IndexDefinition, TableDefinition};
use crate::sql::{validate_identifier, validate_type_name};
use std::collections::HashSet;

pub fn validate_table_definition(def: &TableDefinition) -> Result<(), AppError> {
    validate_table_name(&def.name)?;
    if def.columns.is_empty() {
        return Err(AppError::Validation(format!(
            "table '{}' must declare at least one column",
            def.name
        )));
    }
    let mut seen = HashSet::new();
    for c in &def.columns {
        validate_column_definition(c)?;
        if !seen.insert(c.name.as_str()) {
            return Err(AppError::Validation(format!(
                "duplicate column '{}' in table '{}'",
                c.name, def.name
            )));
        }
    }
    let mut index_names = HashSet::new();
    for idx in &def.indexes {
        validate_index_definition(idx, &seen)?;
        let resolved = idx.resolved_name(&def.name);
        if !idx.columns.is_empty() && !index_names.insert(resolved.clone()) {
            return Err(AppError::Validation(format!(
                "duplicate index name '{}' in table '{}'",
                resolved, def.name
            )));
        }
    }
    Ok(())
}

pub fn validate_table_name(name: &str) -> Result<(), AppError> {
    validate_identifier(name).map_err(|_| AppError::Validation(format!("invalid table name '{}'", name)))?;
    if name.to_ascii_lowercase().starts_with("pg_") {
        return Err(AppError::Validation(format!(
            "table name '{}' uses the reserved pg_ prefix",
            name
        )));
    }
    Ok(())
}

pub fn validate_column_definition(c: &ColumnDefinition) -> Result<(), AppError> {
    validate_identifier(&c.name).map_err(|_| AppError::Validation(format!("invalid column name '{}'", c.name)))?;
    validate_type_name(&c.type_).map_err(|_| {
        AppError::Validation(format!("invalid type '{}' for column '{}'", c.type_, c.name))
    })?;
    Ok(())
}

/// `columns` holds the declared column names of the target table.
pub fn validate_index_definition(idx: &IndexDefinition, columns: &HashSet<&str>) -> Result<(), AppError> {
    if let Some(name) = &idx.name {
        validate_identifier(name).map_err(|_| AppError::Validation(format!("invalid index name '{}'", name)))?;
    }
    for col in &idx.columns {
        if !columns.contains(col.as_str()) {
            return Err(AppError::Column(format!("index references unknown column '{}'", col)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, cols: Vec<ColumnDefinition>) -> TableDefinition {
        TableDefinition::new(name, cols)
    }

    #[test]
    fn accepts_a_plain_definition() {
        let d = def(
            "people",
            vec![
                ColumnDefinition::new("id", "uuid").primary_key(),
                ColumnDefinition::new("name", "varchar(120)").not_null(),
                ColumnDefinition::new("tags", "text[]"),
            ],
        );
        validate_table_definition(&d).unwrap();
    }

    #[test]
    fn rejects_bad_names() {
        for name in ["1abc", "a-b", "", "drop table x;", "pg_catalog_copy"] {
            let d = def(name, vec![ColumnDefinition::new("id", "int")]);
            assert!(matches!(validate_table_definition(&d), Err(AppError::Validation(_))), "{}", name);
        }
    }

    #[test]
    fn rejects_empty_and_duplicate_columns() {
        assert!(matches!(validate_table_definition(&def("t", vec![])), Err(AppError::Validation(_))));
        let d = def("t", vec![ColumnDefinition::new("a", "int"), ColumnDefinition::new("a", "text")]);
        assert!(matches!(validate_table_definition(&d), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_injected_type() {
        let d = def("t", vec![ColumnDefinition::new("a", "int); DROP TABLE x; --")]);
        assert!(matches!(validate_table_definition(&d), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_constraints_smuggled_into_type() {
        for ty in ["integer primary key", "text unique", "int references other", "text not null"] {
            let d = def("t", vec![ColumnDefinition::new("a", ty)]);
            assert!(matches!(validate_table_definition(&d), Err(AppError::Validation(_))), "{}", ty);
        }
        let d = def("t", vec![ColumnDefinition::new("a", "timestamp(3) with time zone")]);
        validate_table_definition(&d).unwrap();
    }

    #[test]
    fn derived_index_names_must_stay_distinct() {
        let long = "c".repeat(60);
        let mut d = def("t", vec![ColumnDefinition::new(&format!("{}1", long), "int"), ColumnDefinition::new(&format!("{}2", long), "int")]);
        d.indexes.push(IndexDefinition { name: None, columns: vec![format!("{}1", long)], unique: false });
        d.indexes.push(IndexDefinition { name: None, columns: vec![format!("{}2", long)], unique: false });
        assert!(matches!(validate_table_definition(&d), Err(AppError::Validation(_))));
    }

    #[test]
    fn index_must_reference_declared_columns() {
        let mut d = def("t", vec![ColumnDefinition::new("a", "int")]);
        d.indexes.push(IndexDefinition { name: None, columns: vec!["b".into()], unique: false });
        assert!(matches!(validate_table_definition(&d), Err(AppError::Column(_))));
    }
}
