//! Tableforge: dynamic tables with caller-declared schemas and ad-hoc SQL execution over PostgreSQL.

pub mod catalog;
pub mod coerce;
pub mod error;
pub mod model;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use error::AppError;
pub use model::{
    ColumnDefinition, ColumnUpdate, DataQuery, IndexDefinition, NewSnippet, QueryExecutionResult, ResyncReport,
    TableData, TableDefinition, TableMetadataUpdate, TableRecord,
};
pub use service::{ScriptOptions, SqlService, TableService};
pub use settings::{init_tracing, CoreSettings};
pub use state::CoreState;
pub use store::{ensure_database_exists, Registry};
