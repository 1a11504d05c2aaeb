//! Service context shared by `TableService` and `SqlService`.

use crate::error::AppError;
use crate::settings::CoreSettings;
use crate::store::Registry;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct CoreState {
    pub pool: PgPool,
    pub settings: Arc<CoreSettings>,
    pub registry: Registry,
}

impl CoreState {
    pub fn new(pool: PgPool, settings: CoreSettings) -> Self {
        let registry = Registry::new(settings.registry_schema.clone());
        CoreState {
            pool,
            settings: Arc::new(settings),
            registry,
        }
    }

    /// Connect, then create the registry schema and _sys_* tables if missing.
    pub async fn connect(database_url: &str, settings: CoreSettings) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
        let state = CoreState::new(pool, settings);
        state.registry.ensure_sys_tables(&state.pool).await?;
        Ok(state)
    }

    /// Schema holding caller tables.
    pub fn data_schema(&self) -> &str {
        &self.settings.data_schema
    }
}
