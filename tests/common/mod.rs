//! Shared setup for database-backed tests. Tests return early when `DATABASE_URL` is unset.

#![allow(dead_code)]

use tableforge::{CoreSettings, CoreState};

pub async fn state() -> Option<CoreState> {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").ok()?;
    let state = CoreState::connect(&url, CoreSettings::default())
        .await
        .expect("connect to DATABASE_URL");
    Some(state)
}

/// Table or user name that will not collide with parallel runs.
pub fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}
