//! Runtime settings from environment and logging bootstrap.
//! Registry tables live in the schema named by `TABLEFORGE_SCHEMA` (default `tableforge`);
//! caller tables live in `TABLEFORGE_DATA_SCHEMA` (default `public`).

use crate::error::AppError;
use crate::sql::validate_identifier;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_REGISTRY_SCHEMA: &str = "tableforge";
pub const DEFAULT_DATA_SCHEMA: &str = "public";
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
/// Upper bound for history reads regardless of what the caller asks for.
pub const MAX_HISTORY_LIMIT: u32 = 500;

#[derive(Clone, Debug)]
pub struct CoreSettings {
    pub registry_schema: String,
    pub data_schema: String,
    pub max_page_size: u32,
    pub history_limit: u32,
}

impl Default for CoreSettings {
    fn default() -> Self {
        CoreSettings {
            registry_schema: DEFAULT_REGISTRY_SCHEMA.into(),
            data_schema: DEFAULT_DATA_SCHEMA.into(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl CoreSettings {
    /// Read settings from the process environment. Call `dotenvy::dotenv()` first in binaries.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup (environment, map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CoreSettings::default();
        let registry_schema = lookup("TABLEFORGE_SCHEMA").unwrap_or(defaults.registry_schema);
        let data_schema = lookup("TABLEFORGE_DATA_SCHEMA").unwrap_or(defaults.data_schema);
        for (key, value) in [("TABLEFORGE_SCHEMA", &registry_schema), ("TABLEFORGE_DATA_SCHEMA", &data_schema)] {
            validate_identifier(value).map_err(|_| {
                AppError::Settings(format!("{} must be a valid identifier, got '{}'", key, value))
            })?;
        }
        let max_page_size = parse_u32(&lookup, "TABLEFORGE_MAX_PAGE_SIZE", defaults.max_page_size)?;
        let history_limit = parse_u32(&lookup, "TABLEFORGE_HISTORY_LIMIT", defaults.history_limit)?
            .clamp(1, MAX_HISTORY_LIMIT);
        Ok(CoreSettings {
            registry_schema,
            data_schema,
            max_page_size: max_page_size.max(1),
            history_limit,
        })
    }
}

fn parse_u32<F>(lookup: &F, key: &str, default: u32) -> Result<u32, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Settings(format!("{} must be a positive integer, got '{}'", key, raw))),
    }
}

/// Install a fmt subscriber. `RUST_LOG` wins over `default_directive` (e.g. "tableforge=info").
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = CoreSettings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(s.registry_schema, "tableforge");
        assert_eq!(s.data_schema, "public");
        assert_eq!(s.max_page_size, 1000);
        assert_eq!(s.history_limit, 50);
    }

    #[test]
    fn overrides_are_read_and_clamped() {
        let s = CoreSettings::from_lookup(lookup_from(&[
            ("TABLEFORGE_SCHEMA", "meta"),
            ("TABLEFORGE_HISTORY_LIMIT", "9000"),
        ]))
        .unwrap();
        assert_eq!(s.registry_schema, "meta");
        assert_eq!(s.history_limit, MAX_HISTORY_LIMIT);
    }

    #[test]
    fn invalid_schema_name_is_rejected() {
        let err = CoreSettings::from_lookup(lookup_from(&[("TABLEFORGE_SCHEMA", "bad;name")])).unwrap_err();
        assert!(matches!(err, AppError::Settings(_)));
    }

    #[test]
    fn non_numeric_page_size_is_rejected() {
        let err = CoreSettings::from_lookup(lookup_from(&[("TABLEFORGE_MAX_PAGE_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, AppError::Settings(_)));
    }
}
