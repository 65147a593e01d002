//! Load engine config from the process environment (after `.env`, if any).

use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::time::Duration;

impl EngineConfig {
    /// Read `DATABASE_URL` and the `ARCHITECT_CRUD_*` variables. Loads `.env` first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = EngineConfig::default();
        let non_empty = |key: &str| lookup(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let max_connections = match non_empty("ARCHITECT_CRUD_MAX_CONNECTIONS") {
            Some(v) => parse_number("ARCHITECT_CRUD_MAX_CONNECTIONS", &v)?,
            None => defaults.max_connections,
        };
        let statement_timeout = match non_empty("ARCHITECT_CRUD_STATEMENT_TIMEOUT_MS") {
            Some(v) => Some(Duration::from_millis(parse_number(
                "ARCHITECT_CRUD_STATEMENT_TIMEOUT_MS",
                &v,
            )?)),
            None => None,
        };
        let max_body_bytes = match non_empty("ARCHITECT_CRUD_MAX_BODY_BYTES") {
            Some(v) => parse_number("ARCHITECT_CRUD_MAX_BODY_BYTES", &v)?,
            None => defaults.max_body_bytes,
        };

        let config = EngineConfig {
            database_url: non_empty("DATABASE_URL"),
            schema: non_empty("ARCHITECT_CRUD_SCHEMA").unwrap_or(defaults.schema),
            audit_column: non_empty("ARCHITECT_CRUD_AUDIT_COLUMN").unwrap_or(defaults.audit_column),
            max_connections,
            statement_timeout,
            bind_addr: non_empty("ARCHITECT_CRUD_BIND").unwrap_or(defaults.bind_addr),
            max_body_bytes,
        };
        validate(&config)?;
        Ok(config)
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}
