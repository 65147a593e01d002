//! Runtime settings for the CRUD engine and its server.

use std::time::Duration;

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_AUDIT_COLUMN: &str = "updated_at";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Connection string; only the server requires it.
    pub database_url: Option<String>,
    /// Schema that all introspection and statements are scoped to.
    pub schema: String,
    /// Last-modified column stamped by the store on insert and update when present.
    pub audit_column: String,
    pub max_connections: u32,
    /// Upper bound for every store round trip. `None` leaves it to the pool.
    pub statement_timeout: Option<Duration>,
    pub bind_addr: String,
    pub max_body_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_url: None,
            schema: DEFAULT_SCHEMA.into(),
            audit_column: DEFAULT_AUDIT_COLUMN.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            statement_timeout: None,
            bind_addr: DEFAULT_BIND_ADDR.into(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}
