//! Config validation: identifiers that end up in statement text.

use crate::config::EngineConfig;
use crate::error::ConfigError;

/// True for a plain SQL identifier: letter or underscore, then letters, digits, underscores.
pub fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    if !is_plain_identifier(&config.schema) {
        return Err(ConfigError::Invalid {
            var: "ARCHITECT_CRUD_SCHEMA",
            reason: format!("'{}' is not a plain identifier", config.schema),
        });
    }
    if !is_plain_identifier(&config.audit_column) {
        return Err(ConfigError::Invalid {
            var: "ARCHITECT_CRUD_AUDIT_COLUMN",
            reason: format!("'{}' is not a plain identifier", config.audit_column),
        });
    }
    if config.max_connections == 0 {
        return Err(ConfigError::Invalid {
            var: "ARCHITECT_CRUD_MAX_CONNECTIONS",
            reason: "must be at least 1".into(),
        });
    }
    Ok(())
}
