//! Mutation input checks against resolved metadata.

use crate::catalog::{EntityMetadata, StorageUnit};
use crate::error::AppError;
use crate::sql::PgBindValue;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Field values keyed by column name.
pub type FieldMap = HashMap<String, Value>;
/// Binary field values keyed by column name.
pub type FileMap = HashMap<String, Vec<u8>>;

/// Bind values by column, ordered by name.
pub(crate) type Fields = BTreeMap<String, PgBindValue>;

/// Merge `data` and `files` into bind values. Every key must be a column of the entity;
/// a binary field replaces a data field of the same name.
pub(crate) fn collect_fields(meta: &EntityMetadata, data: &FieldMap, files: &FileMap) -> Result<Fields, AppError> {
    if data.is_empty() && files.is_empty() {
        return Err(AppError::Validation(format!("no fields provided for '{}'", meta.name)));
    }
    let mut unknown: Vec<&str> = data
        .keys()
        .chain(files.keys())
        .map(String::as_str)
        .filter(|k| !meta.has_column(k))
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        unknown.dedup();
        return Err(AppError::Validation(format!(
            "unknown column(s) on '{}': {}",
            meta.name,
            unknown.join(", ")
        )));
    }
    let mut fields: Fields = data
        .iter()
        .map(|(k, v)| (k.clone(), PgBindValue::from_json(v)))
        .collect();
    for (k, bytes) in files {
        fields.insert(k.clone(), PgBindValue::Bytes(bytes.clone()));
    }
    Ok(fields)
}

/// NOT NULL columns without a default must be present before `unit` is inserted.
/// The audit column is stamped by the statement and never required.
pub(crate) fn check_required(unit: &StorageUnit, fields: &Fields, audit_column: &str) -> Result<(), AppError> {
    let missing: Vec<&str> = unit
        .columns
        .iter()
        .filter(|c| c.is_required() && c.name != audit_column && !fields.contains_key(&c.name))
        .map(|c| c.name.as_str())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(AppError::Validation(format!(
        "missing required field(s) for '{}': {}",
        unit.name,
        missing.join(", ")
    )))
}

/// Field slice in the shape the statement builder takes.
pub(crate) fn as_pairs(fields: &Fields) -> Vec<(&str, &PgBindValue)> {
    fields.iter().map(|(k, v)| (k.as_str(), v)).collect()
}
