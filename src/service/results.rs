//! Operation results as returned to callers (camelCase on the wire).

use crate::catalog::EntityMetadata;
use crate::graph::{Ambiguity, Relationship};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Value>,
    pub columns: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleInsert {
    pub inserted_id: Value,
    pub affected_rows: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeInsert {
    /// Unit name to the primary-key value of the row written there.
    pub inserted_ids: BTreeMap<String, Value>,
    /// Units actually written, in insert order.
    pub affected_tables: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InsertResult {
    Single(SingleInsert),
    Composite(CompositeInsert),
}

/// A member unit left untouched because no WHERE key could be resolved for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedUnit {
    pub unit: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub pk_column: String,
    pub pk_value: Value,
    pub affected_rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_tables: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_units: Option<Vec<SkippedUnit>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub affected_rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_from_tables: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_units: Option<Vec<SkippedUnit>>,
}

/// Entity metadata plus the dependency structure mutations will use.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescription {
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    pub relationships: Vec<Relationship>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ambiguities: Vec<Ambiguity>,
    pub insert_order: Vec<String>,
    /// Insert order fell back to member order because of a dependency cycle.
    pub degraded: bool,
}
