//! Entity metadata produced by introspection: storage units, column descriptors, ownership.

use serde::Serialize;
use std::collections::BTreeMap;

/// What the catalog reports a relation to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Table,
    View,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Single,
    Composite,
}

/// Where a piece of composite metadata came from. Heuristic results are best effort.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    FromCatalog,
    FromHeuristic,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub referenced_unit: String,
    pub referenced_column: String,
    pub referenced_is_primary: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    /// Semantic type as reported by the catalog (e.g. "integer", "character varying").
    pub data_type: String,
    /// Type used to cast bound placeholders (e.g. "int4", "\"shop\".\"status\"").
    #[serde(skip)]
    pub cast_type: Option<String>,
    pub nullable: bool,
    pub primary_key: bool,
    /// Identity, generated, or sequence-defaulted column; never written explicitly.
    pub auto_generated: bool,
    pub unique: bool,
    /// Non-auto default exists, so the column may be omitted on insert.
    pub has_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

impl ColumnDescriptor {
    /// Types sqlx cannot decode directly into JSON are read back as text.
    pub fn reads_as_text(&self) -> bool {
        let Some(cast) = self.cast_type.as_deref() else {
            return false;
        };
        !matches!(
            cast,
            "int2" | "int4" | "int8" | "float4" | "float8" | "bool" | "text" | "varchar"
                | "bpchar" | "name" | "uuid" | "timestamptz" | "timestamp" | "date"
                | "json" | "jsonb" | "bytea"
        )
    }

    /// Column must be supplied on insert: NOT NULL, no default, not generated.
    pub fn is_required(&self) -> bool {
        !self.nullable && !self.has_default && !self.auto_generated
    }
}

/// Primary-key precedence: flagged column, then a column named "id" (any case), then the first column.
pub fn resolve_primary_key(columns: &[ColumnDescriptor]) -> Option<String> {
    columns
        .iter()
        .find(|c| c.primary_key)
        .or_else(|| columns.iter().find(|c| c.name.eq_ignore_ascii_case("id")))
        .or_else(|| columns.first())
        .map(|c| c.name.clone())
}

/// A single addressable table.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUnit {
    #[serde(skip)]
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: String,
}

impl StorageUnit {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (&ColumnDescriptor, &ForeignKey)> {
        self.columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref().map(|fk| (c, fk)))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    #[serde(skip)]
    pub schema: String,
    pub name: String,
    pub kind: EntityKind,
    pub relation: RelationKind,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: String,
    /// Member unit names in discovery order. `[name]` for single-unit entities.
    pub member_units: Vec<String>,
    /// Column name to the member unit that supplies it. Computed columns are absent.
    pub column_ownership: BTreeMap<String, String>,
    pub member_provenance: Provenance,
    pub ownership_provenance: Provenance,
    /// Columns whose owner was picked among several candidate units.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ambiguous_columns: Vec<String>,
    /// Resolved member units; for single-unit entities, the entity itself.
    pub units: Vec<StorageUnit>,
    /// Cache epoch the metadata was computed in.
    pub epoch: u64,
}

impl EntityMetadata {
    pub fn is_composite(&self) -> bool {
        self.member_units.len() > 1
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn unit(&self, name: &str) -> Option<&StorageUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn owner_of(&self, column: &str) -> Option<&str> {
        self.column_ownership.get(column).map(String::as_str)
    }

    /// The entity viewed as its own storage unit (single-unit path).
    pub fn as_unit(&self) -> StorageUnit {
        self.unit(&self.name).cloned().unwrap_or_else(|| StorageUnit {
            schema: self.schema.clone(),
            name: self.name.clone(),
            columns: self.columns.clone(),
            primary_key: self.primary_key.clone(),
        })
    }
}

/// One row of `listEntities`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntitySummary {
    pub name: String,
    pub kind: RelationKind,
}
