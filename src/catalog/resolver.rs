//! Schema catalog: turns raw catalog lookups into `EntityMetadata`.

use crate::catalog::source::{CatalogSource, KeyKind, RawColumn};
use crate::catalog::types::*;
use crate::catalog::view_parse::referenced_relations;
use crate::error::AppError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Clone)]
pub struct SchemaCatalog {
    source: Arc<dyn CatalogSource>,
}

impl SchemaCatalog {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        SchemaCatalog { source }
    }

    pub fn schema(&self) -> &str {
        self.source.schema()
    }

    pub async fn list_entities(&self) -> Result<Vec<EntitySummary>, AppError> {
        let relations = self.source.list_relations().await?;
        Ok(relations
            .into_iter()
            .map(|(name, kind)| EntitySummary { name, kind })
            .collect())
    }

    /// Introspect `name`. `epoch` is stamped into the result for cache bookkeeping.
    pub async fn resolve(&self, name: &str, epoch: u64) -> Result<EntityMetadata, AppError> {
        let kind = self
            .source
            .relation_kind(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("entity '{}'", name)))?;
        let meta = match kind {
            RelationKind::Table => self.resolve_table(name, epoch).await?,
            RelationKind::View => self.resolve_view(name, epoch).await?,
        };
        tracing::info!(
            entity = %meta.name,
            kind = ?meta.kind,
            members = ?meta.member_units,
            member_provenance = ?meta.member_provenance,
            ownership_provenance = ?meta.ownership_provenance,
            "resolved entity metadata"
        );
        Ok(meta)
    }

    async fn resolve_table(&self, name: &str, epoch: u64) -> Result<EntityMetadata, AppError> {
        let unit = self.storage_unit(name).await?;
        let column_ownership = unit
            .columns
            .iter()
            .map(|c| (c.name.clone(), unit.name.clone()))
            .collect();
        Ok(EntityMetadata {
            schema: unit.schema.clone(),
            name: unit.name.clone(),
            kind: EntityKind::Single,
            relation: RelationKind::Table,
            columns: unit.columns.clone(),
            primary_key: unit.primary_key.clone(),
            member_units: vec![unit.name.clone()],
            column_ownership,
            member_provenance: Provenance::FromCatalog,
            ownership_provenance: Provenance::FromCatalog,
            ambiguous_columns: Vec::new(),
            units: vec![unit],
            epoch,
        })
    }

    async fn resolve_view(&self, name: &str, epoch: u64) -> Result<EntityMetadata, AppError> {
        let columns = self.describe_columns(name).await?;
        let primary_key = resolve_primary_key(&columns)
            .ok_or_else(|| AppError::Validation(format!("view '{}' has no columns", name)))?;

        let (candidates, member_provenance) = self.member_candidates(name).await?;
        let mut units = Vec::new();
        for candidate in candidates {
            if candidate == name {
                continue;
            }
            match self.source.relation_kind(&candidate).await? {
                Some(RelationKind::Table) => units.push(self.storage_unit(&candidate).await?),
                other => tracing::debug!(view = %name, candidate = %candidate, kind = ?other, "skipping non-table view reference"),
            }
        }

        if units.len() <= 1 {
            // Zero or one backing table: the view is written through directly.
            let self_unit = StorageUnit {
                schema: self.schema().to_string(),
                name: name.to_string(),
                columns: columns.clone(),
                primary_key: primary_key.clone(),
            };
            let column_ownership = columns
                .iter()
                .map(|c| (c.name.clone(), name.to_string()))
                .collect();
            return Ok(EntityMetadata {
                schema: self.schema().to_string(),
                name: name.to_string(),
                kind: EntityKind::Single,
                relation: RelationKind::View,
                columns,
                primary_key,
                member_units: vec![name.to_string()],
                column_ownership,
                member_provenance,
                ownership_provenance: Provenance::FromCatalog,
                ambiguous_columns: Vec::new(),
                units: vec![self_unit],
                epoch,
            });
        }

        let ownership = self.column_ownership(name, &columns, &units).await?;
        Ok(EntityMetadata {
            schema: self.schema().to_string(),
            name: name.to_string(),
            kind: EntityKind::Composite,
            relation: RelationKind::View,
            columns,
            primary_key,
            member_units: units.iter().map(|u| u.name.clone()).collect(),
            column_ownership: ownership.map,
            member_provenance,
            ownership_provenance: ownership.provenance,
            ambiguous_columns: ownership.ambiguous,
            units,
            epoch,
        })
    }

    /// Units a view uses: the catalog relation first, the definition scan when it is empty.
    async fn member_candidates(&self, view: &str) -> Result<(Vec<String>, Provenance), AppError> {
        let declared = self.source.view_units(view).await?;
        if !declared.is_empty() {
            return Ok((declared, Provenance::FromCatalog));
        }
        let definition = self.source.view_definition(view).await?.unwrap_or_default();
        let parsed = referenced_relations(&definition);
        tracing::warn!(
            view = %view,
            units = ?parsed,
            "view usage not exposed by catalog; member units parsed from definition"
        );
        Ok((parsed, Provenance::FromHeuristic))
    }

    async fn column_ownership(
        &self,
        view: &str,
        columns: &[ColumnDescriptor],
        units: &[StorageUnit],
    ) -> Result<Ownership, AppError> {
        let usage = self.source.view_column_usage(view).await?;
        let mut map = BTreeMap::new();
        let mut ambiguous = Vec::new();
        let mut heuristic_used = usage.is_empty();

        for column in columns {
            let from_usage = units.iter().find(|u| {
                usage
                    .iter()
                    .any(|cu| cu.unit == u.name && cu.column == column.name)
            });
            if let Some(unit) = from_usage {
                map.insert(column.name.clone(), unit.name.clone());
                continue;
            }
            let mut matching = units.iter().filter(|u| u.has_column(&column.name));
            let Some(first) = matching.next() else {
                tracing::debug!(view = %view, column = %column.name, "column has no owning unit");
                continue;
            };
            heuristic_used = true;
            if matching.next().is_some() {
                ambiguous.push(column.name.clone());
            }
            map.insert(column.name.clone(), first.name.clone());
        }

        if !ambiguous.is_empty() {
            tracing::warn!(
                view = %view,
                columns = ?ambiguous,
                "column exists in several member units; first unit wins"
            );
        }
        Ok(Ownership {
            map,
            provenance: if heuristic_used {
                Provenance::FromHeuristic
            } else {
                Provenance::FromCatalog
            },
            ambiguous,
        })
    }

    async fn storage_unit(&self, name: &str) -> Result<StorageUnit, AppError> {
        let columns = self.describe_columns(name).await?;
        let primary_key = resolve_primary_key(&columns)
            .ok_or_else(|| AppError::Validation(format!("table '{}' has no columns", name)))?;
        Ok(StorageUnit {
            schema: self.schema().to_string(),
            name: name.to_string(),
            columns,
            primary_key,
        })
    }

    /// Column descriptors with key, uniqueness and foreign-key flags filled in.
    async fn describe_columns(&self, relation: &str) -> Result<Vec<ColumnDescriptor>, AppError> {
        let raw = self.source.columns(relation).await?;
        let keys = self.source.key_columns(relation).await?;
        let fks = self.source.foreign_keys(relation).await?;

        let mut constraint_width: HashMap<&str, usize> = HashMap::new();
        for k in &keys {
            *constraint_width.entry(k.constraint.as_str()).or_default() += 1;
        }

        Ok(raw
            .into_iter()
            .map(|c| {
                let primary_key = keys
                    .iter()
                    .any(|k| k.kind == KeyKind::Primary && k.column == c.name);
                let unique = keys.iter().any(|k| {
                    k.column == c.name && constraint_width.get(k.constraint.as_str()) == Some(&1)
                });
                let foreign_key = fks.iter().find(|fk| fk.column == c.name).map(|fk| ForeignKey {
                    referenced_unit: fk.referenced_unit.clone(),
                    referenced_column: fk.referenced_column.clone(),
                    referenced_is_primary: fk.referenced_is_primary,
                });
                descriptor(c, primary_key, unique, foreign_key)
            })
            .collect())
    }
}

struct Ownership {
    map: BTreeMap<String, String>,
    provenance: Provenance,
    ambiguous: Vec<String>,
}

fn descriptor(c: RawColumn, primary_key: bool, unique: bool, foreign_key: Option<ForeignKey>) -> ColumnDescriptor {
    let sequence_default = c
        .default
        .as_deref()
        .map(|d| d.trim_start().to_lowercase().starts_with("nextval("))
        .unwrap_or(false);
    let auto_generated = c.is_identity || c.is_generated || sequence_default;
    let cast_type = cast_type_name(&c.udt_schema, &c.udt_name);
    ColumnDescriptor {
        name: c.name,
        data_type: c.data_type,
        cast_type,
        nullable: c.nullable,
        primary_key,
        auto_generated,
        unique: unique || primary_key,
        has_default: c.default.is_some() && !auto_generated,
        foreign_key,
    }
}

/// Built-in types cast by bare name, user-defined types schema-qualified and quoted.
fn cast_type_name(udt_schema: &str, udt_name: &str) -> Option<String> {
    if udt_name.is_empty() {
        return None;
    }
    if udt_schema.is_empty() || udt_schema == "pg_catalog" {
        Some(udt_name.to_string())
    } else {
        Some(format!(
            "\"{}\".\"{}\"",
            udt_schema.replace('"', "\"\""),
            udt_name.replace('"', "\"\"")
        ))
    }
}
