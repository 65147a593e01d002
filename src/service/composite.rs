//! Multi-unit mutations: one transaction per request, units in dependency order.

use crate::catalog::EntityMetadata;
use crate::error::AppError;
use crate::graph::{derive_relationships, order_units, RelationshipGraph, UnitOrder};
use crate::service::keys::{resolve_unit_key, UnitKey};
use crate::service::validation::{as_pairs, check_required, Fields};
use crate::service::{finish, CompositeInsert, CrudService, DeleteResult, SkippedUnit, UpdateResult};
use crate::sql::{self, PgBindValue};
use crate::store::StoreTx;
use serde_json::Value;
use std::collections::BTreeMap;

/// Relationships and unit order for one composite mutation.
struct MutationPlan {
    graph: RelationshipGraph,
    order: UnitOrder,
}

impl MutationPlan {
    fn for_entity(meta: &EntityMetadata) -> Self {
        let graph = derive_relationships(&meta.units);
        let order = order_units(&meta.member_units, &graph.relationships);
        if order.degraded {
            tracing::warn!(entity = %meta.name, order = ?order.insert_order, "mutating in degraded unit order");
        }
        MutationPlan { graph, order }
    }
}

/// Split entity fields by owning unit. Columns without an owner cannot be written.
fn group_by_owner(meta: &EntityMetadata, fields: Fields) -> Result<BTreeMap<String, Fields>, AppError> {
    let mut grouped: BTreeMap<String, Fields> = BTreeMap::new();
    for (column, value) in fields {
        let owner = meta.owner_of(&column).ok_or_else(|| {
            AppError::Validation(format!("column '{}' of '{}' is not writable", column, meta.name))
        })?;
        grouped.entry(owner.to_string()).or_default().insert(column, value);
    }
    Ok(grouped)
}

impl CrudService {
    pub(super) async fn insert_composite(&self, meta: &EntityMetadata, fields: Fields) -> Result<CompositeInsert, AppError> {
        let mut grouped = group_by_owner(meta, fields)?;
        let plan = MutationPlan::for_entity(meta);
        let mut tx = self.store.begin().await?;
        let outcome = self.insert_units(tx.as_mut(), meta, &plan, &mut grouped).await;
        let result = finish(tx, outcome).await?;
        tracing::info!(entity = %meta.name, tables = ?result.affected_tables, "composite insert committed");
        Ok(result)
    }

    async fn insert_units(
        &self,
        tx: &mut dyn StoreTx,
        meta: &EntityMetadata,
        plan: &MutationPlan,
        grouped: &mut BTreeMap<String, Fields>,
    ) -> Result<CompositeInsert, AppError> {
        let mut returned: BTreeMap<String, Value> = BTreeMap::new();
        let mut result = CompositeInsert {
            inserted_ids: BTreeMap::new(),
            affected_tables: Vec::new(),
        };
        for unit_name in &plan.order.insert_order {
            let Some(mut fields) = grouped.remove(unit_name).filter(|f| !f.is_empty()) else {
                tracing::debug!(entity = %meta.name, unit = %unit_name, "no fields for unit; not inserted");
                continue;
            };
            let Some(unit) = meta.unit(unit_name) else { continue };

            for r in plan.graph.relationships.iter().filter(|r| &r.dependent == unit_name) {
                if fields.contains_key(&r.fk_column) {
                    continue;
                }
                if let Some(v) = returned.get(&r.referenced).and_then(|row| row.get(&r.referenced_column)) {
                    fields.insert(r.fk_column.clone(), PgBindValue::from_json(v));
                }
            }
            check_required(unit, &fields, &self.audit_column)?;

            let q = sql::insert(unit, &as_pairs(&fields), &self.audit_column);
            let done = tx.execute(&q).await?;
            let row = done.returned.unwrap_or(Value::Null);
            let key = row.get(&unit.primary_key).cloned().unwrap_or(Value::Null);
            result.inserted_ids.insert(unit_name.clone(), key);
            result.affected_tables.push(unit_name.clone());
            returned.insert(unit_name.clone(), row);
        }
        Ok(result)
    }

    pub(super) async fn update_composite(
        &self,
        meta: &EntityMetadata,
        pk_column: &str,
        pk_value: &Value,
        key: &PgBindValue,
        fields: Fields,
    ) -> Result<UpdateResult, AppError> {
        let grouped = group_by_owner(meta, fields)?;
        let plan = MutationPlan::for_entity(meta);
        let mut tx = self.store.begin().await?;
        let outcome = self.update_units(tx.as_mut(), meta, &plan, pk_column, key, &grouped).await;
        let (affected_rows, updated, skipped) = finish(tx, outcome).await?;
        log_skipped(meta, "update", &skipped);
        tracing::info!(entity = %meta.name, tables = ?updated, rows = affected_rows, "composite update committed");
        Ok(UpdateResult {
            pk_column: pk_column.to_string(),
            pk_value: pk_value.clone(),
            affected_rows,
            updated_tables: Some(updated),
            skipped_units: Some(skipped),
        })
    }

    async fn update_units(
        &self,
        tx: &mut dyn StoreTx,
        meta: &EntityMetadata,
        plan: &MutationPlan,
        pk_column: &str,
        key: &PgBindValue,
        grouped: &BTreeMap<String, Fields>,
    ) -> Result<(u64, Vec<String>, Vec<SkippedUnit>), AppError> {
        let mut affected = 0;
        let mut updated = Vec::new();
        let mut skipped = Vec::new();
        for unit_name in &plan.order.insert_order {
            let Some(fields) = grouped.get(unit_name).filter(|f| !f.is_empty()) else { continue };
            let Some(unit) = meta.unit(unit_name) else { continue };
            let Some(unit_key) = resolve_unit_key(unit, pk_column, &plan.graph, Some(fields)) else {
                skipped.push(SkippedUnit {
                    unit: unit_name.clone(),
                    reason: format!("no key column for '{}' on this unit", pk_column),
                });
                continue;
            };
            let key_value = match &unit_key {
                UnitKey::Own(_, v) => v,
                UnitKey::Shared(_) => key,
            };
            let sets: Vec<_> = as_pairs(fields)
                .into_iter()
                .filter(|(c, _)| *c != unit_key.column())
                .collect();
            if sets.is_empty() {
                skipped.push(SkippedUnit {
                    unit: unit_name.clone(),
                    reason: "only key fields provided".into(),
                });
                continue;
            }
            let q = sql::update(unit, &sets, unit_key.column(), key_value, &self.audit_column);
            let done = tx.execute(&q).await?;
            affected += done.rows_affected;
            if done.rows_affected > 0 {
                updated.push(unit_name.clone());
            }
        }
        Ok((affected, updated, skipped))
    }

    pub(super) async fn delete_composite(
        &self,
        meta: &EntityMetadata,
        pk_column: &str,
        keys: &[PgBindValue],
    ) -> Result<DeleteResult, AppError> {
        let plan = MutationPlan::for_entity(meta);
        let mut tx = self.store.begin().await?;
        let outcome = self.delete_units(tx.as_mut(), meta, &plan, pk_column, keys).await;
        let (affected_rows, deleted, skipped) = finish(tx, outcome).await?;
        log_skipped(meta, "delete", &skipped);
        tracing::info!(entity = %meta.name, tables = ?deleted, rows = affected_rows, "composite delete committed");
        Ok(DeleteResult {
            affected_rows,
            deleted_from_tables: Some(deleted),
            skipped_units: Some(skipped),
        })
    }

    async fn delete_units(
        &self,
        tx: &mut dyn StoreTx,
        meta: &EntityMetadata,
        plan: &MutationPlan,
        pk_column: &str,
        keys: &[PgBindValue],
    ) -> Result<(u64, Vec<String>, Vec<SkippedUnit>), AppError> {
        let mut affected = 0;
        let mut deleted = Vec::new();
        let mut skipped = Vec::new();
        for unit_name in plan.order.delete_order() {
            let Some(unit) = meta.unit(&unit_name) else { continue };
            let Some(unit_key) = resolve_unit_key(unit, pk_column, &plan.graph, None) else {
                skipped.push(SkippedUnit {
                    unit: unit_name,
                    reason: format!("no key column for '{}' on this unit", pk_column),
                });
                continue;
            };
            let q = sql::delete_in(unit, unit_key.column(), keys);
            let done = tx.execute(&q).await?;
            affected += done.rows_affected;
            if done.rows_affected > 0 {
                deleted.push(unit_name);
            }
        }
        Ok((affected, deleted, skipped))
    }
}

fn log_skipped(meta: &EntityMetadata, op: &str, skipped: &[SkippedUnit]) {
    if !skipped.is_empty() {
        tracing::warn!(
            entity = %meta.name,
            op,
            units = ?skipped.iter().map(|s| s.unit.as_str()).collect::<Vec<_>>(),
            "member units skipped: no resolvable key"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::service::{FieldMap, FileMap, InsertResult, SkippedUnit};
    use crate::sql::PgBindValue;
    use crate::testing::{self, Event, MemoryCatalog, RecordingStore};
    use serde_json::json;

    fn fields(v: serde_json::Value) -> FieldMap {
        serde_json::from_value(v).unwrap()
    }

    fn composite(res: InsertResult) -> crate::service::CompositeInsert {
        match res {
            InsertResult::Composite(c) => c,
            other => panic!("expected composite insert, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_insert_writes_only_units_with_fields() {
        let store = RecordingStore::new();
        let service = testing::service(MemoryCatalog::orders(), store.clone());
        let res = service
            .insert("order_view", &fields(json!({"sku": "A1"})), &FileMap::new())
            .await
            .unwrap();
        let res = composite(res);
        assert_eq!(res.affected_tables, vec!["order_lines"]);
        let statements = store.statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("INSERT INTO \"public\".\"order_lines\""));
    }

    #[tokio::test]
    async fn test_referenced_unit_inserted_first_and_key_propagated() {
        let store = RecordingStore::new();
        let service = testing::service(MemoryCatalog::orders(), store.clone());
        let res = service
            .insert("order_view", &fields(json!({"customer": "c", "sku": "A1"})), &FileMap::new())
            .await
            .unwrap();
        let res = composite(res);
        assert_eq!(res.affected_tables, vec!["orders", "order_lines"]);
        assert_eq!(res.inserted_ids["orders"], json!(1));
        assert_eq!(res.inserted_ids["order_lines"], json!(2));

        let statements = store.statements();
        assert!(statements[0].starts_with("INSERT INTO \"public\".\"orders\" (\"customer\", \"updated_at\")"));
        assert!(statements[1].starts_with("INSERT INTO \"public\".\"order_lines\" (\"order_id\", \"sku\")"));
        assert_eq!(
            store.executed_params()[1],
            vec![PgBindValue::I64(1), PgBindValue::String("A1".into())]
        );
        assert_eq!(store.events().first(), Some(&Event::Begin));
        assert_eq!(store.events().last(), Some(&Event::Commit));
    }

    #[tokio::test]
    async fn test_failure_in_later_unit_rolls_back_everything() {
        let store = RecordingStore::new().failing_on("order_lines");
        let service = testing::service(MemoryCatalog::orders(), store.clone());
        let err = service
            .insert("order_view", &fields(json!({"customer": "c", "sku": "A1"})), &FileMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Constraint(_)));
        let events = store.events();
        assert_eq!(events.last(), Some(&Event::Rollback));
        assert!(!events.contains(&Event::Commit));
    }

    #[tokio::test]
    async fn test_cycle_still_inserts_in_member_order() {
        let store = RecordingStore::new().with_key("books", "book_id");
        let service = testing::service(MemoryCatalog::authors(), store.clone());
        let res = service
            .insert("author_books", &fields(json!({"pen_name": "p", "title": "t"})), &FileMap::new())
            .await
            .unwrap();
        let res = composite(res);
        assert_eq!(res.affected_tables, vec!["authors", "books"]);
        assert_eq!(res.inserted_ids["books"], json!(2));
        // books.author_id filled from the author inserted first
        assert_eq!(
            store.executed_params()[1],
            vec![PgBindValue::I64(1), PgBindValue::String("t".into())]
        );
    }

    #[tokio::test]
    async fn test_required_field_checked_after_key_propagation() {
        let store = RecordingStore::new();
        let service = testing::service(MemoryCatalog::authors(), store.clone());
        // books.title is NOT NULL
        let err = service
            .insert("author_books", &fields(json!({"pen_name": "p", "book_id": 5})), &FileMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.events().last(), Some(&Event::Rollback));
    }

    #[tokio::test]
    async fn test_update_skips_unit_without_key() {
        let store = RecordingStore::new();
        let service = testing::service(MemoryCatalog::unrelated(), store.clone());
        let res = service
            .update(
                "note_tags",
                None,
                &json!(1),
                &fields(json!({"body": "b", "label": "l"})),
                &FileMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(res.pk_column, "note_id");
        assert_eq!(res.updated_tables, Some(vec!["notes".to_string()]));
        assert_eq!(
            res.skipped_units,
            Some(vec![SkippedUnit {
                unit: "tags".into(),
                reason: "no key column for 'note_id' on this unit".into(),
            }])
        );
        assert_eq!(store.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_update_uses_own_key_from_data() {
        let store = RecordingStore::new();
        let service = testing::service(MemoryCatalog::unrelated(), store.clone());
        let res = service
            .update(
                "note_tags",
                None,
                &json!(1),
                &fields(json!({"label": "l", "tag_id": 4})),
                &FileMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(res.updated_tables, Some(vec!["tags".to_string()]));
        assert_eq!(
            store.statements(),
            vec!["UPDATE \"public\".\"tags\" SET \"label\" = $1::text WHERE \"tag_id\" = $2::int4"]
        );
        assert_eq!(store.executed_params()[0][1], PgBindValue::I64(4));
    }

    #[tokio::test]
    async fn test_delete_runs_in_reverse_dependency_order() {
        let store = RecordingStore::new();
        let service = testing::service(MemoryCatalog::orders(), store.clone());
        let res = service.delete("order_view", None, &[json!(1)]).await.unwrap();
        assert_eq!(res.affected_rows, 2);
        assert_eq!(
            res.deleted_from_tables,
            Some(vec!["order_lines".to_string(), "orders".to_string()])
        );
        assert_eq!(
            store.statements(),
            vec![
                "DELETE FROM \"public\".\"order_lines\" WHERE \"id\" IN ($1::int4)",
                "DELETE FROM \"public\".\"orders\" WHERE \"id\" IN ($1::int4)",
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_reports_skipped_units() {
        let store = RecordingStore::new();
        let service = testing::service(MemoryCatalog::unrelated(), store.clone());
        let res = service.delete("note_tags", None, &[json!(1)]).await.unwrap();
        assert_eq!(res.deleted_from_tables, Some(vec!["notes".to_string()]));
        assert_eq!(res.skipped_units.map(|s| s.len()), Some(1));
    }

    #[tokio::test]
    async fn test_referenced_unit_is_skipped_when_keyed_by_dependent_row() {
        let catalog = MemoryCatalog::new()
            .table("orders", vec![testing::identity("order_no"), testing::col("customer", "text")])
            .primary_key("orders", "order_no")
            .table(
                "order_lines",
                vec![testing::identity("line_id"), testing::col("order_no", "int4"), testing::col("sku", "text")],
            )
            .primary_key("order_lines", "line_id")
            .foreign_key("order_lines", "order_no", "orders", "order_no")
            .view("line_view", &["line_id", "customer", "order_no", "sku"], &["order_lines", "orders"]);
        let store = RecordingStore::new();
        let service = testing::service(catalog, store.clone());

        let res = service.delete("line_view", None, &[json!(7)]).await.unwrap();
        assert_eq!(
            store.statements(),
            vec!["DELETE FROM \"public\".\"order_lines\" WHERE \"line_id\" IN ($1::int4)"]
        );
        assert_eq!(
            res.skipped_units,
            Some(vec![SkippedUnit {
                unit: "orders".into(),
                reason: "no key column for 'line_id' on this unit".into(),
            }])
        );
    }

    #[tokio::test]
    async fn test_computed_columns_are_not_writable() {
        let store = RecordingStore::new();
        let service = testing::service(MemoryCatalog::orders().computed_column("order_view", "line_total"), store.clone());
        let err = service
            .insert("order_view", &fields(json!({"line_total": 3})), &FileMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.events().is_empty());
    }
}
