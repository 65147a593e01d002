//! Reads and single-unit mutations; composite entities are handed to `composite`.

use crate::error::AppError;
use crate::service::validation::{as_pairs, check_required, collect_fields, FieldMap, FileMap};
use crate::service::{finish, CrudService, DeleteResult, InsertResult, QueryResult, SingleInsert, UpdateResult};
use crate::sql::{self, PgBindValue, ReadRequest, StatementCompiler};
use crate::catalog::EntityMetadata;
use serde_json::Value;

impl CrudService {
    /// Compile and run one read. Never wrapped in a transaction.
    pub async fn query(&self, name: &str, req: &ReadRequest) -> Result<QueryResult, AppError> {
        let meta = self.resolve_metadata(name).await?;
        let compiled = StatementCompiler::new(&meta).compile(req)?;
        let rows = self.store.fetch_all(&compiled.query).await?;
        Ok(QueryResult {
            rows,
            columns: compiled.columns,
        })
    }

    /// First row whose `key_column` (default: the entity's primary key) equals `key_value`.
    pub async fn get_by_key(&self, name: &str, key_column: Option<&str>, key_value: &Value) -> Result<Value, AppError> {
        let meta = self.resolve_metadata(name).await?;
        let column = key_column_of(&meta, key_column)?;
        let q = sql::select_by_key(&meta, column, &PgBindValue::from_json(key_value));
        self.store
            .fetch_optional(&q)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} where {} = {}", meta.name, column, key_value)))
    }

    pub async fn insert(&self, name: &str, data: &FieldMap, files: &FileMap) -> Result<InsertResult, AppError> {
        let meta = self.resolve_metadata(name).await?;
        let fields = collect_fields(&meta, data, files)?;
        if meta.is_composite() {
            return self.insert_composite(&meta, fields).await.map(InsertResult::Composite);
        }

        let unit = meta.as_unit();
        check_required(&unit, &fields, &self.audit_column)?;
        let q = sql::insert(&unit, &as_pairs(&fields), &self.audit_column);
        let mut tx = self.store.begin().await?;
        let outcome = tx.execute(&q).await;
        let done = finish(tx, outcome).await?;
        let inserted_id = done
            .returned
            .as_ref()
            .and_then(|row| row.get(&unit.primary_key))
            .cloned()
            .unwrap_or(Value::Null);
        tracing::info!(entity = %meta.name, inserted_id = %inserted_id, "insert committed");
        Ok(InsertResult::Single(SingleInsert {
            inserted_id,
            affected_rows: done.rows_affected,
        }))
    }

    pub async fn update(
        &self,
        name: &str,
        pk_column: Option<&str>,
        pk_value: &Value,
        data: &FieldMap,
        files: &FileMap,
    ) -> Result<UpdateResult, AppError> {
        let meta = self.resolve_metadata(name).await?;
        let pk_column = key_column_of(&meta, pk_column)?.to_string();
        let fields = collect_fields(&meta, data, files)?;
        let key = PgBindValue::from_json(pk_value);
        if meta.is_composite() {
            return self.update_composite(&meta, &pk_column, pk_value, &key, fields).await;
        }

        let sets: Vec<_> = as_pairs(&fields)
            .into_iter()
            .filter(|(c, _)| *c != pk_column)
            .collect();
        if sets.is_empty() {
            return Err(AppError::Validation(format!(
                "no fields to update on '{}' besides '{}'",
                meta.name, pk_column
            )));
        }
        let q = sql::update(&meta.as_unit(), &sets, &pk_column, &key, &self.audit_column);
        let mut tx = self.store.begin().await?;
        let outcome = tx.execute(&q).await;
        let done = finish(tx, outcome).await?;
        tracing::info!(entity = %meta.name, rows = done.rows_affected, "update committed");
        Ok(UpdateResult {
            pk_column,
            pk_value: pk_value.clone(),
            affected_rows: done.rows_affected,
            updated_tables: None,
            skipped_units: None,
        })
    }

    pub async fn delete(&self, name: &str, pk_column: Option<&str>, pk_values: &[Value]) -> Result<DeleteResult, AppError> {
        let meta = self.resolve_metadata(name).await?;
        let pk_column = key_column_of(&meta, pk_column)?.to_string();
        if pk_values.is_empty() {
            return Err(AppError::Validation(format!("no key values given for '{}'", meta.name)));
        }
        let keys: Vec<PgBindValue> = pk_values.iter().map(PgBindValue::from_json).collect();
        if meta.is_composite() {
            return self.delete_composite(&meta, &pk_column, &keys).await;
        }

        let q = sql::delete_in(&meta.as_unit(), &pk_column, &keys);
        let mut tx = self.store.begin().await?;
        let outcome = tx.execute(&q).await;
        let done = finish(tx, outcome).await?;
        tracing::info!(entity = %meta.name, rows = done.rows_affected, "delete committed");
        Ok(DeleteResult {
            affected_rows: done.rows_affected,
            deleted_from_tables: None,
            skipped_units: None,
        })
    }
}

/// Caller's key column, or the entity's primary key; must be an entity column.
fn key_column_of<'m>(meta: &'m EntityMetadata, requested: Option<&'m str>) -> Result<&'m str, AppError> {
    let column = requested.unwrap_or(&meta.primary_key);
    if !meta.has_column(column) {
        return Err(AppError::Validation(format!(
            "unknown key column '{}' on '{}'",
            column, meta.name
        )));
    }
    Ok(column)
}
