//! Test fixtures: an in-memory catalog and a store that records what it is asked to run.

use crate::cache::InMemoryMetadataCache;
use crate::catalog::*;
use crate::error::AppError;
use crate::service::CrudService;
use crate::sql::{PgBindValue, QueryBuf};
use crate::store::{Execution, Store, StoreTx};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn service(catalog: MemoryCatalog, store: RecordingStore) -> CrudService {
    CrudService::new(
        SchemaCatalog::new(Arc::new(catalog)),
        Arc::new(InMemoryMetadataCache::new()),
        Arc::new(store),
        "updated_at",
    )
}

fn data_type(udt: &str) -> &'static str {
    match udt {
        "int4" => "integer",
        "int8" => "bigint",
        "numeric" => "numeric",
        "timestamptz" => "timestamp with time zone",
        _ => "text",
    }
}

pub fn col(name: &str, udt: &str) -> RawColumn {
    RawColumn {
        name: name.into(),
        data_type: data_type(udt).into(),
        udt_schema: "pg_catalog".into(),
        udt_name: udt.into(),
        nullable: true,
        default: None,
        is_identity: false,
        is_generated: false,
    }
}

pub fn required(name: &str, udt: &str) -> RawColumn {
    RawColumn {
        nullable: false,
        ..col(name, udt)
    }
}

pub fn identity(name: &str) -> RawColumn {
    RawColumn {
        nullable: false,
        is_identity: true,
        ..col(name, "int4")
    }
}

/// In-memory `CatalogSource`. Views copy column shapes from their units, the way the
/// catalog reports them: nullable, no default, no identity.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    relations: Vec<(String, RelationKind)>,
    columns: HashMap<String, Vec<RawColumn>>,
    keys: HashMap<String, Vec<KeyColumn>>,
    fks: HashMap<String, Vec<RawForeignKey>>,
    view_units: HashMap<String, Vec<String>>,
    view_usage: HashMap<String, Vec<ColumnUsage>>,
    definitions: HashMap<String, String>,
    lookups: Arc<AtomicUsize>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// `items(id identity PK, name text NOT NULL, qty int4)`.
    pub fn items() -> Self {
        Self::new()
            .table("items", vec![identity("id"), required("name", "text"), col("qty", "int4")])
            .primary_key("items", "id")
    }

    /// `orders` and `order_lines(order_id -> orders.id)` behind `order_view`.
    pub fn orders() -> Self {
        Self::new()
            .table(
                "orders",
                vec![identity("id"), col("customer", "text"), required("updated_at", "timestamptz")],
            )
            .primary_key("orders", "id")
            .table(
                "order_lines",
                vec![identity("id"), col("order_id", "int4"), col("sku", "text")],
            )
            .primary_key("order_lines", "id")
            .foreign_key("order_lines", "order_id", "orders", "id")
            .view("order_view", &["id", "customer", "order_id", "sku"], &["order_lines", "orders"])
            .definition(
                "order_view",
                " SELECT l.id,\n    o.customer,\n    l.order_id,\n    l.sku\n   FROM (orders o\n     JOIN order_lines l ON ((o.id = l.order_id)));",
            )
    }

    /// `authors` and `books` referencing each other behind `author_books`.
    pub fn authors() -> Self {
        Self::new()
            .table(
                "authors",
                vec![identity("id"), col("pen_name", "text"), col("featured_book_id", "int4")],
            )
            .primary_key("authors", "id")
            .table(
                "books",
                vec![identity("book_id"), col("author_id", "int4"), required("title", "text")],
            )
            .primary_key("books", "book_id")
            .foreign_key("authors", "featured_book_id", "books", "book_id")
            .foreign_key("books", "author_id", "authors", "id")
            .view("author_books", &["id", "pen_name", "book_id", "title"], &["authors", "books"])
    }

    /// `notes` and `tags` with no relationship behind `note_tags`.
    pub fn unrelated() -> Self {
        Self::new()
            .table("notes", vec![identity("note_id"), col("body", "text")])
            .primary_key("notes", "note_id")
            .table("tags", vec![identity("tag_id"), col("label", "text")])
            .primary_key("tags", "tag_id")
            .view("note_tags", &["note_id", "body", "tag_id", "label"], &["notes", "tags"])
    }

    pub fn table(mut self, name: &str, columns: Vec<RawColumn>) -> Self {
        self.relations.push((name.into(), RelationKind::Table));
        self.columns.insert(name.into(), columns);
        self
    }

    pub fn primary_key(mut self, table: &str, column: &str) -> Self {
        self.keys.entry(table.into()).or_default().push(KeyColumn {
            constraint: format!("{}_pkey", table),
            column: column.into(),
            kind: KeyKind::Primary,
        });
        self
    }

    pub fn foreign_key(mut self, table: &str, column: &str, referenced: &str, referenced_column: &str) -> Self {
        let referenced_is_primary = self
            .keys
            .get(referenced)
            .is_some_and(|ks| ks.iter().any(|k| k.kind == KeyKind::Primary && k.column == referenced_column));
        self.fks.entry(table.into()).or_default().push(RawForeignKey {
            column: column.into(),
            referenced_unit: referenced.into(),
            referenced_column: referenced_column.into(),
            referenced_is_primary,
        });
        self
    }

    /// A view selecting `columns`, each taken from the first of `units` that has it.
    pub fn view(mut self, name: &str, columns: &[&str], units: &[&str]) -> Self {
        let mut raw = Vec::new();
        let mut usage = Vec::new();
        for c in columns {
            let source = units.iter().find_map(|u| {
                self.columns
                    .get(*u)
                    .and_then(|cols| cols.iter().find(|rc| rc.name == *c))
                    .map(|rc| (*u, rc.clone()))
            });
            let Some((unit, rc)) = source else { continue };
            raw.push(RawColumn {
                nullable: true,
                default: None,
                is_identity: false,
                ..rc
            });
            usage.push(ColumnUsage {
                unit: unit.into(),
                column: (*c).into(),
            });
        }
        let mut declared: Vec<String> = units.iter().map(|u| u.to_string()).collect();
        declared.sort();
        self.relations.push((name.into(), RelationKind::View));
        self.columns.insert(name.into(), raw);
        self.view_units.insert(name.into(), declared);
        self.view_usage.insert(name.into(), usage);
        self.definitions
            .insert(name.into(), format!("SELECT * FROM {}", units.join(" CROSS JOIN ")));
        self
    }

    pub fn definition(mut self, view: &str, sql: &str) -> Self {
        self.definitions.insert(view.into(), sql.into());
        self
    }

    /// Catalog that does not expose which units/columns `view` uses.
    pub fn without_view_usage(mut self, view: &str) -> Self {
        self.view_units.remove(view);
        self.view_usage.remove(view);
        self
    }

    /// Add a view column no unit supplies.
    pub fn computed_column(mut self, view: &str, name: &str) -> Self {
        self.columns.entry(view.into()).or_default().push(col(name, "numeric"));
        self
    }

    /// Relation-kind lookups served so far; one or more per resolution.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for MemoryCatalog {
    fn schema(&self) -> &str {
        "public"
    }

    async fn relation_kind(&self, name: &str) -> Result<Option<RelationKind>, AppError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.relations.iter().find(|(n, _)| n == name).map(|(_, k)| *k))
    }

    async fn list_relations(&self) -> Result<Vec<(String, RelationKind)>, AppError> {
        let mut out = self.relations.clone();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    async fn columns(&self, relation: &str) -> Result<Vec<RawColumn>, AppError> {
        Ok(self.columns.get(relation).cloned().unwrap_or_default())
    }

    async fn key_columns(&self, unit: &str) -> Result<Vec<KeyColumn>, AppError> {
        Ok(self.keys.get(unit).cloned().unwrap_or_default())
    }

    async fn foreign_keys(&self, unit: &str) -> Result<Vec<RawForeignKey>, AppError> {
        Ok(self.fks.get(unit).cloned().unwrap_or_default())
    }

    async fn view_units(&self, view: &str) -> Result<Vec<String>, AppError> {
        Ok(self.view_units.get(view).cloned().unwrap_or_default())
    }

    async fn view_column_usage(&self, view: &str) -> Result<Vec<ColumnUsage>, AppError> {
        Ok(self.view_usage.get(view).cloned().unwrap_or_default())
    }

    async fn view_definition(&self, view: &str) -> Result<Option<String>, AppError> {
        Ok(self.definitions.get(view).cloned())
    }
}

pub fn descriptor(name: &str, cast: &str, nullable: bool) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.into(),
        data_type: data_type(cast).into(),
        cast_type: Some(cast.into()),
        nullable,
        primary_key: false,
        auto_generated: false,
        unique: false,
        has_default: false,
        foreign_key: None,
    }
}

/// What `SchemaCatalog` resolves `MemoryCatalog::items()` to, for synchronous tests.
pub fn items_metadata() -> EntityMetadata {
    let id = ColumnDescriptor {
        primary_key: true,
        auto_generated: true,
        unique: true,
        ..descriptor("id", "int4", false)
    };
    let columns = vec![id, descriptor("name", "text", false), descriptor("qty", "int4", true)];
    EntityMetadata {
        schema: "public".into(),
        name: "items".into(),
        kind: EntityKind::Single,
        relation: RelationKind::Table,
        columns: columns.clone(),
        primary_key: "id".into(),
        member_units: vec!["items".into()],
        column_ownership: columns.iter().map(|c| (c.name.clone(), "items".to_string())).collect::<BTreeMap<_, _>>(),
        member_provenance: Provenance::FromCatalog,
        ownership_provenance: Provenance::FromCatalog,
        ambiguous_columns: Vec::new(),
        units: vec![StorageUnit {
            schema: "public".into(),
            name: "items".into(),
            columns,
            primary_key: "id".into(),
        }],
        epoch: 0,
    }
}

/// A storage unit of int4 columns; the first column is the primary key.
pub fn unit(name: &str, columns: &[&str]) -> StorageUnit {
    StorageUnit {
        schema: "public".into(),
        name: name.into(),
        columns: columns.iter().map(|c| descriptor(c, "int4", true)).collect(),
        primary_key: columns.first().map(|c| c.to_string()).unwrap_or_default(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Fetch(String),
    Begin,
    Execute { sql: String, params: Vec<PgBindValue> },
    Commit,
    Rollback,
}

struct Recorded {
    events: Vec<Event>,
    last_key: i64,
    key_columns: HashMap<String, String>,
    fail_when: Option<String>,
    rows_affected: u64,
    rows: Vec<Value>,
}

/// `Store` that records every call. RETURNING statements yield `{<key column>: n}` with
/// `n` counting up from 1 across the store; other statements affect `rows_affected` rows.
#[derive(Clone)]
pub struct RecordingStore {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        RecordingStore {
            inner: Arc::new(Mutex::new(Recorded {
                events: Vec::new(),
                last_key: 0,
                key_columns: HashMap::new(),
                fail_when: None,
                rows_affected: 1,
                rows: Vec::new(),
            })),
        }
    }

    /// Fail any statement whose text contains `needle`.
    pub fn failing_on(self, needle: &str) -> Self {
        self.inner.lock().unwrap().fail_when = Some(needle.into());
        self
    }

    pub fn with_rows_affected(self, n: u64) -> Self {
        self.inner.lock().unwrap().rows_affected = n;
        self
    }

    /// Rows returned by every read.
    pub fn with_rows(self, rows: Vec<Value>) -> Self {
        self.inner.lock().unwrap().rows = rows;
        self
    }

    /// Key column reported for inserts into `table` (default `id`).
    pub fn with_key(self, table: &str, column: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .key_columns
            .insert(table.into(), column.into());
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Execute { sql, .. } => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn executed_params(&self) -> Vec<Vec<PgBindValue>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Execute { params, .. } => Some(params),
                _ => None,
            })
            .collect()
    }
}

/// Table name of an `INSERT INTO "schema"."table" ...` statement.
fn inserted_table(sql: &str) -> String {
    sql.strip_prefix("INSERT INTO ")
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|qualified| qualified.rsplit('.').next())
        .map(|t| t.trim_matches('"').to_string())
        .unwrap_or_default()
}

#[async_trait]
impl Store for RecordingStore {
    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        let mut r = self.inner.lock().unwrap();
        r.events.push(Event::Fetch(q.sql.clone()));
        Ok(r.rows.clone())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        self.inner.lock().unwrap().events.push(Event::Begin);
        Ok(Box::new(RecordingTx {
            inner: self.inner.clone(),
        }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

struct RecordingTx {
    inner: Arc<Mutex<Recorded>>,
}

#[async_trait]
impl StoreTx for RecordingTx {
    async fn execute(&mut self, q: &QueryBuf) -> Result<Execution, AppError> {
        let mut r = self.inner.lock().unwrap();
        r.events.push(Event::Execute {
            sql: q.sql.clone(),
            params: q.params.clone(),
        });
        if let Some(needle) = &r.fail_when {
            if q.sql.contains(needle.as_str()) {
                return Err(AppError::Constraint(format!("simulated failure on '{}'", needle)));
            }
        }
        if q.returning {
            r.last_key += 1;
            let table = inserted_table(&q.sql);
            let key_column = r.key_columns.get(&table).cloned().unwrap_or_else(|| "id".into());
            let mut row = Map::new();
            row.insert(key_column, Value::Number(r.last_key.into()));
            return Ok(Execution {
                rows_affected: 1,
                returned: Some(Value::Object(row)),
            });
        }
        Ok(Execution {
            rows_affected: r.rows_affected,
            returned: None,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.inner.lock().unwrap().events.push(Event::Commit);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.inner.lock().unwrap().events.push(Event::Rollback);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_items_metadata_matches_resolution() {
        let catalog = SchemaCatalog::new(Arc::new(MemoryCatalog::items()));
        assert_eq!(catalog.resolve("items", 0).await.unwrap(), items_metadata());
    }

    #[test]
    fn test_inserted_table() {
        assert_eq!(inserted_table("INSERT INTO \"public\".\"order_lines\" (\"sku\") VALUES ($1)"), "order_lines");
    }
}
