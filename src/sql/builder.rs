//! Builds parameterized INSERT, UPDATE, DELETE and key lookups for one storage unit.
//! Identifiers come from resolved metadata only; values are always placeholders.

use crate::catalog::{ColumnDescriptor, EntityMetadata, StorageUnit};
use crate::sql::PgBindValue;

/// Quote identifier for PostgreSQL (safe: only from catalog metadata).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
    /// Statement yields a row (INSERT ... RETURNING) rather than only a row count.
    pub returning: bool,
}

impl QueryBuf {
    pub(crate) fn new() -> Self {
        QueryBuf::default()
    }

    pub(crate) fn push_param(&mut self, v: PgBindValue) -> u32 {
        self.params.push(v);
        self.params.len() as u32
    }

    /// Bind `v` and return its placeholder, cast to the column's type when known.
    pub(crate) fn bind_for(&mut self, v: PgBindValue, column: Option<&ColumnDescriptor>) -> String {
        let n = self.push_param(v);
        placeholder(n, column)
    }
}

pub(crate) fn placeholder(n: u32, column: Option<&ColumnDescriptor>) -> String {
    column
        .and_then(|c| c.cast_type.as_deref())
        .map(|t| format!("${}::{}", n, t))
        .unwrap_or_else(|| format!("${}", n))
}

/// One SELECT list entry; types sqlx cannot decode are read back as text under the same name.
pub(crate) fn select_expr(column: &ColumnDescriptor) -> String {
    let q = quoted(&column.name);
    if column.reads_as_text() {
        format!("{}::text AS {}", q, q)
    } else {
        q
    }
}

pub fn select_column_list(columns: &[ColumnDescriptor]) -> String {
    columns.iter().map(select_expr).collect::<Vec<_>>().join(", ")
}

/// INSERT one row into `unit`. Auto-generated columns and the audit column are never
/// written explicitly; the audit column is stamped with NOW() when the unit has it.
/// Returns the full row so generated keys can feed dependent units.
pub fn insert(unit: &StorageUnit, fields: &[(&str, &PgBindValue)], audit_column: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&unit.schema, &unit.name);
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for c in &unit.columns {
        if c.auto_generated || c.name == audit_column {
            continue;
        }
        let Some((_, v)) = fields.iter().find(|(name, _)| *name == c.name) else {
            continue;
        };
        let ph = q.bind_for((*v).clone(), Some(c));
        cols.push(quoted(&c.name));
        values.push(ph);
    }
    if unit.has_column(audit_column) {
        cols.push(quoted(audit_column));
        values.push("NOW()".to_string());
    }
    let returning = select_column_list(&unit.columns);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            values.join(", "),
            returning
        )
    };
    q.returning = true;
    q
}

/// UPDATE rows of `unit` where `key_column = key_value`. `sets` must not contain the key
/// column; the audit column is re-stamped when present.
pub fn update(
    unit: &StorageUnit,
    sets: &[(&str, &PgBindValue)],
    key_column: &str,
    key_value: &PgBindValue,
    audit_column: &str,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&unit.schema, &unit.name);
    let mut assignments = Vec::new();
    for (name, v) in sets {
        if *name == key_column || *name == audit_column {
            continue;
        }
        let Some(c) = unit.column(name) else { continue };
        let rhs = q.bind_for((*v).clone(), Some(c));
        assignments.push(format!("{} = {}", quoted(name), rhs));
    }
    if unit.has_column(audit_column) {
        assignments.push(format!("{} = NOW()", quoted(audit_column)));
    }
    let key = q.bind_for(key_value.clone(), unit.column(key_column));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        table,
        assignments.join(", "),
        quoted(key_column),
        key
    );
    q
}

/// DELETE rows of `unit` whose `key_column` is in `keys`.
pub fn delete_in(unit: &StorageUnit, key_column: &str, keys: &[PgBindValue]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&unit.schema, &unit.name);
    let column = unit.column(key_column);
    let placeholders: Vec<String> = keys.iter().map(|k| q.bind_for(k.clone(), column)).collect();
    q.sql = format!(
        "DELETE FROM {} WHERE {} IN ({})",
        table,
        quoted(key_column),
        placeholders.join(", ")
    );
    q
}

/// SELECT the first row of the entity whose `column = value`.
pub fn select_by_key(entity: &EntityMetadata, column: &str, value: &PgBindValue) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&entity.schema, &entity.name);
    let ph = q.bind_for(value.clone(), entity.column(column));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {} LIMIT 1",
        select_column_list(&entity.columns),
        table,
        quoted(column),
        ph
    );
    q
}
