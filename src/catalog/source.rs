//! Raw catalog lookups: the store-side half of introspection.

use crate::catalog::RelationKind;
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::PgPool;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    pub data_type: String,
    pub udt_schema: String,
    pub udt_name: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_identity: bool,
    pub is_generated: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    Primary,
    Unique,
}

/// One column of a primary-key or unique constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyColumn {
    pub constraint: String,
    pub column: String,
    pub kind: KeyKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawForeignKey {
    pub column: String,
    pub referenced_unit: String,
    pub referenced_column: String,
    pub referenced_is_primary: bool,
}

/// A (unit, column) pair a view reads from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnUsage {
    pub unit: String,
    pub column: String,
}

/// Catalog relations consumed by the schema catalog. Every method is a pure read.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Schema all names are resolved in.
    fn schema(&self) -> &str;
    async fn relation_kind(&self, name: &str) -> Result<Option<RelationKind>, AppError>;
    async fn list_relations(&self) -> Result<Vec<(String, RelationKind)>, AppError>;
    /// Columns in ordinal order.
    async fn columns(&self, relation: &str) -> Result<Vec<RawColumn>, AppError>;
    async fn key_columns(&self, unit: &str) -> Result<Vec<KeyColumn>, AppError>;
    async fn foreign_keys(&self, unit: &str) -> Result<Vec<RawForeignKey>, AppError>;
    /// Units a view declares it uses. May be empty when the catalog does not expose it.
    async fn view_units(&self, view: &str) -> Result<Vec<String>, AppError>;
    async fn view_column_usage(&self, view: &str) -> Result<Vec<ColumnUsage>, AppError>;
    async fn view_definition(&self, view: &str) -> Result<Option<String>, AppError>;
}

fn relation_kind_from_table_type(table_type: &str) -> RelationKind {
    if table_type.eq_ignore_ascii_case("VIEW") {
        RelationKind::View
    } else {
        RelationKind::Table
    }
}

/// `information_schema` lookups over a PostgreSQL pool, scoped to one schema.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
    schema: String,
}

impl PgCatalog {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgCatalog {
            pool,
            schema: schema.into(),
        }
    }
}

const RELATION_KIND_SQL: &str = "SELECT table_type::text FROM information_schema.tables \
     WHERE table_schema = $1 AND table_name = $2";

const LIST_RELATIONS_SQL: &str = "SELECT table_name::text, table_type::text FROM information_schema.tables \
     WHERE table_schema = $1 ORDER BY table_name";

const COLUMNS_SQL: &str = r#"
    SELECT column_name::text, data_type::text, udt_schema::text, udt_name::text,
           (is_nullable = 'YES') AS nullable,
           column_default::text,
           (is_identity = 'YES') AS is_identity,
           (is_generated <> 'NEVER') AS is_generated
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position
"#;

const KEY_COLUMNS_SQL: &str = r#"
    SELECT tc.constraint_name::text, kcu.column_name::text, tc.constraint_type::text
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_schema = tc.constraint_schema
     AND kcu.constraint_name = tc.constraint_name
     AND kcu.table_name = tc.table_name
    WHERE tc.table_schema = $1 AND tc.table_name = $2
      AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
    ORDER BY tc.constraint_name, kcu.ordinal_position
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT kcu.column_name::text,
           ref.table_name::text AS referenced_unit,
           ref.column_name::text AS referenced_column,
           EXISTS (
               SELECT 1
               FROM information_schema.table_constraints pk
               JOIN information_schema.key_column_usage pkc
                 ON pkc.constraint_schema = pk.constraint_schema
                AND pkc.constraint_name = pk.constraint_name
               WHERE pk.constraint_type = 'PRIMARY KEY'
                 AND pk.table_schema = ref.table_schema
                 AND pk.table_name = ref.table_name
                 AND pkc.column_name = ref.column_name
           ) AS referenced_is_primary
    FROM information_schema.referential_constraints rc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_schema = rc.constraint_schema
     AND kcu.constraint_name = rc.constraint_name
    JOIN information_schema.key_column_usage ref
      ON ref.constraint_schema = rc.unique_constraint_schema
     AND ref.constraint_name = rc.unique_constraint_name
     AND ref.ordinal_position = kcu.position_in_unique_constraint
    WHERE kcu.table_schema = $1 AND kcu.table_name = $2
    ORDER BY rc.constraint_name, kcu.ordinal_position
"#;

const VIEW_UNITS_SQL: &str = "SELECT DISTINCT table_name::text FROM information_schema.view_table_usage \
     WHERE view_schema = $1 AND view_name = $2 AND table_schema = $1 ORDER BY 1";

const VIEW_COLUMN_USAGE_SQL: &str = "SELECT table_name::text, column_name::text FROM information_schema.view_column_usage \
     WHERE view_schema = $1 AND view_name = $2 AND table_schema = $1 ORDER BY table_name, column_name";

const VIEW_DEFINITION_SQL: &str = "SELECT view_definition::text FROM information_schema.views \
     WHERE table_schema = $1 AND table_name = $2";

#[async_trait]
impl CatalogSource for PgCatalog {
    fn schema(&self) -> &str {
        &self.schema
    }

    async fn relation_kind(&self, name: &str) -> Result<Option<RelationKind>, AppError> {
        let row: Option<(Option<String>,)> = sqlx::query_as(RELATION_KIND_SQL)
            .bind(&self.schema)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(t,)| relation_kind_from_table_type(t.as_deref().unwrap_or(""))))
    }

    async fn list_relations(&self) -> Result<Vec<(String, RelationKind)>, AppError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(LIST_RELATIONS_SQL)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(name, t)| (name, relation_kind_from_table_type(t.as_deref().unwrap_or(""))))
            .collect())
    }

    async fn columns(&self, relation: &str) -> Result<Vec<RawColumn>, AppError> {
        let rows: Vec<(String, String, String, String, bool, Option<String>, bool, bool)> =
            sqlx::query_as(COLUMNS_SQL)
                .bind(&self.schema)
                .bind(relation)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(
                |(name, data_type, udt_schema, udt_name, nullable, default, is_identity, is_generated)| RawColumn {
                    name,
                    data_type,
                    udt_schema,
                    udt_name,
                    nullable,
                    default,
                    is_identity,
                    is_generated,
                },
            )
            .collect())
    }

    async fn key_columns(&self, unit: &str) -> Result<Vec<KeyColumn>, AppError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(KEY_COLUMNS_SQL)
            .bind(&self.schema)
            .bind(unit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(constraint, column, constraint_type)| KeyColumn {
                constraint,
                column,
                kind: if constraint_type == "PRIMARY KEY" {
                    KeyKind::Primary
                } else {
                    KeyKind::Unique
                },
            })
            .collect())
    }

    async fn foreign_keys(&self, unit: &str) -> Result<Vec<RawForeignKey>, AppError> {
        let rows: Vec<(String, String, String, bool)> = sqlx::query_as(FOREIGN_KEYS_SQL)
            .bind(&self.schema)
            .bind(unit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(column, referenced_unit, referenced_column, referenced_is_primary)| RawForeignKey {
                column,
                referenced_unit,
                referenced_column,
                referenced_is_primary,
            })
            .collect())
    }

    async fn view_units(&self, view: &str) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(VIEW_UNITS_SQL)
            .bind(&self.schema)
            .bind(view)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    async fn view_column_usage(&self, view: &str) -> Result<Vec<ColumnUsage>, AppError> {
        let rows: Vec<(String, String)> = sqlx::query_as(VIEW_COLUMN_USAGE_SQL)
            .bind(&self.schema)
            .bind(view)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(unit, column)| ColumnUsage { unit, column })
            .collect())
    }

    async fn view_definition(&self, view: &str) -> Result<Option<String>, AppError> {
        let row: Option<(Option<String>,)> = sqlx::query_as(VIEW_DEFINITION_SQL)
            .bind(&self.schema)
            .bind(view)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(d,)| d))
    }
}
