//! Schema catalog: introspects the store into entity metadata.

mod resolver;
pub mod source;
pub mod types;
pub mod view_parse;

pub use resolver::SchemaCatalog;
pub use source::{CatalogSource, ColumnUsage, KeyColumn, KeyKind, PgCatalog, RawColumn, RawForeignKey};
pub use types::*;
