//! Architect CRUD: a metadata-driven CRUD engine over introspected PostgreSQL tables and
//! composite views.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

pub use cache::{InMemoryMetadataCache, MetadataCache};
pub use catalog::{CatalogSource, EntityMetadata, PgCatalog, SchemaCatalog};
pub use config::EngineConfig;
pub use error::{AppError, ConfigError};
pub use response::{success_many, success_one};
pub use routes::{app, catalog_routes, common_routes_with_ready, entity_routes};
pub use service::CrudService;
pub use sql::{ReadRequest, StatementCompiler};
pub use state::AppState;
pub use store::{PgStore, Store, StoreTx};
