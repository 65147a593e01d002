//! CrudService: generic CRUD over introspected entities, single or composite.

mod composite;
mod crud;
mod keys;
mod results;
mod validation;

pub use results::*;
pub use validation::{FieldMap, FileMap};

use crate::cache::{InMemoryMetadataCache, MetadataCache};
use crate::catalog::{EntityMetadata, EntitySummary, PgCatalog, SchemaCatalog};
use crate::config::EngineConfig;
use crate::error::AppError;
use crate::graph::{derive_relationships, order_units};
use crate::store::{PgStore, Store, StoreTx};
use sqlx::PgPool;
use std::sync::Arc;

pub struct CrudService {
    catalog: SchemaCatalog,
    cache: Arc<dyn MetadataCache>,
    store: Arc<dyn Store>,
    /// Last-modified column stamped by the store on insert and update.
    audit_column: String,
}

impl CrudService {
    pub fn new(
        catalog: SchemaCatalog,
        cache: Arc<dyn MetadataCache>,
        store: Arc<dyn Store>,
        audit_column: impl Into<String>,
    ) -> Self {
        CrudService {
            catalog,
            cache,
            store,
            audit_column: audit_column.into(),
        }
    }

    /// Catalog, store and an in-memory cache over one pool.
    pub fn postgres(pool: PgPool, config: &EngineConfig) -> Self {
        let catalog = SchemaCatalog::new(Arc::new(PgCatalog::new(pool.clone(), config.schema.clone())));
        let store = PgStore::new(pool).with_timeout(config.statement_timeout);
        CrudService::new(
            catalog,
            Arc::new(InMemoryMetadataCache::new()),
            Arc::new(store),
            config.audit_column.clone(),
        )
    }

    /// Cached metadata for `name`, introspecting on first access.
    pub async fn resolve_metadata(&self, name: &str) -> Result<Arc<EntityMetadata>, AppError> {
        if let Some(meta) = self.cache.get(name) {
            return Ok(meta);
        }
        let epoch = self.cache.epoch();
        let meta = Arc::new(self.catalog.resolve(name, epoch).await?);
        self.cache.put(name, meta.clone(), epoch);
        Ok(meta)
    }

    pub async fn list_entities(&self) -> Result<Vec<EntitySummary>, AppError> {
        self.catalog.list_entities().await
    }

    pub async fn describe(&self, name: &str) -> Result<EntityDescription, AppError> {
        let meta = self.resolve_metadata(name).await?;
        let graph = derive_relationships(&meta.units);
        let order = order_units(&meta.member_units, &graph.relationships);
        Ok(EntityDescription {
            metadata: meta.as_ref().clone(),
            relationships: graph.relationships,
            ambiguities: graph.ambiguities,
            insert_order: order.insert_order,
            degraded: order.degraded,
        })
    }

    /// Forget `name` (and composites built on it) after a structural change.
    pub fn invalidate(&self, name: &str) {
        self.cache.invalidate(name);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        self.store.ping().await
    }
}

/// Commit on success; roll back on failure and return the original error.
pub(crate) async fn finish<T>(tx: Box<dyn StoreTx>, outcome: Result<T, AppError>) -> Result<T, AppError> {
    match outcome {
        Ok(v) => {
            tx.commit().await?;
            Ok(v)
        }
        Err(e) => {
            tracing::warn!(error = %e, "rolling back");
            if let Err(rb) = tx.rollback().await {
                tracing::warn!(error = %rb, "rollback failed");
            }
            Err(e)
        }
    }
}
