//! Routers: common (health, readiness, version), entities, catalog maintenance.

mod catalog;
mod common;
mod entity;

pub use catalog::catalog_routes;
pub use common::common_routes_with_ready;
pub use entity::entity_routes;

use crate::state::AppState;
use axum::Router;

/// Every route the server exposes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .merge(entity_routes(state.clone()))
        .merge(catalog_routes(state))
}
