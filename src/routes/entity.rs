//! Entity routes. Entities are addressed by catalog name; handlers resolve metadata per request.

use crate::handlers::entity::{delete as delete_handler, describe, get_by_key, insert, list_entities, query, update};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/entities", get(list_entities))
        .route("/entities/:name", post(insert).delete(delete_handler))
        .route("/entities/:name/metadata", get(describe))
        .route("/entities/:name/query", post(query))
        .route("/entities/:name/:key", get(get_by_key).patch(update))
        .with_state(state)
}
