use crate::handlers::catalog::invalidate;
use crate::state::AppState;
use axum::{routing::post, Router};

pub fn catalog_routes(state: AppState) -> Router {
    Router::new()
        .route("/catalog/invalidate", post(invalidate))
        .with_state(state)
}
