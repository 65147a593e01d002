//! Metadata cache invalidation, called by collaborators after structural changes.

use crate::error::AppError;
use crate::response::success_one_ok;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct InvalidateBody {
    /// Entity to forget; absent clears the whole cache.
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn invalidate(
    State(state): State<AppState>,
    Json(body): Json<InvalidateBody>,
) -> Result<impl IntoResponse, AppError> {
    match body.name.as_deref() {
        Some(name) => state.service.invalidate(name),
        None => state.service.invalidate_all(),
    }
    Ok(success_one_ok(serde_json::json!({ "invalidated": body.name.as_deref().unwrap_or("*") })))
}
