//! Entity handlers: metadata, query, insert, read by key, update, delete.

use crate::catalog::EntityMetadata;
use crate::error::AppError;
use crate::response::{success_many, success_one, success_one_ok, success_rows};
use crate::service::{FieldMap, FileMap};
use crate::sql::ReadRequest;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::Value;

fn body_to_map(value: Value) -> Result<FieldMap, AppError> {
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// Path segments arrive as text; integer and boolean columns get typed values.
fn key_value_for_column(meta: &EntityMetadata, column: &str, s: &str) -> Value {
    let cast = meta.column(column).and_then(|c| c.cast_type.as_deref()).unwrap_or("");
    match cast {
        "int2" | "int4" | "int8" => s
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(s.to_string())),
        "bool" if s.eq_ignore_ascii_case("true") => Value::Bool(true),
        "bool" if s.eq_ignore_ascii_case("false") => Value::Bool(false),
        "uuid" => uuid::Uuid::parse_str(s)
            .map(|u| Value::String(u.to_string()))
            .unwrap_or_else(|_| Value::String(s.to_string())),
        _ => Value::String(s.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyColumnQuery {
    pub key_column: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkColumnQuery {
    pub pk_column: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBody {
    #[serde(default)]
    pub pk_column: Option<String>,
    pub pk_values: Vec<Value>,
}

pub async fn list_entities(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let entities = state.service.list_entities().await?;
    Ok(success_many(entities))
}

pub async fn describe(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let description = state.service.describe(&name).await?;
    Ok(success_one_ok(description))
}

pub async fn query(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ReadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.service.query(&name, &req).await?;
    Ok(success_rows(result.rows, result.columns))
}

pub async fn insert(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let data = body_to_map(body)?;
    let result = state.service.insert(&name, &data, &FileMap::new()).await?;
    Ok(success_one(result))
}

pub async fn get_by_key(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
    Query(q): Query<KeyColumnQuery>,
) -> Result<impl IntoResponse, AppError> {
    let meta = state.service.resolve_metadata(&name).await?;
    let column = q.key_column.as_deref().unwrap_or(&meta.primary_key);
    let key_value = key_value_for_column(&meta, column, &key);
    let row = state
        .service
        .get_by_key(&name, q.key_column.as_deref(), &key_value)
        .await?;
    Ok(success_one_ok(row))
}

pub async fn update(
    State(state): State<AppState>,
    Path((name, key)): Path<(String, String)>,
    Query(q): Query<PkColumnQuery>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let data = body_to_map(body)?;
    let meta = state.service.resolve_metadata(&name).await?;
    let column = q.pk_column.as_deref().unwrap_or(&meta.primary_key);
    let pk_value = key_value_for_column(&meta, column, &key);
    let result = state
        .service
        .update(&name, q.pk_column.as_deref(), &pk_value, &data, &FileMap::new())
        .await?;
    Ok(success_one_ok(result))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<DeleteBody>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .service
        .delete(&name, body.pk_column.as_deref(), &body.pk_values)
        .await?;
    Ok(success_one_ok(result))
}
