//! Plugin admin and dispatch routes.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::Method;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use vellum_core::extension_system::{ExtensionKind, ExtensionManager, ExtensionRequest};
use vellum_core::HydratedExtension;

use crate::error::{ApiError, ApiResult};
use crate::routes::common::{self, DeleteQuery};
use crate::state::AppState;

const KIND: ExtensionKind = ExtensionKind::Plugin;

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<HydratedExtension>>> {
    let plugins = common::registry_for(&state, KIND).list().await?;
    Ok(Json(plugins))
}

pub async fn get(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<HydratedExtension>> {
    let plugin = common::registry_for(&state, KIND).get(&slug).await?;
    Ok(Json(plugin))
}

pub async fn install(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<HydratedExtension>> {
    Ok(Json(common::install(&state, KIND, multipart).await?))
}

pub async fn bootstrap(State(state): State<AppState>) -> ApiResult<Json<Vec<HydratedExtension>>> {
    Ok(Json(common::bootstrap(&state, KIND).await?))
}

pub async fn activate(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<HydratedExtension>> {
    Ok(Json(common::activate(&state, KIND, &slug).await?))
}

pub async fn deactivate(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<HydratedExtension>> {
    Ok(Json(common::deactivate(&state, KIND, &slug).await?))
}

pub async fn save_settings(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(settings): Json<Value>,
) -> ApiResult<Json<HydratedExtension>> {
    Ok(Json(common::save_settings(&state, KIND, &slug, settings).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<Json<Value>> {
    common::delete(&state, KIND, &slug, query).await?;
    Ok(Json(json!({ "ok": true })))
}

/// Forward a request under `/api/plugins/{slug}/...` into the route
/// bridge. Bodies are parsed as JSON when present; anything else is an
/// immediate 400 since extension routes speak JSON only.
pub async fn dispatch(
    State(state): State<AppState>,
    Path((slug, rest)): Path<(String, String)>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> ApiResult<axum::response::Response> {
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("request body is not valid JSON: {e}")))?
    };

    let request = ExtensionRequest {
        method: method.to_string(),
        path: format!("/{rest}"),
        query,
        body,
    };

    let response = state
        .extensions()
        .route_bridge()
        .dispatch(&slug, request)
        .await?;

    let status = axum::http::StatusCode::from_u16(response.status)
        .map_err(|_| ApiError::internal("extension returned an invalid status code"))?;
    Ok((status, Json(response.body)).into_response())
}
