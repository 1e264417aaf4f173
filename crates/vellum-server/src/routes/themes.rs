//! Theme admin routes.

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde_json::{json, Value};
use vellum_core::extension_system::ExtensionKind;
use vellum_core::HydratedExtension;

use crate::error::{ApiError, ApiResult};
use crate::routes::common::{self, DeleteQuery};
use crate::state::AppState;

const KIND: ExtensionKind = ExtensionKind::Theme;

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<HydratedExtension>>> {
    let themes = common::registry_for(&state, KIND).list().await?;
    Ok(Json(themes))
}

pub async fn get_active(State(state): State<AppState>) -> ApiResult<Json<HydratedExtension>> {
    common::registry_for(&state, KIND)
        .get_active()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("no active theme"))
}

pub async fn get(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<HydratedExtension>> {
    let theme = common::registry_for(&state, KIND).get(&slug).await?;
    Ok(Json(theme))
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
