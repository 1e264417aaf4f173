//! Kind-agnostic handler plumbing shared by the plugin and theme routes.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::Multipart;
use serde::Deserialize;
use serde_json::Value;
use tokio::fs;
use tracing::info;
use vellum_core::extension_system::registry::DeleteOptions;
use vellum_core::extension_system::{ExtensionKind, ExtensionManager, ExtensionRegistry};
use vellum_core::HydratedExtension;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn registry_for(state: &AppState, kind: ExtensionKind) -> Arc<ExtensionRegistry> {
    match kind {
        ExtensionKind::Plugin => Arc::clone(state.extensions().plugins()),
        ExtensionKind::Theme => Arc::clone(state.extensions().themes()),
    }
}

/// Delete flags accepted in the query string, in both snake and camel
/// case for older clients.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default, alias = "deleteFiles")]
    pub files: bool,
    #[serde(default, alias = "deleteData")]
    pub data: bool,
}

impl From<DeleteQuery> for DeleteOptions {
    fn from(query: DeleteQuery) -> Self {
        DeleteOptions {
            delete_files: query.files,
            delete_data: query.data,
        }
    }
}

/// Pull the uploaded archive out of a multipart body. The field must be
/// named after the extension kind (`plugin` or `theme`).
pub async fn save_upload(
    state: &AppState,
    kind: ExtensionKind,
    multipart: &mut Multipart,
) -> ApiResult<PathBuf> {
    fs::create_dir_all(&state.uploads_dir)
        .await
        .map_err(|e| ApiError::internal(format!("preparing uploads dir: {e}")))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some(kind.label()) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("reading upload: {e}")))?;
        if bytes.is_empty() {
            return Err(ApiError::bad_request("uploaded file is empty"));
        }

        let file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".zip")
            .tempfile_in(&state.uploads_dir)
            .map_err(|e| ApiError::internal(format!("staging upload: {e}")))?;
        let (_, path) = file
            .keep()
            .map_err(|e| ApiError::internal(format!("staging upload: {e}")))?;
        fs::write(&path, &bytes)
            .await
            .map_err(|e| ApiError::internal(format!("writing upload: {e}")))?;
        return Ok(path);
    }

    Err(ApiError::bad_request(format!(
        "no file uploaded under field '{}'",
        kind.label()
    )))
}

pub async fn install(state: &AppState, kind: ExtensionKind, mut multipart: Multipart) -> ApiResult<HydratedExtension> {
    let archive = save_upload(state, kind, &mut multipart).await?;
    let registry = registry_for(state, kind);
    let extension = registry.install_from_archive(&archive).await?;
    info!("{} '{}' installed", kind, extension.slug);
    state.refresh_runtime().await?;
    Ok(extension)
}

/// Re-scan the extensions root and register anything new, then return
/// the refreshed listing.
pub async fn bootstrap(state: &AppState, kind: ExtensionKind) -> ApiResult<Vec<HydratedExtension>> {
    let registry = registry_for(state, kind);
    registry.bootstrap_from_disk().await?;
    state.refresh_runtime().await?;
    Ok(registry.list().await?)
}

pub async fn activate(state: &AppState, kind: ExtensionKind, slug: &str) -> ApiResult<HydratedExtension> {
    let extension = registry_for(state, kind).activate(slug).await?;
    info!("{} '{}' activated", kind, slug);
    state.refresh_runtime().await?;
    Ok(extension)
}

pub async fn deactivate(state: &AppState, kind: ExtensionKind, slug: &str) -> ApiResult<HydratedExtension> {
    let extension = registry_for(state, kind).deactivate(slug).await?;
    info!("{} '{}' deactivated", kind, slug);
    state.refresh_runtime().await?;
    Ok(extension)
}

pub async fn save_settings(
    state: &AppState,
    kind: ExtensionKind,
    slug: &str,
    settings: Value,
) -> ApiResult<HydratedExtension> {
    if !settings.is_object() {
        return Err(ApiError::bad_request("settings must be a JSON object"));
    }
    let extension = registry_for(state, kind).save_settings(slug, &settings).await?;
    state.refresh_runtime().await?;
    Ok(extension)
}

pub async fn delete(state: &AppState, kind: ExtensionKind, slug: &str, query: DeleteQuery) -> ApiResult<()> {
    registry_for(state, kind).delete(slug, query.into()).await?;
    info!("{} '{}' deleted", kind, slug);
    state.refresh_runtime().await?;
    Ok(())
}
