//! Shared request state.

use std::path::PathBuf;
use std::sync::Arc;

use vellum_core::extension_system::{DefaultExtensionManager, ExtensionManager};
use vellum_core::Application;

use crate::error::ApiResult;

#[derive(Clone)]
pub struct AppState {
    pub app: Arc<Application>,
    pub uploads_dir: PathBuf,
    pub api_token: Option<String>,
}

impl AppState {
    pub fn extensions(&self) -> &Arc<DefaultExtensionManager> {
        self.app.extensions()
    }

    /// Bring runtime surfaces in line after a lifecycle change: mount
    /// any newly declared routes and rebuild the client pipeline.
    pub async fn refresh_runtime(&self) -> ApiResult<()> {
        let extensions = self.extensions();
        extensions.mount_routes().await?;
        extensions.rebuild_client_pipeline().await?;
        Ok(())
    }
}
