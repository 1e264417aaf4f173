//! Extension manager component.
//!
//! Owns the plugin and theme registries, the route bridge and the
//! client pipeline, and drives them through the kernel lifecycle:
//! initialize ensures the extension roots exist, start bootstraps both
//! registries from disk, runs the first mount pass and builds the
//! pipeline.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use tokio::fs;
use tokio::sync::RwLock;

use crate::extension_system::bridge::RouteBridge;
use crate::extension_system::client::ClientPipeline;
use crate::extension_system::error::{ExtResult, ExtensionSystemError};
use crate::extension_system::kind::ExtensionKind;
use crate::extension_system::module::ModuleLoader;
use crate::extension_system::registry::ExtensionRegistry;
use crate::extension_system::store::{ContentRepository, RegistrationStore};
use crate::kernel::component::KernelComponent;
use crate::kernel::error::{Error as KernelError, Result as KernelResult};

/// Host-facing facade over both extension registries.
#[async_trait]
pub trait ExtensionManager: KernelComponent {
    fn plugins(&self) -> &Arc<ExtensionRegistry>;
    fn themes(&self) -> &Arc<ExtensionRegistry>;
    fn route_bridge(&self) -> &Arc<RouteBridge>;

    /// The current client pipeline snapshot.
    async fn client_pipeline(&self) -> Arc<ClientPipeline>;

    /// Recompute the client pipeline from the active extensions.
    async fn rebuild_client_pipeline(&self) -> ExtResult<()>;

    /// Run a route mount pass over the plugin registry.
    async fn mount_routes(&self) -> ExtResult<()>;
}

pub struct DefaultExtensionManager {
    plugins: Arc<ExtensionRegistry>,
    themes: Arc<ExtensionRegistry>,
    bridge: Arc<RouteBridge>,
    pipeline: RwLock<Arc<ClientPipeline>>,
}

impl std::fmt::Debug for DefaultExtensionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultExtensionManager")
            .field("plugins", &self.plugins)
            .field("themes", &self.themes)
            .finish()
    }
}

impl DefaultExtensionManager {
    pub fn new(
        plugins_root: PathBuf,
        themes_root: PathBuf,
        plugin_store: Arc<dyn RegistrationStore>,
        theme_store: Arc<dyn RegistrationStore>,
        repository: Arc<dyn ContentRepository>,
        module_loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        let plugins = Arc::new(ExtensionRegistry::new(
            ExtensionKind::Plugin,
            plugins_root,
            plugin_store,
            Arc::clone(&repository),
            Arc::clone(&module_loader),
        ));
        let themes = Arc::new(ExtensionRegistry::new(
            ExtensionKind::Theme,
            themes_root,
            theme_store,
            repository,
            module_loader,
        ));
        let bridge = Arc::new(RouteBridge::new(Arc::clone(&plugins)));
        Self {
            plugins,
            themes,
            bridge,
            pipeline: RwLock::new(Arc::new(ClientPipeline::default())),
        }
    }
}

#[async_trait]
impl ExtensionManager for DefaultExtensionManager {
    fn plugins(&self) -> &Arc<ExtensionRegistry> {
        &self.plugins
    }

    fn themes(&self) -> &Arc<ExtensionRegistry> {
        &self.themes
    }

    fn route_bridge(&self) -> &Arc<RouteBridge> {
        &self.bridge
    }

    async fn client_pipeline(&self) -> Arc<ClientPipeline> {
        Arc::clone(&*self.pipeline.read().await)
    }

    async fn rebuild_client_pipeline(&self) -> ExtResult<()> {
        let rebuilt = ClientPipeline::build(&[self.plugins.as_ref(), self.themes.as_ref()]).await?;
        *self.pipeline.write().await = Arc::new(rebuilt);
        Ok(())
    }

    async fn mount_routes(&self) -> ExtResult<()> {
        self.bridge.mount_pass().await
    }
}

#[async_trait]
impl KernelComponent for DefaultExtensionManager {
    fn name(&self) -> &'static str {
        "ExtensionManager"
    }

    async fn initialize(&self) -> KernelResult<()> {
        for root in [self.plugins.root(), self.themes.root()] {
            fs::create_dir_all(root).await.map_err(|e| {
                KernelError::from(ExtensionSystemError::io(
                    e,
                    "creating extensions root",
                    root.to_path_buf(),
                ))
            })?;
        }
        Ok(())
    }

    async fn start(&self) -> KernelResult<()> {
        self.plugins.bootstrap_from_disk().await?;
        self.themes.bootstrap_from_disk().await?;
        self.mount_routes().await?;
        self.rebuild_client_pipeline().await?;
        info!(
            "extension manager started: {} route slug(s) mounted",
            self.bridge.mounted_slugs().await.len()
        );
        Ok(())
    }

    async fn stop(&self) -> KernelResult<()> {
        Ok(())
    }
}

// KernelComponent requires Any; keep downcasting available to embedders.
impl DefaultExtensionManager {
    pub fn as_any(&self) -> &dyn Any {
        self
    }
}
