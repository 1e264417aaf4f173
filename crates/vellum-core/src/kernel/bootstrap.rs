//! Application bootstrap.
//!
//! [`Application`] is the explicit owned context object for a Vellum
//! process: it holds every kernel component and drives them through their
//! lifecycle. Request handlers receive it (behind an `Arc`) instead of
//! reaching for ambient module state.

use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};

use crate::extension_system::manager::DefaultExtensionManager;
use crate::extension_system::module::ModuleLoader;
use crate::extension_system::store::{ContentRepository, RegistrationStore};
use crate::kernel::component::KernelComponent;
use crate::kernel::error::{Error, LifecyclePhase, Result};

/// Everything the application needs from its embedder: where extension
/// packages live and the collaborator implementations backing persistence.
pub struct ApplicationConfig {
    pub plugins_root: PathBuf,
    pub themes_root: PathBuf,
    pub plugin_store: Arc<dyn RegistrationStore>,
    pub theme_store: Arc<dyn RegistrationStore>,
    pub repository: Arc<dyn ContentRepository>,
    pub module_loader: Arc<dyn ModuleLoader>,
}

/// The owned application context.
pub struct Application {
    extensions: Arc<DefaultExtensionManager>,
    components: Vec<Arc<dyn KernelComponent>>,
}

impl Application {
    /// Build the application context. Components are constructed here but
    /// not touched until [`Application::start`].
    pub fn new(config: ApplicationConfig) -> Result<Self> {
        let extensions = Arc::new(DefaultExtensionManager::new(
            config.plugins_root,
            config.themes_root,
            config.plugin_store,
            config.theme_store,
            config.repository,
            config.module_loader,
        ));

        let components: Vec<Arc<dyn KernelComponent>> = vec![extensions.clone()];

        Ok(Self {
            extensions,
            components,
        })
    }

    /// The extension manager component.
    pub fn extensions(&self) -> &Arc<DefaultExtensionManager> {
        &self.extensions
    }

    /// Initialize then start every component, in registration order.
    pub async fn start(&self) -> Result<()> {
        for component in &self.components {
            info!("initializing component: {}", component.name());
            component
                .initialize()
                .await
                .map_err(|e| Error::lifecycle(LifecyclePhase::Initialize, component.name(), e))?;
        }
        for component in &self.components {
            info!("starting component: {}", component.name());
            component
                .start()
                .await
                .map_err(|e| Error::lifecycle(LifecyclePhase::Start, component.name(), e))?;
        }
        Ok(())
    }

    /// Stop components in reverse order. Failures are logged, not
    /// propagated, so one broken component cannot block shutdown.
    pub async fn shutdown(&self) {
        for component in self.components.iter().rev() {
            if let Err(e) = component.stop().await {
                error!("failed to stop component {}: {}", component.name(), e);
            }
        }
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("components", &self.components.len())
            .finish_non_exhaustive()
    }
}
