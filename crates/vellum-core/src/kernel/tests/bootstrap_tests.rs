use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use crate::extension_system::error::ExtResult;
use crate::extension_system::manager::ExtensionManager;
use crate::extension_system::module::{ExtensionModule, ModuleLoader};
use crate::extension_system::store::{MemoryContentRepository, MemoryRegistrationStore};
use crate::kernel::bootstrap::{Application, ApplicationConfig};
use crate::kernel::error::{Error, LifecyclePhase};

/// Loader for descriptor-only fixtures.
struct NullModuleLoader;

impl ModuleLoader for NullModuleLoader {
    fn load(&self, _dir: &Path) -> ExtResult<Option<Arc<dyn ExtensionModule>>> {
        Ok(None)
    }
}

fn test_config(plugins_root: &Path, themes_root: &Path) -> ApplicationConfig {
    ApplicationConfig {
        plugins_root: plugins_root.to_path_buf(),
        themes_root: themes_root.to_path_buf(),
        plugin_store: Arc::new(MemoryRegistrationStore::new()),
        theme_store: Arc::new(MemoryRegistrationStore::new()),
        repository: Arc::new(MemoryContentRepository::new()),
        module_loader: Arc::new(NullModuleLoader),
    }
}

#[tokio::test]
async fn start_creates_roots_and_bootstraps_registries() {
    let base = tempdir().unwrap();
    let plugins_root = base.path().join("plugins");
    let themes_root = base.path().join("themes");

    // Seed one plugin and one theme before the roots formally exist.
    std::fs::create_dir_all(plugins_root.join("hello")).unwrap();
    std::fs::write(
        plugins_root.join("hello/plugin.json"),
        json!({ "slug": "hello" }).to_string(),
    )
    .unwrap();
    std::fs::create_dir_all(themes_root.join("mint")).unwrap();
    std::fs::write(
        themes_root.join("mint/theme.json"),
        json!({ "slug": "mint" }).to_string(),
    )
    .unwrap();

    let app = Application::new(test_config(&plugins_root, &themes_root)).unwrap();
    app.start().await.unwrap();

    let extensions = app.extensions();
    let plugins = extensions.plugins().list().await.unwrap();
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].slug, "hello");
    assert!(!plugins[0].is_active);

    let active_theme = extensions.themes().get_active().await.unwrap().unwrap();
    assert_eq!(active_theme.slug, "mint");

    app.shutdown().await;
}

#[tokio::test]
async fn start_with_empty_roots_is_fine() {
    let base = tempdir().unwrap();
    let plugins_root = base.path().join("plugins");
    let themes_root = base.path().join("themes");

    let app = Application::new(test_config(&plugins_root, &themes_root)).unwrap();
    app.start().await.unwrap();

    assert!(plugins_root.is_dir());
    assert!(themes_root.is_dir());
    assert!(app.extensions().plugins().list().await.unwrap().is_empty());
    assert!(app.extensions().themes().get_active().await.unwrap().is_none());
}

#[tokio::test]
async fn start_twice_does_not_duplicate_registrations() {
    let base = tempdir().unwrap();
    let plugins_root = base.path().join("plugins");
    let themes_root = base.path().join("themes");
    std::fs::create_dir_all(plugins_root.join("once")).unwrap();
    std::fs::write(
        plugins_root.join("once/plugin.json"),
        json!({ "slug": "once" }).to_string(),
    )
    .unwrap();

    let app = Application::new(test_config(&plugins_root, &themes_root)).unwrap();
    app.start().await.unwrap();
    app.start().await.unwrap();

    assert_eq!(app.extensions().plugins().list().await.unwrap().len(), 1);
}

#[test]
fn lifecycle_error_carries_component_and_phase() {
    let inner = Error::Other("boom".to_string());
    let err = Error::lifecycle(LifecyclePhase::Start, "ExtensionManager", inner);
    let rendered = err.to_string();
    assert!(rendered.contains("Start"));
    assert!(rendered.contains("ExtensionManager"));
    assert!(rendered.contains("boom"));
}
