use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use super::{TestModule, TestModuleLoader};
use crate::extension_system::error::ExtensionSystemError;
use crate::extension_system::kind::ExtensionKind;
use crate::extension_system::loader::ManifestLoader;

#[tokio::test]
async fn module_manifest_wins_over_descriptor() {
    let root = tempdir().unwrap();
    let dir = root.path().join("dual");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(ExtensionKind::Plugin.descriptor_file()),
        json!({ "slug": "from-descriptor", "name": "Descriptor" }).to_string(),
    )
    .unwrap();

    let modules = TestModuleLoader::new();
    modules.put(
        "dual",
        Arc::new(TestModule::new(json!({ "slug": "from-module", "name": "Module" }))),
    );
    let loader = ManifestLoader::new(ExtensionKind::Plugin, Arc::new(modules));

    let loaded = loader.load(&dir, None).await.unwrap();
    assert_eq!(loaded.manifest.slug, "from-module");
    assert!(loaded.module.is_some());
}

#[tokio::test]
async fn descriptor_used_when_no_module_ships() {
    let root = tempdir().unwrap();
    let dir = root.path().join("plain");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(ExtensionKind::Theme.descriptor_file()),
        json!({ "slug": "plain", "settings": { "accent": "#336699" } }).to_string(),
    )
    .unwrap();

    let loader = ManifestLoader::new(ExtensionKind::Theme, Arc::new(TestModuleLoader::new()));
    let loaded = loader.load(&dir, None).await.unwrap();
    assert_eq!(loaded.manifest.slug, "plain");
    assert!(loaded.module.is_none());
    assert_eq!(loaded.manifest.settings.get("accent"), Some(&json!("#336699")));
}

#[tokio::test]
async fn fallback_snapshot_rescues_a_missing_dir() {
    let root = tempdir().unwrap();
    let dir = root.path().join("ghost");

    let loader = ManifestLoader::new(ExtensionKind::Plugin, Arc::new(TestModuleLoader::new()));
    let snapshot = json!({ "slug": "ghost", "name": "Stored Copy" });
    let loaded = loader.load(&dir, Some(&snapshot)).await.unwrap();
    assert_eq!(loaded.manifest.slug, "ghost");
    assert_eq!(loaded.manifest.name.as_deref(), Some("Stored Copy"));
}

#[tokio::test]
async fn nothing_anywhere_is_an_error() {
    let root = tempdir().unwrap();
    let dir = root.path().join("void");

    let loader = ManifestLoader::new(ExtensionKind::Plugin, Arc::new(TestModuleLoader::new()));
    let err = loader.load(&dir, None).await.unwrap_err();
    assert!(matches!(err, ExtensionSystemError::Manifest { .. }));
}

#[tokio::test]
async fn malformed_descriptor_propagates() {
    let root = tempdir().unwrap();
    let dir = root.path().join("bad");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(ExtensionKind::Plugin.descriptor_file()), "{ nope").unwrap();

    let loader = ManifestLoader::new(ExtensionKind::Plugin, Arc::new(TestModuleLoader::new()));
    let err = loader.load(&dir, None).await.unwrap_err();
    assert!(matches!(err, ExtensionSystemError::Manifest { .. }));
}

#[tokio::test]
async fn broken_module_propagates_even_with_descriptor() {
    let root = tempdir().unwrap();
    let dir = root.path().join("cracked");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(ExtensionKind::Plugin.descriptor_file()),
        json!({ "slug": "cracked" }).to_string(),
    )
    .unwrap();

    let modules = TestModuleLoader::new();
    modules.fail_for("cracked");
    let loader = ManifestLoader::new(ExtensionKind::Plugin, Arc::new(modules));

    let err = loader.load(&dir, None).await.unwrap_err();
    assert!(matches!(err, ExtensionSystemError::ModuleLoad { .. }));
}
