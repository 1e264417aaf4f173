pub mod bridge_tests;
pub mod loader_tests;
pub mod slug_tests;

// --- Shared test harness ---

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::extension_system::error::{ExtResult, ExtensionSystemError};
use crate::extension_system::kind::ExtensionKind;
use crate::extension_system::manifest::ExtensionManifest;
use crate::extension_system::module::{
    ExtensionModule, ExtensionRequest, ExtensionResponse, InjectOptions, ModuleLoader,
};
use crate::extension_system::record::HydratedExtension;
use crate::extension_system::registry::ExtensionRegistry;
use crate::extension_system::store::{ContentRepository, MemoryContentRepository, MemoryRegistrationStore};

/// Configurable in-process extension module.
pub(crate) struct TestModule {
    pub manifest: ExtensionManifest,
    pub fail_install: bool,
    pub fail_data_loader: bool,
    pub data_patch: Value,
    pub inject: bool,
    pub install_calls: AtomicUsize,
    pub uninstall_calls: AtomicUsize,
}

impl TestModule {
    pub fn new(manifest_json: Value) -> Self {
        Self {
            manifest: ExtensionManifest::from_value(manifest_json).unwrap(),
            fail_install: false,
            fail_data_loader: false,
            data_patch: Value::Null,
            inject: false,
            install_calls: AtomicUsize::new(0),
            uninstall_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ExtensionModule for TestModule {
    fn manifest(&self) -> ExtResult<ExtensionManifest> {
        Ok(self.manifest.clone())
    }

    async fn on_install(&self, repo: &dyn ContentRepository) -> ExtResult<()> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_install {
            return Err(ExtensionSystemError::Hook {
                slug: self.manifest.slug.clone(),
                operation: "install".to_string(),
                message: "install exploded".to_string(),
            });
        }
        repo.run(&format!("CREATE TABLE IF NOT EXISTS ext_{}", self.manifest.slug), &[])?;
        Ok(())
    }

    async fn on_uninstall(&self, repo: &dyn ContentRepository) -> ExtResult<()> {
        self.uninstall_calls.fetch_add(1, Ordering::SeqCst);
        repo.run(&format!("DROP TABLE IF EXISTS ext_{}", self.manifest.slug), &[])?;
        Ok(())
    }

    async fn handle_route(&self, request: ExtensionRequest) -> ExtResult<ExtensionResponse> {
        Ok(ExtensionResponse::ok(json!({
            "slug": self.manifest.slug,
            "method": request.method,
            "path": request.path,
        })))
    }

    fn render_shortcode(&self, name: &str, attrs: &Map<String, Value>, _context: &Value) -> ExtResult<String> {
        Ok(format!("[{}:{} attrs={}]", self.manifest.slug, name, attrs.len()))
    }

    fn render_element(&self, element: &Value, _context: &Value) -> ExtResult<String> {
        let kind = element.get("type").and_then(Value::as_str).unwrap_or("?");
        Ok(format!("<div data-ext=\"{}\">{}</div>", self.manifest.slug, kind))
    }

    async fn load_client_data(&self, _content: &Value, _layout: &Value, _context: &Value) -> ExtResult<Value> {
        if self.fail_data_loader {
            return Err(ExtensionSystemError::Ffi {
                slug: self.manifest.slug.clone(),
                operation: "load_data".to_string(),
                message: "loader exploded".to_string(),
            });
        }
        Ok(self.data_patch.clone())
    }

    fn inject_scripts(&self, _extension: &HydratedExtension, _options: InjectOptions) -> bool {
        self.inject
    }
}

/// Module loader keyed by directory name, so tests can hand a module to
/// `{root}/{slug}` without compiling anything.
#[derive(Default)]
pub(crate) struct TestModuleLoader {
    modules: StdMutex<HashMap<String, Arc<dyn ExtensionModule>>>,
    pub fail_dirs: StdMutex<Vec<String>>,
}

impl TestModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, dir_name: &str, module: Arc<dyn ExtensionModule>) {
        self.modules
            .lock()
            .unwrap()
            .insert(dir_name.to_string(), module);
    }

    pub fn fail_for(&self, dir_name: &str) {
        self.fail_dirs.lock().unwrap().push(dir_name.to_string());
    }
}

impl ModuleLoader for TestModuleLoader {
    fn load(&self, dir: &Path) -> ExtResult<Option<Arc<dyn ExtensionModule>>> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if self.fail_dirs.lock().unwrap().contains(&name) {
            return Err(ExtensionSystemError::ModuleLoad {
                path: dir.to_path_buf(),
                message: "broken module".to_string(),
            });
        }
        Ok(self.modules.lock().unwrap().get(&name).cloned())
    }
}

/// Write a descriptor file, creating the extension directory.
pub(crate) fn write_descriptor(root: &Path, slug: &str, kind: ExtensionKind, manifest: &Value) {
    let dir = root.join(slug);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(kind.descriptor_file()),
        serde_json::to_string_pretty(manifest).unwrap(),
    )
    .unwrap();
}

pub(crate) struct TestRegistry {
    pub registry: Arc<ExtensionRegistry>,
    pub store: Arc<MemoryRegistrationStore>,
    pub repo: Arc<MemoryContentRepository>,
    pub loader: Arc<TestModuleLoader>,
}

pub(crate) fn make_registry(kind: ExtensionKind, root: &Path) -> TestRegistry {
    let store = Arc::new(MemoryRegistrationStore::new());
    let repo = Arc::new(MemoryContentRepository::new());
    let loader = Arc::new(TestModuleLoader::new());
    let registry = Arc::new(ExtensionRegistry::new(
        kind,
        root.to_path_buf(),
        store.clone(),
        repo.clone(),
        loader.clone(),
    ));
    TestRegistry {
        registry,
        store,
        repo,
        loader,
    }
}
