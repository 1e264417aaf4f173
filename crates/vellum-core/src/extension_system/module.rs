//! The extension capability interface.
//!
//! [`ExtensionModule`] is the seam between the host and third-party code:
//! the registry, the route bridge and the client pipeline depend only on
//! this trait, never on how the module was loaded. Production modules are
//! dynamic libraries loaded through [`crate::extension_system::ffi`];
//! tests and built-ins implement the trait in-process.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extension_system::error::{ExtResult, ExtensionSystemError};
use crate::extension_system::manifest::ExtensionManifest;
use crate::extension_system::record::HydratedExtension;
use crate::extension_system::store::ContentRepository;

/// A request dispatched to an extension route handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionRequest {
    pub method: String,
    /// Path relative to the extension's namespace, always starting with `/`.
    pub path: String,
    #[serde(default)]
    pub query: HashMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

/// The response an extension route handler produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionResponse {
    pub status: u16,
    pub body: Value,
}

impl ExtensionResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }
}

/// Options for script injection.
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectOptions {
    /// Whether admin-only scripts should be considered.
    pub include_admin: bool,
}

/// Behavior an extension package contributes at runtime.
///
/// Every capability except the manifest is optional; defaults report the
/// capability as unsupported so hosts can probe without special-casing.
#[async_trait]
pub trait ExtensionModule: Send + Sync {
    /// The manifest exported by this module.
    fn manifest(&self) -> ExtResult<ExtensionManifest>;

    /// Idempotent setup hook, run before the extension is activated.
    async fn on_install(&self, _repo: &dyn ContentRepository) -> ExtResult<()> {
        Ok(())
    }

    /// Cleanup hook, run during delete when data removal was requested.
    async fn on_uninstall(&self, _repo: &dyn ContentRepository) -> ExtResult<()> {
        Ok(())
    }

    /// Serve one of the routes declared in the manifest.
    async fn handle_route(&self, request: ExtensionRequest) -> ExtResult<ExtensionResponse> {
        let _ = request;
        Err(self.not_supported("handle_route"))
    }

    /// Render a shortcode declared in `client.shortcodes`.
    fn render_shortcode(&self, name: &str, attrs: &Map<String, Value>, context: &Value) -> ExtResult<String> {
        let _ = (name, attrs, context);
        Err(self.not_supported("render_shortcode"))
    }

    /// Render a custom content element declared in `client.elements`.
    fn render_element(&self, element: &Value, context: &Value) -> ExtResult<String> {
        let _ = (element, context);
        Err(self.not_supported("render_element"))
    }

    /// Produce a patch for the shared extension-data bag, consulted
    /// before content is rendered.
    async fn load_client_data(&self, content: &Value, layout: &Value, context: &Value) -> ExtResult<Value> {
        let _ = (content, layout, context);
        Ok(Value::Null)
    }

    /// Conditionally inject external scripts; returns whether anything
    /// was injected.
    fn inject_scripts(&self, extension: &HydratedExtension, options: InjectOptions) -> bool {
        let _ = (extension, options);
        false
    }

    #[doc(hidden)]
    fn not_supported(&self, operation: &str) -> ExtensionSystemError {
        let slug = self.manifest().map(|m| m.slug).unwrap_or_default();
        ExtensionSystemError::NotSupported {
            slug,
            operation: operation.to_string(),
        }
    }
}

/// Maps an extension directory to a loaded module handle.
///
/// `Ok(None)` means the directory ships no module (a descriptor-only
/// package); an unreadable or broken module is an error so callers can
/// decide whether to skip or abort.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, dir: &Path) -> ExtResult<Option<Arc<dyn ExtensionModule>>>;
}
