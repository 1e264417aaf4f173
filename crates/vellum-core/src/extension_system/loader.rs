//! Manifest loading.
//!
//! Resolves the effective manifest for one extension directory. The
//! precedence chain: a manifest exported by a loaded module wins over
//! the JSON descriptor file, and a stored fallback snapshot fills any
//! gaps (or substitutes wholesale when nothing on disk is readable).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::fs;

use crate::extension_system::error::{ExtResult, ExtensionSystemError};
use crate::extension_system::kind::ExtensionKind;
use crate::extension_system::manifest::{merge_with_fallback, ExtensionManifest};
use crate::extension_system::module::{ExtensionModule, ModuleLoader};

/// The outcome of loading one extension directory.
pub struct LoadedManifest {
    pub manifest: ExtensionManifest,
    /// The loaded module, when the directory ships one.
    pub module: Option<Arc<dyn ExtensionModule>>,
    pub dir: PathBuf,
}

impl std::fmt::Debug for LoadedManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedManifest")
            .field("slug", &self.manifest.slug)
            .field("has_module", &self.module.is_some())
            .field("dir", &self.dir)
            .finish()
    }
}

/// Loads manifests for one extension kind.
pub struct ManifestLoader {
    kind: ExtensionKind,
    module_loader: Arc<dyn ModuleLoader>,
}

impl std::fmt::Debug for ManifestLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestLoader").field("kind", &self.kind).finish()
    }
}

impl ManifestLoader {
    pub fn new(kind: ExtensionKind, module_loader: Arc<dyn ModuleLoader>) -> Self {
        Self { kind, module_loader }
    }

    /// Load the manifest for `dir`, preferring the module's exported
    /// manifest over the descriptor file and filling gaps from
    /// `fallback` (the stored snapshot).
    ///
    /// A present-but-broken module or descriptor is an error; callers
    /// that want to tolerate it (bulk listing) catch and skip.
    pub async fn load(&self, dir: &Path, fallback: Option<&Value>) -> ExtResult<LoadedManifest> {
        let module = self.module_loader.load(dir)?;

        let disk_manifest = match &module {
            Some(module) => Some(module.manifest()?.to_value()),
            None => self.read_descriptor(dir).await?,
        };

        let merged = merge_with_fallback(disk_manifest, fallback).ok_or_else(|| {
            ExtensionSystemError::Manifest {
                path: dir.to_path_buf(),
                message: format!("no {} manifest found", self.kind),
                source: None,
            }
        })?;

        let manifest = ExtensionManifest::from_value(merged).map_err(|e| {
            ExtensionSystemError::Manifest {
                path: dir.to_path_buf(),
                message: "manifest rejected".to_string(),
                source: Some(Box::new(e)),
            }
        })?;

        Ok(LoadedManifest {
            manifest,
            module,
            dir: dir.to_path_buf(),
        })
    }

    async fn read_descriptor(&self, dir: &Path) -> ExtResult<Option<Value>> {
        let path = dir.join(self.kind.descriptor_file());
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ExtensionSystemError::io(e, "reading descriptor", path)),
        };
        let value = serde_json::from_str(&raw).map_err(|e| ExtensionSystemError::Manifest {
            path,
            message: "descriptor is not valid JSON".to_string(),
            source: Some(Box::new(e)),
        })?;
        Ok(Some(value))
    }
}
