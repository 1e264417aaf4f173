//! The extension registry.
//!
//! One registry per extension kind. It owns the directory scan, the
//! registration table, module caching, and the full lifecycle: register,
//! install from archive, activate, deactivate, settings, delete. All
//! mutating operations serialize on an internal lock; reads hydrate
//! fresh from disk and store on every call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use crate::extension_system::archive::extract_archive;
use crate::extension_system::error::{ExtResult, ExtensionSystemError};
use crate::extension_system::kind::ExtensionKind;
use crate::extension_system::loader::{LoadedManifest, ManifestLoader};
use crate::extension_system::manifest::{ExtensionManifest, RouteDecl};
use crate::extension_system::module::{ExtensionModule, ModuleLoader};
use crate::extension_system::record::{HydratedExtension, NewRegistration, RegistrationRecord};
use crate::extension_system::settings::effective_settings;
use crate::extension_system::slug::validate_slug;
use crate::extension_system::store::{ContentRepository, RegistrationStore};
use crate::kernel::constants::DEFAULT_THEME_STYLE;

/// Flags for [`ExtensionRegistry::delete`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Remove the extension directory from disk.
    pub delete_files: bool,
    /// Run the module's uninstall hook before removing the record.
    pub delete_data: bool,
}

/// Registry for one extension kind.
pub struct ExtensionRegistry {
    kind: ExtensionKind,
    root: PathBuf,
    store: Arc<dyn RegistrationStore>,
    repository: Arc<dyn ContentRepository>,
    loader: ManifestLoader,
    /// Loaded module handles by slug. Entries are dropped on delete so
    /// the dynamic library is closed before its files are removed.
    modules: RwLock<HashMap<String, Arc<dyn ExtensionModule>>>,
    /// Serializes mutating operations; reads go around it.
    op_lock: Mutex<()>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("kind", &self.kind)
            .field("root", &self.root)
            .finish()
    }
}

impl ExtensionRegistry {
    pub fn new(
        kind: ExtensionKind,
        root: PathBuf,
        store: Arc<dyn RegistrationStore>,
        repository: Arc<dyn ContentRepository>,
        module_loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        Self {
            kind,
            root,
            store,
            repository,
            loader: ManifestLoader::new(kind, module_loader),
            modules: RwLock::new(HashMap::new()),
            op_lock: Mutex::new(()),
        }
    }

    pub fn kind(&self) -> ExtensionKind {
        self.kind
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_for(&self, slug: &str) -> PathBuf {
        self.root.join(slug)
    }

    /// Hydrate every registered extension. A record whose manifest can
    /// no longer be resolved is skipped with a warning instead of
    /// failing the whole listing.
    pub async fn list(&self) -> ExtResult<Vec<HydratedExtension>> {
        let records = self.store.all().await?;
        let mut extensions = Vec::with_capacity(records.len());
        for record in records {
            match self.hydrate(&record).await {
                Ok(extension) => extensions.push(extension),
                Err(e) => {
                    warn!(
                        "skipping {} '{}' while listing: {}",
                        self.kind, record.slug, e
                    );
                }
            }
        }
        Ok(extensions)
    }

    /// Hydrate one extension by slug.
    pub async fn get(&self, slug: &str) -> ExtResult<HydratedExtension> {
        let record = self.require_record(slug).await?;
        self.hydrate(&record).await
    }

    /// The hydrated active extension, if any. Meaningful for themes.
    pub async fn get_active(&self) -> ExtResult<Option<HydratedExtension>> {
        match self.store.get_active().await? {
            Some(record) => Ok(Some(self.hydrate(&record).await?)),
            None => Ok(None),
        }
    }

    /// Register the extension in `dir`: resolve its manifest, validate
    /// the slug, upsert the registration (preserving existing state),
    /// and cache the module handle. With `force_active` the extension is
    /// activated in the same locked sequence, install hook included.
    pub async fn register_from_dir(&self, dir: &Path, force_active: bool) -> ExtResult<HydratedExtension> {
        let _guard = self.op_lock.lock().await;
        let slug = self.register_locked(dir).await?;
        if force_active {
            self.activate_locked(&slug).await?;
        }
        self.hydrate_fresh(&slug).await
    }

    async fn register_locked(&self, dir: &Path) -> ExtResult<String> {
        let loaded = self.loader.load(dir, None).await?;
        let manifest = &loaded.manifest;
        if manifest.slug.is_empty() {
            return Err(ExtensionSystemError::MissingSlug {
                kind: self.kind,
                path: dir.to_path_buf(),
            });
        }
        validate_slug(&manifest.slug)?;

        let initial_active = self.initial_active_for_new().await?;
        self.store
            .upsert(new_registration(manifest, initial_active))
            .await?;
        self.cache_module(&loaded).await;
        debug!("registered {} '{}'", self.kind, manifest.slug);
        Ok(manifest.slug.clone())
    }

    /// A brand-new theme becomes active when no theme is active yet;
    /// plugins always start inactive.
    async fn initial_active_for_new(&self) -> ExtResult<bool> {
        if !self.kind.exclusive_activation() {
            return Ok(false);
        }
        Ok(self.store.get_active().await?.is_none())
    }

    /// Install an uploaded archive: extract to a staging area, resolve
    /// the staged manifest, then move the content into `root/{slug}`,
    /// replacing any previous install. The archive file is consumed
    /// whether the install succeeds or fails.
    pub async fn install_from_archive(&self, archive_path: &Path) -> ExtResult<HydratedExtension> {
        let result = self.install_archive_inner(archive_path).await;
        if archive_path.exists() {
            if let Err(e) = fs::remove_file(archive_path).await {
                warn!("failed to remove archive {}: {}", archive_path.display(), e);
            }
        }
        result
    }

    async fn install_archive_inner(&self, archive_path: &Path) -> ExtResult<HydratedExtension> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ExtensionSystemError::io(e, "creating extensions root", self.root.clone()))?;

        let staged = extract_archive(archive_path, &self.root).await?;
        let loaded = self.loader.load(staged.content_dir(), None).await?;
        if loaded.manifest.slug.is_empty() {
            return Err(ExtensionSystemError::MissingSlug {
                kind: self.kind,
                path: staged.content_dir().to_path_buf(),
            });
        }
        validate_slug(&loaded.manifest.slug)?;
        let slug = loaded.manifest.slug.clone();
        // The staged module handle points at staging paths; drop it and
        // reload from the final location after the move.
        drop(loaded);

        let final_dir = self.dir_for(&slug);
        let (staging_root, content) = staged.into_parts();

        let moved = self.replace_dir(&content, &final_dir).await;
        if staging_root.exists() {
            if let Err(e) = fs::remove_dir_all(&staging_root).await {
                warn!("failed to clean staging dir {}: {}", staging_root.display(), e);
            }
        }
        moved?;

        let result = {
            let _guard = self.op_lock.lock().await;
            self.register_locked(&final_dir).await
        };
        match result {
            Ok(slug) => self.get(&slug).await,
            Err(e) => Err(e),
        }
    }

    async fn replace_dir(&self, from: &Path, to: &Path) -> ExtResult<()> {
        if to.exists() {
            fs::remove_dir_all(to)
                .await
                .map_err(|e| ExtensionSystemError::io(e, "removing previous install", to.to_path_buf()))?;
        }
        fs::rename(from, to)
            .await
            .map_err(|e| ExtensionSystemError::io(e, "installing extension dir", to.to_path_buf()))?;
        Ok(())
    }

    /// Activate an extension. The install hook runs first; only when it
    /// succeeds is the active flag flipped, so a failed hook leaves the
    /// extension inactive. Themes activate exclusively.
    pub async fn activate(&self, slug: &str) -> ExtResult<HydratedExtension> {
        let _guard = self.op_lock.lock().await;
        self.activate_locked(slug).await
    }

    async fn activate_locked(&self, slug: &str) -> ExtResult<HydratedExtension> {
        let record = self.require_record(slug).await?;

        if let Some(module) = self.module_for(&record.slug).await? {
            module.on_install(self.repository.as_ref()).await?;
        }

        if self.kind.exclusive_activation() {
            self.store.activate_exclusive(&record.slug).await?;
        } else {
            self.store.set_active(&record.slug, true).await?;
        }
        self.hydrate_fresh(&record.slug).await
    }

    /// Deactivate an extension. No hooks run.
    pub async fn deactivate(&self, slug: &str) -> ExtResult<HydratedExtension> {
        let _guard = self.op_lock.lock().await;
        let record = self.require_record(slug).await?;
        self.store.set_active(&record.slug, false).await?;
        self.hydrate_fresh(&record.slug).await
    }

    /// Persist a settings override verbatim. Merging with defaults
    /// happens at read time, never here.
    pub async fn save_settings(&self, slug: &str, settings: &Value) -> ExtResult<HydratedExtension> {
        let _guard = self.op_lock.lock().await;
        let record = self.require_record(slug).await?;
        self.store.set_settings(&record.slug, settings).await?;
        self.hydrate_fresh(&record.slug).await
    }

    /// Delete an extension: deactivate, optionally run the uninstall
    /// hook, remove the registration, and optionally remove the files.
    ///
    /// A failed uninstall hook is logged and tolerated; the delete still
    /// proceeds. File removal fails closed: the directory is removed
    /// only when it provably resolves inside the registry root.
    pub async fn delete(&self, slug: &str, options: DeleteOptions) -> ExtResult<()> {
        let _guard = self.op_lock.lock().await;
        let record = self.require_record(slug).await?;

        if record.is_active {
            self.store.set_active(&record.slug, false).await?;
        }

        if options.delete_data {
            match self.module_for(&record.slug).await {
                Ok(Some(module)) => {
                    if let Err(e) = module.on_uninstall(self.repository.as_ref()).await {
                        warn!("uninstall hook for {} '{}' failed: {}", self.kind, record.slug, e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("could not load module for {} '{}' during delete: {}", self.kind, record.slug, e);
                }
            }
        }

        self.store.remove(&record.slug).await?;
        // Close the library handle before touching the files it maps.
        self.modules.write().await.remove(&record.slug);

        if options.delete_files {
            self.remove_files(&record.slug).await?;
        }
        Ok(())
    }

    async fn remove_files(&self, slug: &str) -> ExtResult<()> {
        let dir = self.dir_for(slug);
        if !dir.exists() {
            return Ok(());
        }
        let root = fs::canonicalize(&self.root)
            .await
            .map_err(|e| ExtensionSystemError::io(e, "resolving extensions root", self.root.clone()))?;
        let resolved = fs::canonicalize(&dir)
            .await
            .map_err(|e| ExtensionSystemError::io(e, "resolving extension dir", dir.clone()))?;
        if !resolved.starts_with(&root) || resolved == root {
            return Err(ExtensionSystemError::PathEscape { path: resolved });
        }
        fs::remove_dir_all(&resolved)
            .await
            .map_err(|e| ExtensionSystemError::io(e, "removing extension dir", resolved))?;
        Ok(())
    }

    /// Scan the extensions root and register every directory found.
    /// Broken packages are skipped with a warning. When a slug is seen
    /// twice the first directory wins. For themes, ensures one theme
    /// ends up active when any registered.
    pub async fn bootstrap_from_disk(&self) -> ExtResult<()> {
        let _guard = self.op_lock.lock().await;

        if let Err(e) = fs::create_dir_all(&self.root).await {
            return Err(ExtensionSystemError::io(e, "creating extensions root", self.root.clone()));
        }

        let mut seen: Vec<String> = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| ExtensionSystemError::io(e, "scanning extensions root", self.root.clone()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ExtensionSystemError::io(e, "scanning extensions root", self.root.clone()))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    continue;
                }
            }
            match self.loader.load(&path, None).await {
                Ok(loaded) => {
                    let slug = loaded.manifest.slug.clone();
                    if slug.is_empty() {
                        warn!("skipping {} at {}: manifest has no slug", self.kind, path.display());
                        continue;
                    }
                    if seen.contains(&slug) {
                        warn!(
                            "duplicate {} slug '{}' at {}; keeping the first one found",
                            self.kind, slug, path.display()
                        );
                        continue;
                    }
                    if let Err(e) = validate_slug(&slug) {
                        warn!("skipping {} at {}: {}", self.kind, path.display(), e);
                        continue;
                    }
                    // Bootstrap only fills gaps; an existing registration
                    // is never overwritten here.
                    if self.store.get(&slug).await?.is_none() {
                        let initial_active = self.initial_active_for_new().await?;
                        self.store
                            .upsert(new_registration(&loaded.manifest, initial_active))
                            .await?;
                    }
                    self.cache_module(&loaded).await;
                    seen.push(slug);
                }
                Err(e) => {
                    warn!("skipping {} at {}: {}", self.kind, path.display(), e);
                }
            }
        }

        if self.kind.exclusive_activation() {
            self.ensure_one_active(&seen).await?;
        }
        debug!("bootstrapped {} {}(s) from {}", seen.len(), self.kind, self.root.display());
        Ok(())
    }

    /// With themes registered but none active, activate the first one
    /// found on disk. Hook failures here only log; startup must not die
    /// because a theme's install hook is broken.
    async fn ensure_one_active(&self, seen: &[String]) -> ExtResult<()> {
        if self.store.get_active().await?.is_some() {
            return Ok(());
        }
        let Some(slug) = seen.first() else {
            return Ok(());
        };
        if let Ok(Some(module)) = self.module_for(slug).await {
            if let Err(e) = module.on_install(self.repository.as_ref()).await {
                warn!("install hook for default {} '{}' failed: {}", self.kind, slug, e);
                return Ok(());
            }
        }
        self.store.activate_exclusive(slug).await?;
        Ok(())
    }

    /// The cached module handle for `slug`, loading and caching it on
    /// first use. `Ok(None)` for descriptor-only packages.
    pub async fn module_for(&self, slug: &str) -> ExtResult<Option<Arc<dyn ExtensionModule>>> {
        if let Some(module) = self.modules.read().await.get(slug) {
            return Ok(Some(Arc::clone(module)));
        }
        let loaded = self.loader.load(&self.dir_for(slug), None).await?;
        self.cache_module(&loaded).await;
        Ok(loaded.module)
    }

    /// Route declarations of every registered extension, for the route
    /// bridge's mount pass.
    pub async fn route_declarations(&self) -> ExtResult<Vec<(String, Vec<RouteDecl>)>> {
        let mut declarations = Vec::new();
        for extension in self.list().await? {
            if !extension.manifest.server_routes.is_empty() {
                declarations.push((extension.slug.clone(), extension.manifest.server_routes.clone()));
            }
        }
        Ok(declarations)
    }

    /// Fresh active check, used per dispatched request.
    pub async fn is_active(&self, slug: &str) -> ExtResult<bool> {
        Ok(self.store.is_active(slug).await?)
    }

    async fn cache_module(&self, loaded: &LoadedManifest) {
        if let Some(module) = &loaded.module {
            self.modules
                .write()
                .await
                .insert(loaded.manifest.slug.clone(), Arc::clone(module));
        }
    }

    async fn require_record(&self, slug: &str) -> ExtResult<RegistrationRecord> {
        self.store
            .get(slug)
            .await?
            .ok_or_else(|| ExtensionSystemError::NotFound {
                kind: self.kind,
                slug: slug.to_string(),
            })
    }

    async fn hydrate_fresh(&self, slug: &str) -> ExtResult<HydratedExtension> {
        let record = self.require_record(slug).await?;
        self.hydrate(&record).await
    }

    /// Merge a registration record with the live on-disk manifest into
    /// the API view. Falls back to the stored manifest snapshot when the
    /// directory is gone.
    async fn hydrate(&self, record: &RegistrationRecord) -> ExtResult<HydratedExtension> {
        let dir = self.dir_for(&record.slug);
        let fallback = (!record.manifest.is_null()).then_some(&record.manifest);
        let loaded = self.loader.load(&dir, fallback).await?;
        self.cache_module(&loaded).await;
        let manifest = loaded.manifest;

        let defaults = manifest.default_settings();
        let settings = effective_settings(&defaults, Some(&record.settings));

        let style = manifest.style.clone();
        let style_url = self.kind.exclusive_activation().then(|| {
            let file = style.as_deref().unwrap_or(DEFAULT_THEME_STYLE);
            format!("/themes/{}/{}", record.slug, file)
        });

        Ok(HydratedExtension {
            slug: record.slug.clone(),
            name: manifest
                .name
                .clone()
                .or_else(|| record.name.clone())
                .unwrap_or_else(|| record.slug.clone()),
            version: manifest.version.clone().or_else(|| record.version.clone()),
            description: manifest.description.clone().or_else(|| record.description.clone()),
            author: manifest.author.clone().or_else(|| record.author.clone()),
            is_active: record.is_active,
            settings,
            settings_schema: manifest.settings_schema.clone(),
            admin_menu: manifest.admin_menu.clone(),
            admin_view: manifest.admin_view.clone(),
            style,
            style_url,
            client: manifest.client.clone(),
            manifest,
        })
    }
}

fn new_registration(manifest: &ExtensionManifest, initial_active: bool) -> NewRegistration {
    NewRegistration {
        slug: manifest.slug.clone(),
        name: manifest.name.clone().unwrap_or_else(|| manifest.slug.clone()),
        version: manifest.version.clone().unwrap_or_else(|| "1.0.0".to_string()),
        description: manifest.description.clone().unwrap_or_default(),
        author: manifest.author.clone(),
        initial_active,
        initial_settings: Value::Object(manifest.default_settings()),
        manifest: manifest.to_value(),
    }
}
