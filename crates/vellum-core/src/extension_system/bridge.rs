//! The route bridge.
//!
//! The host's HTTP router is built once at startup, but extensions come
//! and go at runtime. The bridge reconciles the two: a wildcard route
//! under the extension namespace forwards into [`RouteBridge::dispatch`],
//! which consults a mount table maintained by repeated mount passes.
//!
//! Mounting is monotonic within a process: a slug stays in the table
//! once mounted, even across deactivation, because activation state is
//! checked fresh on every dispatched request instead. Re-running a
//! mount pass after an install only adds newly registered extensions.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::RwLock;

use crate::extension_system::error::{ExtResult, ExtensionSystemError};
use crate::extension_system::manifest::RouteDecl;
use crate::extension_system::module::{ExtensionRequest, ExtensionResponse};
use crate::extension_system::registry::ExtensionRegistry;

/// Bridges dynamic extension routes into a static router.
pub struct RouteBridge {
    registry: Arc<ExtensionRegistry>,
    mounted: RwLock<HashMap<String, Vec<RouteDecl>>>,
}

impl std::fmt::Debug for RouteBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteBridge").finish()
    }
}

impl RouteBridge {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self {
            registry,
            mounted: RwLock::new(HashMap::new()),
        }
    }

    /// Mount routes for every registered extension that declares any.
    /// Idempotent; already-mounted slugs are left untouched.
    pub async fn mount_pass(&self) -> ExtResult<()> {
        let declarations = self.registry.route_declarations().await?;
        let mut mounted = self.mounted.write().await;
        for (slug, routes) in declarations {
            if mounted.contains_key(&slug) {
                continue;
            }
            debug!("mounting {} route(s) for '{}'", routes.len(), slug);
            mounted.insert(slug, routes);
        }
        Ok(())
    }

    /// Slugs currently in the mount table.
    pub async fn mounted_slugs(&self) -> Vec<String> {
        self.mounted.read().await.keys().cloned().collect()
    }

    /// Dispatch one request to an extension route.
    ///
    /// The activation flag is read fresh from the store on every call,
    /// so deactivating an extension takes effect immediately even
    /// though its routes stay mounted.
    pub async fn dispatch(&self, slug: &str, request: ExtensionRequest) -> ExtResult<ExtensionResponse> {
        let declared = {
            let mounted = self.mounted.read().await;
            mounted.get(slug).cloned()
        };
        let declared = declared.ok_or_else(|| ExtensionSystemError::RouteNotFound {
            slug: slug.to_string(),
            method: request.method.clone(),
            path: request.path.clone(),
        })?;

        if !self.registry.is_active(slug).await? {
            return Err(ExtensionSystemError::Inactive {
                kind: self.registry.kind(),
                slug: slug.to_string(),
            });
        }

        let matched = declared
            .iter()
            .any(|r| r.method.eq_ignore_ascii_case(&request.method) && r.path == request.path);
        if !matched {
            return Err(ExtensionSystemError::RouteNotFound {
                slug: slug.to_string(),
                method: request.method.clone(),
                path: request.path.clone(),
            });
        }

        let module = self.registry.module_for(slug).await?.ok_or_else(|| {
            ExtensionSystemError::RouteNotFound {
                slug: slug.to_string(),
                method: request.method.clone(),
                path: request.path.clone(),
            }
        })?;
        module.handle_route(request).await
    }
}
