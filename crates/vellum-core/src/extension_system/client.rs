//! The client capability pipeline.
//!
//! A snapshot of what active extensions contribute to content
//! rendering: shortcode and element renderers, data loaders and script
//! injectors. The pipeline is rebuilt whenever the set of active
//! extensions changes and is cheap to query afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use log::warn;
use serde_json::{Map, Value};

use crate::extension_system::error::ExtResult;
use crate::extension_system::module::{ExtensionModule, InjectOptions};
use crate::extension_system::record::HydratedExtension;
use crate::extension_system::registry::ExtensionRegistry;

/// Capabilities of the currently active extensions.
#[derive(Default)]
pub struct ClientPipeline {
    /// Shortcode name to owning module. When two active extensions
    /// declare the same name the later registration wins.
    shortcodes: HashMap<String, Arc<dyn ExtensionModule>>,
    /// Element type to owning module, same last-wins rule.
    elements: HashMap<String, Arc<dyn ExtensionModule>>,
    data_loaders: Vec<(String, Arc<dyn ExtensionModule>)>,
    injectors: Vec<(HydratedExtension, Arc<dyn ExtensionModule>)>,
}

impl std::fmt::Debug for ClientPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPipeline")
            .field("shortcodes", &self.shortcodes.keys().collect::<Vec<_>>())
            .field("elements", &self.elements.keys().collect::<Vec<_>>())
            .field("data_loaders", &self.data_loaders.len())
            .field("injectors", &self.injectors.len())
            .finish()
    }
}

impl ClientPipeline {
    /// Collect capabilities from every active extension across the
    /// given registries, in registry then registration order.
    pub async fn build(registries: &[&ExtensionRegistry]) -> ExtResult<Self> {
        let mut pipeline = Self::default();
        for registry in registries {
            for extension in registry.list().await? {
                if !extension.is_active || extension.client.is_empty() {
                    continue;
                }
                let module = match registry.module_for(&extension.slug).await {
                    Ok(Some(module)) => module,
                    Ok(None) => {
                        warn!(
                            "{} '{}' declares client capabilities but ships no module",
                            registry.kind(),
                            extension.slug
                        );
                        continue;
                    }
                    Err(e) => {
                        warn!("skipping client capabilities of '{}': {}", extension.slug, e);
                        continue;
                    }
                };
                pipeline.add(extension, module);
            }
        }
        Ok(pipeline)
    }

    fn add(&mut self, extension: HydratedExtension, module: Arc<dyn ExtensionModule>) {
        for name in &extension.client.shortcodes {
            self.shortcodes.insert(name.clone(), Arc::clone(&module));
        }
        for element in &extension.client.elements {
            self.elements.insert(element.clone(), Arc::clone(&module));
        }
        if extension.client.data_loader {
            self.data_loaders.push((extension.slug.clone(), Arc::clone(&module)));
        }
        if extension.client.script_injector {
            self.injectors.push((extension, module));
        }
    }

    /// Render a shortcode. `Ok(None)` when no active extension serves it.
    pub fn render_shortcode(
        &self,
        name: &str,
        attrs: &Map<String, Value>,
        context: &Value,
    ) -> ExtResult<Option<String>> {
        match self.shortcodes.get(name) {
            Some(module) => module.render_shortcode(name, attrs, context).map(Some),
            None => Ok(None),
        }
    }

    /// Render a custom element by its declared type.
    pub fn render_element(
        &self,
        element_type: &str,
        element: &Value,
        context: &Value,
    ) -> ExtResult<Option<String>> {
        match self.elements.get(element_type) {
            Some(module) => module.render_element(element, context).map(Some),
            None => Ok(None),
        }
    }

    /// Run every data loader concurrently and shallow-merge the object
    /// patches into one bag, in pipeline order. A loader that fails or
    /// returns a non-object is logged and skipped; one broken extension
    /// never poisons the rest.
    pub async fn run_data_loaders(&self, content: &Value, layout: &Value, context: &Value) -> Map<String, Value> {
        let futures = self
            .data_loaders
            .iter()
            .map(|(slug, module)| async move {
                (slug.as_str(), module.load_client_data(content, layout, context).await)
            });
        let results = join_all(futures).await;

        let mut bag = Map::new();
        for (slug, result) in results {
            match result {
                Ok(Value::Object(patch)) => {
                    for (key, value) in patch {
                        bag.insert(key, value);
                    }
                }
                Ok(Value::Null) => {}
                Ok(other) => {
                    warn!("data loader of '{}' returned a non-object ({}); ignoring", slug, kind_of(&other));
                }
                Err(e) => {
                    warn!("data loader of '{}' failed: {}", slug, e);
                }
            }
        }
        bag
    }

    /// Ask every script injector to contribute; true when any did.
    pub fn inject_scripts(&self, options: InjectOptions) -> bool {
        let mut injected = false;
        for (extension, module) in &self.injectors {
            injected |= module.inject_scripts(extension, options);
        }
        injected
    }

    pub fn shortcode_names(&self) -> Vec<String> {
        self.shortcodes.keys().cloned().collect()
    }

    pub fn element_types(&self) -> Vec<String> {
        self.elements.keys().cloned().collect()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
