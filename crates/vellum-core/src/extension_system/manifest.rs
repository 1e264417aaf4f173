//! Extension manifests.
//!
//! A manifest is the declarative descriptor an extension package ships:
//! identity, default settings, and the capability entry points the loaded
//! module serves (server routes, shortcodes, elements, data loader,
//! script injector). Manifests are parsed leniently — every field except
//! the slug is optional — and unknown fields are preserved so a package
//! can carry its own metadata through the DB snapshot round-trip.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A server route an extension declares. Paths are relative to the
/// extension's namespace (`/api/plugins/{slug}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecl {
    pub method: String,
    pub path: String,
}

/// Client-side capabilities an extension's module provides, by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientCapabilities {
    /// Shortcode names served by `render_shortcode`.
    pub shortcodes: Vec<String>,
    /// Custom element types served by `render_element`.
    pub elements: Vec<String>,
    /// Whether the module provides a client data loader.
    pub data_loader: bool,
    /// Whether the module provides a script injector.
    pub script_injector: bool,
}

impl ClientCapabilities {
    pub fn is_empty(&self) -> bool {
        self.shortcodes.is_empty()
            && self.elements.is_empty()
            && !self.data_loader
            && !self.script_injector
    }
}

/// One entry of a settings schema: a key, an optional default, and any
/// extra UI metadata the admin surface wants to carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsField {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An admin navigation entry contributed by an extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminMenuItem {
    pub label: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Canonical in-memory manifest for a plugin or theme package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionManifest {
    /// Unique, filesystem-safe identifier. The only required field;
    /// callers reject manifests where it is empty.
    pub slug: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    /// Themes only; ignored for plugins.
    pub author: Option<String>,

    /// Option key -> default value.
    pub default_settings: Map<String, Value>,
    /// Theme-flavored alias for `default_settings`.
    pub settings: Map<String, Value>,
    /// Schema-style defaults; consulted when the maps above are empty.
    pub settings_schema: Vec<SettingsField>,

    /// Server routes the module serves through the route bridge.
    pub server_routes: Vec<RouteDecl>,
    /// Client capability names served by the module.
    pub client: ClientCapabilities,

    pub admin_menu: Vec<AdminMenuItem>,
    pub admin_view: Option<String>,
    /// Stylesheet path, themes only.
    pub style: Option<String>,

    /// Unrecognized manifest fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtensionManifest {
    /// Parse a manifest from a JSON value.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Serialize back to a JSON value (for DB snapshots and API payloads).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Resolve the manifest's default settings.
    ///
    /// Precedence follows the original descriptor conventions:
    /// `defaultSettings`, then the theme-style `settings` map, then
    /// defaults collected from `settingsSchema` entries.
    pub fn default_settings(&self) -> Map<String, Value> {
        if !self.default_settings.is_empty() {
            return self.default_settings.clone();
        }
        if !self.settings.is_empty() {
            return self.settings.clone();
        }
        let mut defaults = Map::new();
        for field in &self.settings_schema {
            if let Some(default) = &field.default {
                defaults.insert(field.key.clone(), default.clone());
            }
        }
        defaults
    }
}

/// Shallow-merge a freshly loaded manifest over a fallback snapshot.
///
/// On-disk fields always win; fallback keys only fill gaps. Either side
/// may be absent: with no disk manifest the fallback is used wholesale,
/// with no fallback the disk manifest passes through, and with neither
/// the result is `None`.
pub fn merge_with_fallback(disk: Option<Value>, fallback: Option<&Value>) -> Option<Value> {
    match (disk, fallback) {
        (Some(Value::Object(disk_map)), Some(Value::Object(fallback_map))) => {
            let mut merged = fallback_map.clone();
            for (key, value) in disk_map {
                merged.insert(key, value);
            }
            Some(Value::Object(merged))
        }
        (Some(disk), _) => Some(disk),
        (None, Some(fallback)) => Some(fallback.clone()),
        (None, None) => None,
    }
}
