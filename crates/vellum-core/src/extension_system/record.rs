//! Registration records and the hydrated runtime view.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extension_system::manifest::{AdminMenuItem, ClientCapabilities, ExtensionManifest, SettingsField};

/// One durable row per installed extension.
///
/// The record is the source of truth for identity, activation state and
/// the persisted settings override; `manifest` is a snapshot used as a
/// fallback when the on-disk manifest becomes unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub slug: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub is_active: bool,
    /// Persisted settings override (JSON object), or `Null` when never saved.
    pub settings: Value,
    /// Manifest snapshot taken at registration time.
    pub manifest: Value,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Payload for registering (or re-registering) an extension.
///
/// On slug conflict the store updates the cached metadata and manifest
/// snapshot but must preserve the existing `is_active` flag and settings
/// override — an upsert never resets user state.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub slug: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: Option<String>,
    pub initial_active: bool,
    /// Settings stored for a first-time registration (manifest defaults).
    pub initial_settings: Value,
    pub manifest: Value,
}

/// The runtime view returned to API callers: registration record merged
/// with the live on-disk manifest and effective settings. Recomputed on
/// every read, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedExtension {
    pub slug: String,
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub is_active: bool,
    /// Effective settings: manifest defaults shallow-overridden by the
    /// persisted settings.
    pub settings: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub settings_schema: Vec<SettingsField>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub admin_menu: Vec<AdminMenuItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_url: Option<String>,
    #[serde(skip_serializing_if = "ClientCapabilities::is_empty", default)]
    pub client: ClientCapabilities,
    pub manifest: ExtensionManifest,
}
