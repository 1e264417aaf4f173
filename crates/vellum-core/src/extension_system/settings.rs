//! Settings merging.
//!
//! Effective settings are computed at hydration time from the manifest's
//! defaults and the persisted override; nothing merged here is ever
//! written back. The merge is shallow: a stored key replaces the default
//! value wholesale, nested objects included.

use serde_json::{Map, Value};

/// Compute `{...defaults, ...stored}`. Stored values always win.
///
/// A non-object `stored` value (including `Value::Null`) contributes
/// nothing and the defaults are returned unchanged.
pub fn effective_settings(defaults: &Map<String, Value>, stored: Option<&Value>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    if let Some(Value::Object(overrides)) = stored {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
