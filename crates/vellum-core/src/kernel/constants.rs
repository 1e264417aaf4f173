//! Shared constants for the Vellum kernel and extension system.

/// Default directory (relative to the data dir) holding plugin packages.
pub const DEFAULT_PLUGINS_DIR: &str = "plugins";

/// Default directory (relative to the data dir) holding theme packages.
pub const DEFAULT_THEMES_DIR: &str = "themes";

/// Base name of an extension's loadable module, before the platform
/// dynamic-library suffix (`functions.so`, `functions.dylib`, ...).
pub const MODULE_BASENAME: &str = "functions";

/// Static descriptor filename for plugin packages.
pub const PLUGIN_DESCRIPTOR: &str = "plugin.json";

/// Static descriptor filename for theme packages.
pub const THEME_DESCRIPTOR: &str = "theme.json";

/// Exported symbol an extension module must provide.
pub const MODULE_INIT_SYMBOL: &[u8] = b"_extension_init\0";

/// Upper bound on extension slug length.
pub const MAX_SLUG_LEN: usize = 64;

/// Stylesheet a theme serves when its manifest does not name one.
pub const DEFAULT_THEME_STYLE: &str = "style.css";

/// Name of an extension module file on the current platform.
pub fn module_file_name() -> String {
    format!("{}{}", MODULE_BASENAME, std::env::consts::DLL_SUFFIX)
}
