use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kernel::constants::{PLUGIN_DESCRIPTOR, THEME_DESCRIPTOR};

/// The two extension variants Vellum manages.
///
/// Plugins and themes share the same registration, loading and settings
/// machinery; the kind only decides filesystem conventions and whether
/// activation is exclusive (at most one active theme, any number of
/// active plugins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionKind {
    Plugin,
    Theme,
}

impl ExtensionKind {
    /// Static descriptor filename for this kind.
    pub fn descriptor_file(&self) -> &'static str {
        match self {
            ExtensionKind::Plugin => PLUGIN_DESCRIPTOR,
            ExtensionKind::Theme => THEME_DESCRIPTOR,
        }
    }

    /// Whether activating one extension of this kind deactivates the rest.
    pub fn exclusive_activation(&self) -> bool {
        matches!(self, ExtensionKind::Theme)
    }

    /// Lowercase label used in messages and URLs.
    pub fn label(&self) -> &'static str {
        match self {
            ExtensionKind::Plugin => "plugin",
            ExtensionKind::Theme => "theme",
        }
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
