//! Error types for the extension system.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

use crate::extension_system::kind::ExtensionKind;
use crate::extension_system::store::StoreError;

/// Errors produced by manifest loading, registration, module loading,
/// route bridging and the client pipeline.
///
/// Variants map onto the caller-visible taxonomy: validation failures
/// (`MissingSlug`, `InvalidSlug`, `Archive`), not-found (`NotFound`,
/// `Inactive`, `RouteNotFound`), security rejections (`PathEscape`,
/// which always fails closed), and hard failures (the rest).
#[derive(Debug, Error)]
pub enum ExtensionSystemError {
    #[error("{kind} manifest in '{}' is missing the required slug field", path.display())]
    MissingSlug { kind: ExtensionKind, path: PathBuf },

    #[error("invalid extension slug '{slug}': {reason}")]
    InvalidSlug { slug: String, reason: String },

    #[error("{kind} not found: {slug}")]
    NotFound { kind: ExtensionKind, slug: String },

    #[error("failed to load manifest from '{}': {message}", path.display())]
    Manifest {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    #[error("failed to load extension module from '{}': {message}", path.display())]
    ModuleLoad { path: PathBuf, message: String },

    #[error("archive install failed for '{}': {message}", path.display())]
    Archive { path: PathBuf, message: String },

    #[error("refusing to touch '{}': outside the extensions root", path.display())]
    PathEscape { path: PathBuf },

    #[error("{kind} '{slug}' is inactive")]
    Inactive { kind: ExtensionKind, slug: String },

    #[error("no route matching {method} '{path}' for extension '{slug}'")]
    RouteNotFound {
        slug: String,
        method: String,
        path: String,
    },

    #[error("{operation} hook failed for extension '{slug}': {message}")]
    Hook {
        slug: String,
        operation: String,
        message: String,
    },

    #[error("FFI call '{operation}' failed for extension '{slug}': {message}")]
    Ffi {
        slug: String,
        operation: String,
        message: String,
    },

    #[error("capability '{operation}' not provided by extension '{slug}'")]
    NotSupported { slug: String, operation: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error during '{operation}' on '{}': {source}", path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtensionSystemError {
    /// Build an [`ExtensionSystemError::Io`] with operation and path context.
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        ExtensionSystemError::Io {
            operation: operation.into(),
            path,
            source,
        }
    }
}

/// Shorthand for results inside the extension system.
pub type ExtResult<T> = std::result::Result<T, ExtensionSystemError>;
