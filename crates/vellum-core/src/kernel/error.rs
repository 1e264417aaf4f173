//! # Vellum Kernel Errors
//!
//! [`Error`] is the top-level error type: it wraps the typed subsystem
//! errors and adds lifecycle context for failures that happen while the
//! kernel is driving components through initialize/start/stop.

use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::extension_system::error::ExtensionSystemError;
use crate::extension_system::store::StoreError;

/// Top-level error type for the Vellum application.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Typed extension system error.
    #[error("extension system error: {0}")]
    ExtensionSystem(#[from] ExtensionSystemError),

    /// Typed registration/settings store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error occurring during a specific kernel lifecycle phase.
    #[error("kernel lifecycle error during {phase:?} ({}): {message}", component_name.as_deref().unwrap_or("<kernel>"))]
    Lifecycle {
        phase: LifecyclePhase,
        component_name: Option<String>,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// I/O error with operation and path context.
    #[error("I/O error during '{operation}' on '{}': {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        operation: String,
        path: PathBuf,
    },

    /// Generic error with message.
    #[error("error: {0}")]
    Other(String),
}

/// A phase in the kernel's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Bootstrap,
    Initialize,
    Start,
    Stop,
}

/// Shorthand for Result with the kernel [`Error`] type.
pub type Result<T> = StdResult<T, Error>;

impl Error {
    /// Build an [`Error::Io`] with operation and path context.
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::Io {
            source,
            operation: operation.into(),
            path,
        }
    }

    /// Wrap an error as a lifecycle failure for the given component.
    pub fn lifecycle(
        phase: LifecyclePhase,
        component_name: &str,
        source: Error,
    ) -> Self {
        Error::Lifecycle {
            phase,
            component_name: Some(component_name.to_string()),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
