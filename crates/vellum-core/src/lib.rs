//! # Vellum Core
//!
//! Core library for the Vellum extension engine: a registry for
//! filesystem-resident plugin and theme packages with persisted
//! registration state, dynamically loaded extension modules, a
//! hot-mounted route bridge, and a client metadata pipeline.

pub mod extension_system;
pub mod kernel;

pub use extension_system::{
    ExtensionKind, ExtensionManifest, ExtensionModule, ExtensionRegistry, HydratedExtension,
    RegistrationRecord,
};
pub use kernel::bootstrap::Application;
pub use kernel::error::Error as KernelError;
