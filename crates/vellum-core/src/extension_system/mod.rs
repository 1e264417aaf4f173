//! Extension system for Vellum
//!
//! Loads, registers and runs content extensions (plugins and themes):
//! manifest resolution with stored fallbacks, the registration table,
//! the install/activate/delete lifecycle, dynamic route mounting and
//! the client capability pipeline.

pub mod archive;
pub mod bridge;
pub mod client;
pub mod error;
pub mod ffi;
pub mod kind;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod module;
pub mod record;
pub mod registry;
pub mod settings;
pub mod slug;
pub mod store;

#[cfg(test)]
mod tests;

pub use bridge::RouteBridge;
pub use client::ClientPipeline;
pub use error::{ExtResult, ExtensionSystemError};
pub use ffi::LibraryModuleLoader;
pub use kind::ExtensionKind;
pub use loader::ManifestLoader;
pub use manager::{DefaultExtensionManager, ExtensionManager};
pub use manifest::{ClientCapabilities, ExtensionManifest, RouteDecl};
pub use module::{ExtensionModule, ExtensionRequest, ExtensionResponse, InjectOptions, ModuleLoader};
pub use record::{HydratedExtension, NewRegistration, RegistrationRecord};
pub use registry::{DeleteOptions, ExtensionRegistry};
pub use store::{ContentRepository, RegistrationStore, StoreError};
