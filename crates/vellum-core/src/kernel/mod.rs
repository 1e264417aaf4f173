//! # Vellum Core Kernel
//!
//! The kernel owns the application context: component registration,
//! lifecycle (initialize, start, stop), and the top-level error type.
//! Components are created when the [`Application`](bootstrap::Application)
//! is built and live for the whole process; there is no teardown beyond
//! `stop`.

pub mod bootstrap;
pub mod component;
pub mod constants;
pub mod error;

pub use bootstrap::Application;
pub use component::KernelComponent;
pub use error::{Error, Result};

#[cfg(test)]
mod tests;
