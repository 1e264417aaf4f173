use std::any::Any;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::kernel::error::Result;

/// Core lifecycle trait for kernel components.
///
/// Components are constructed when the application context is built,
/// initialized and started in registration order, and stopped in reverse
/// order on shutdown. There is no re-initialization: a stopped component
/// stays stopped for the rest of the process lifetime.
#[async_trait]
pub trait KernelComponent: Any + Send + Sync + Debug {
    /// Stable component name used in logs and lifecycle errors.
    fn name(&self) -> &'static str;

    /// Prepare the component (create directories, open handles). Must not
    /// depend on other components having started.
    async fn initialize(&self) -> Result<()>;

    /// Bring the component online. Runs after every component initialized.
    async fn start(&self) -> Result<()>;

    /// Release what `start` acquired. Best effort; called once.
    async fn stop(&self) -> Result<()>;
}
