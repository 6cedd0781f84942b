//! Container backend abstraction
//!
//! A [`Backend`] drives one specific container engine; backends are
//! treated polymorphically and may register themselves for auto-selection
//! (see [`registry`] and [`auto`]). A successful create returns a
//! [`RunningContainer`], the backend-facing handle the orchestrator wraps.

use async_trait::async_trait;

use crate::config::ContainerRequest;
use crate::logs::LogSource;

pub mod api;
pub mod auto;
pub mod docker;
pub mod podman;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use auto::AutoBackend;
pub use registry::{register_auto_backend, BackendFactory, BackendRegistry};

/// One container engine adapter.
///
/// `close` must be safe to call even if `connect` never succeeded, and a
/// failed `connect` must leave the backend holding no resources.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short engine name used in logs and aggregated errors.
    fn name(&self) -> &'static str;

    /// Establish the connection to the engine.
    async fn connect(&self) -> anyhow::Result<()>;

    /// Create and start a container: resolve the image (pulling if
    /// absent), inject file payloads, start, and report the bound
    /// address.
    async fn create_and_start(
        &self,
        request: &ContainerRequest,
    ) -> anyhow::Result<std::sync::Arc<dyn RunningContainer>>;

    /// Release the backend's own resources.
    async fn close(&self) -> anyhow::Result<()>;
}

/// One running container, as seen by the orchestrator.
#[async_trait]
pub trait RunningContainer: Send + Sync {
    /// `host:port` address reachable by the caller.
    fn address(&self) -> String;

    /// Open the follow-mode log stream. Called at most once per
    /// container, by the orchestrator, right after start.
    async fn open_log_stream(&self) -> anyhow::Result<LogSource>;

    /// Force-remove the container and its volumes.
    async fn remove(&self) -> anyhow::Result<()>;
}
