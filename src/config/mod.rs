//! Container request and session configuration
//!
//! A [`ContainerRequest`] describes the container to start; a
//! [`SessionConfig`] adds cross-cutting behavior (log sink, backend
//! choice, readiness probe). Options apply in call order and later calls
//! writing the same field win.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lifecycle::Container;
use crate::logs::{LogSink, TracingSink};
use crate::readiness::{Probe, DEFAULT_READY_BUDGET};
use crate::runtime::registry::BackendRegistry;
use crate::runtime::Backend;
use crate::Error;

/// A container resource limit (ulimit) applied at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ulimit {
    pub name: String,
    pub soft: i64,
    pub hard: i64,
}

/// A file written into the container filesystem before it starts.
///
/// `path` must be absolute inside the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePayload {
    pub path: String,
    pub content: Vec<u8>,
}

impl FilePayload {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Size of the payload in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Parameters used by backends to create and start a container.
///
/// Owned exclusively by the orchestration call; never mutated after the
/// call begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRequest {
    /// Image repository, e.g. `postgres`.
    pub repo: String,
    /// Image tag, e.g. `16-alpine`.
    pub tag: String,
    /// Primary port the containerized service listens on.
    pub port: u16,

    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
    #[serde(default)]
    pub ulimits: Vec<Ulimit>,
    #[serde(default)]
    pub files: Vec<FilePayload>,
    #[serde(default)]
    pub extra_ports: Vec<u16>,
}

impl ContainerRequest {
    pub fn new(repo: impl Into<String>, tag: impl Into<String>, port: u16) -> Self {
        Self {
            repo: repo.into(),
            tag: tag.into(),
            port,
            env: Vec::new(),
            entrypoint: None,
            cmd: None,
            ulimits: Vec::new(),
            files: Vec::new(),
            extra_ports: Vec::new(),
        }
    }

    /// Full image reference, `repo:tag`.
    pub fn image(&self) -> String {
        format!("{}:{}", self.repo, self.tag)
    }
}

/// Everything one orchestration call needs: the request plus cross-cutting
/// behavior, assembled builder-style.
#[derive(Clone)]
pub struct SessionConfig {
    pub(crate) request: ContainerRequest,
    pub(crate) sink: Arc<dyn LogSink>,
    pub(crate) backend: Option<Arc<dyn Backend>>,
    pub(crate) registry: Arc<BackendRegistry>,
    pub(crate) probe: Option<Probe>,
    pub(crate) ready_budget: Duration,
}

impl SessionConfig {
    /// Start building a session for `repo:tag` exposing `port`.
    ///
    /// Defaults: container output logged through [`TracingSink`], backend
    /// auto-selected from the global registry, no readiness probe, 10 s
    /// readiness budget.
    pub fn new(repo: impl Into<String>, tag: impl Into<String>, port: u16) -> Self {
        Self {
            request: ContainerRequest::new(repo, tag, port),
            sink: Arc::new(TracingSink),
            backend: None,
            registry: BackendRegistry::global(),
            probe: None,
            ready_budget: DEFAULT_READY_BUDGET,
        }
    }

    /// Replace the container environment (`KEY=value` entries).
    pub fn env(mut self, env: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.request.env = env.into_iter().map(Into::into).collect();
        self
    }

    /// Override the image entrypoint.
    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.request.entrypoint = Some(entrypoint.into());
        self
    }

    /// Override the image command.
    pub fn cmd(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.request.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the container resource limits.
    pub fn ulimits(mut self, ulimits: impl IntoIterator<Item = Ulimit>) -> Self {
        self.request.ulimits = ulimits.into_iter().collect();
        self
    }

    /// Write a file into the container before it starts. Repeatable.
    pub fn upload_file(mut self, file: FilePayload) -> Self {
        self.request.files.push(file);
        self
    }

    /// Expose an additional port. Repeatable.
    pub fn expose_port(mut self, port: u16) -> Self {
        self.request.extra_ports.push(port);
        self
    }

    /// Route container output to `sink` instead of the tracing default.
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use an explicit backend instead of auto-selection.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Auto-select from `registry` instead of the process-wide default.
    pub fn registry(mut self, registry: Arc<BackendRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Poll `probe` against the container address until it succeeds or the
    /// readiness budget elapses; treat exhaustion as a fatal setup error.
    pub fn ready_when(mut self, probe: Probe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Like [`ready_when`](Self::ready_when) with an explicit budget.
    pub fn readiness_within(mut self, probe: Probe, budget: Duration) -> Self {
        self.probe = Some(probe);
        self.ready_budget = budget;
        self
    }

    /// Run the full startup sequence and return the running container.
    pub async fn start(self) -> Result<Container, Error> {
        crate::lifecycle::start_container(self).await
    }

    pub fn request(&self) -> &ContainerRequest {
        &self.request
    }
}
