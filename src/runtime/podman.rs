//! Podman engine backend
//!
//! Podman serves the Docker-compatible API on its own socket, so the
//! same client drives it. The socket is resolved from
//! `PODMAN_SOCKET_PATH` when set, then the rootful system socket, then
//! the rootless per-user socket.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bollard::{Docker, API_DEFAULT_VERSION};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::ContainerRequest;

use super::registry::register_auto_backend;
use super::{api, Backend, RunningContainer};

const ENGINE: &str = "podman";
const ROOTFUL_SOCKET: &str = "/run/podman/podman.sock";

#[derive(Default)]
pub struct PodmanBackend {
    client: RwLock<Option<Docker>>,
}

impl PodmanBackend {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self) -> anyhow::Result<Docker> {
        self.client
            .read()
            .await
            .clone()
            .context("podman backend used before connect")
    }
}

/// Opt the Podman backend into auto-selection.
pub fn register() {
    register_auto_backend(Arc::new(|| Arc::new(PodmanBackend::new()) as Arc<dyn Backend>));
}

fn socket_path() -> String {
    if let Ok(path) = std::env::var("PODMAN_SOCKET_PATH") {
        return path;
    }
    if Path::new(ROOTFUL_SOCKET).exists() {
        return ROOTFUL_SOCKET.to_string();
    }
    let uid = unsafe { libc::geteuid() };
    format!("/run/user/{uid}/podman/podman.sock")
}

#[async_trait]
impl Backend for PodmanBackend {
    fn name(&self) -> &'static str {
        ENGINE
    }

    async fn connect(&self) -> anyhow::Result<()> {
        let path = socket_path();
        let client = Docker::connect_with_unix(&path, 120, API_DEFAULT_VERSION)
            .with_context(|| format!("failed to connect to podman at {path}"))?;
        if let Err(err) = client.ping().await {
            return Err(anyhow::Error::from(err)
                .context(format!("podman service at {path} did not answer ping")));
        }
        debug!(socket = %path, "connected to podman service");
        *self.client.write().await = Some(client);
        Ok(())
    }

    async fn create_and_start(
        &self,
        request: &ContainerRequest,
    ) -> anyhow::Result<Arc<dyn RunningContainer>> {
        let client = self.client().await?;
        api::create_and_start(&client, ENGINE, request).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.client.write().await.take();
        Ok(())
    }
}
