//! Docker engine backend
//!
//! Connects to the Docker daemon using the standard client conventions:
//! `DOCKER_HOST` when set (`unix://` and `tcp://`/`http://` schemes),
//! otherwise the platform default socket.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bollard::{Docker, API_DEFAULT_VERSION};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::ContainerRequest;

use super::registry::register_auto_backend;
use super::{api, Backend, RunningContainer};

const ENGINE: &str = "docker";

#[derive(Default)]
pub struct DockerBackend {
    client: RwLock<Option<Docker>>,
}

impl DockerBackend {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self) -> anyhow::Result<Docker> {
        self.client
            .read()
            .await
            .clone()
            .context("docker backend used before connect")
    }
}

/// Opt the Docker backend into auto-selection.
pub fn register() {
    register_auto_backend(Arc::new(|| Arc::new(DockerBackend::new()) as Arc<dyn Backend>));
}

fn connect_client() -> anyhow::Result<Docker> {
    let client = match std::env::var("DOCKER_HOST") {
        Ok(host) => {
            if let Some(path) = host.strip_prefix("unix://") {
                Docker::connect_with_unix(path, 120, API_DEFAULT_VERSION)
                    .with_context(|| format!("failed to connect to docker at {host}"))?
            } else if let Some(rest) = host.strip_prefix("tcp://") {
                let url = format!("http://{rest}");
                Docker::connect_with_http(&url, 120, API_DEFAULT_VERSION)
                    .with_context(|| format!("failed to connect to docker at {host}"))?
            } else if host.starts_with("http://") {
                Docker::connect_with_http(&host, 120, API_DEFAULT_VERSION)
                    .with_context(|| format!("failed to connect to docker at {host}"))?
            } else {
                anyhow::bail!("unsupported DOCKER_HOST scheme: {host}");
            }
        }
        Err(_) => Docker::connect_with_local_defaults()
            .context("failed to connect to local docker daemon")?,
    };
    Ok(client)
}

#[async_trait]
impl Backend for DockerBackend {
    fn name(&self) -> &'static str {
        ENGINE
    }

    async fn connect(&self) -> anyhow::Result<()> {
        let client = connect_client()?;
        // The constructors are lazy; only a ping proves the daemon is there.
        if let Err(err) = client.ping().await {
            return Err(anyhow::Error::from(err).context("docker daemon did not answer ping"));
        }
        debug!("connected to docker daemon");
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
        // Safe without a successful connect; the client itself needs no
        // explicit shutdown.
        self.client.write().await.take();
        Ok(())
    }
}
