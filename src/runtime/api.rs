//! Shared plumbing for engines speaking the Docker-compatible API
//!
//! Both the Docker and Podman backends drive their engine through a
//! [`bollard::Docker`] client; everything past `connect` is identical and
//! lives here: image pull-if-absent, container create/start, file
//! injection, bound-address resolution, and the follow-mode log stream.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use bollard::container::{
    Config, InspectContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    UploadToContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerInspectResponse, HostConfig, ResourcesUlimits};
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{ContainerRequest, FilePayload};
use crate::logs::LogSource;

use super::RunningContainer;

/// Create and start a container, returning the handle on success.
///
/// On any failure after the container exists, the partially-created
/// container is force-removed before the error is returned, so a failed
/// create never leaves the engine holding resources.
pub(crate) async fn create_and_start(
    client: &Docker,
    engine: &'static str,
    request: &ContainerRequest,
) -> anyhow::Result<std::sync::Arc<dyn RunningContainer>> {
    ensure_image(client, &request.image()).await?;

    let name = format!("berth_{}", Uuid::new_v4().simple());
    let response = client
        .create_container(
            Some(bollard::container::CreateContainerOptions {
                name: name.clone(),
                ..Default::default()
            }),
            container_config(request),
        )
        .await
        .context("failed to create container")?;
    let id = response.id;

    match start_and_resolve(client, &id, request).await {
        Ok(address) => {
            info!(engine, container = %name, address = %address, "container started");
            Ok(std::sync::Arc::new(ApiContainer {
                client: client.clone(),
                id,
                address,
            }))
        }
        Err(err) => {
            if let Err(rm_err) = remove_container(client, &id).await {
                error!(
                    engine,
                    container = %name,
                    error = format!("{rm_err:#}"),
                    "failed to remove container after failed start"
                );
            }
            Err(err)
        }
    }
}

/// Pull the image unless it is already present, streaming pull progress
/// to the logger.
async fn ensure_image(client: &Docker, image: &str) -> anyhow::Result<()> {
    if client.inspect_image(image).await.is_ok() {
        return Ok(());
    }

    info!(image, "pulling image");
    let mut pull = client.create_image(
        Some(CreateImageOptions::<String> {
            from_image: image.to_string(),
            ..Default::default()
        }),
        None,
        None,
    );
    while let Some(progress) = pull.next().await {
        let update = progress.context("failed to pull image")?;
        if let Some(status) = update.status {
            debug!(target: "berth::pull", image, "{status}");
        }
    }
    Ok(())
}

fn container_config(request: &ContainerRequest) -> Config<String> {
    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    for port in std::iter::once(request.port).chain(request.extra_ports.iter().copied()) {
        exposed_ports.insert(format!("{port}/tcp"), HashMap::new());
    }

    let ulimits: Vec<ResourcesUlimits> = request
        .ulimits
        .iter()
        .map(|u| ResourcesUlimits {
            name: Some(u.name.clone()),
            soft: Some(u.soft),
            hard: Some(u.hard),
        })
        .collect();

    Config {
        image: Some(request.image()),
        env: if request.env.is_empty() {
            None
        } else {
            Some(request.env.clone())
        },
        entrypoint: request.entrypoint.clone().map(|e| vec![e]),
        cmd: request.cmd.clone(),
        exposed_ports: Some(exposed_ports),
        host_config: Some(HostConfig {
            publish_all_ports: Some(true),
            ulimits: if ulimits.is_empty() {
                None
            } else {
                Some(ulimits)
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn start_and_resolve(
    client: &Docker,
    id: &str,
    request: &ContainerRequest,
) -> anyhow::Result<String> {
    if !request.files.is_empty() {
        let archive = archive_payloads(&request.files)?;
        client
            .upload_to_container(
                id,
                Some(UploadToContainerOptions {
                    path: "/",
                    ..Default::default()
                }),
                archive.into(),
            )
            .await
            .context("failed to upload files to container")?;
    }

    client
        .start_container(id, None::<StartContainerOptions<String>>)
        .await
        .context("failed to start container")?;

    let inspect = client
        .inspect_container(id, None::<InspectContainerOptions>)
        .await
        .context("failed to inspect container")?;

    bound_address(&inspect, request.port)
}

/// Pack file payloads into an in-memory tar archive rooted at `/`.
///
/// Every payload path must be absolute; a bad path fails the whole
/// upload rather than being skipped.
fn archive_payloads(files: &[FilePayload]) -> anyhow::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    for file in files {
        let Some(entry_path) = file.path.strip_prefix('/') else {
            anyhow::bail!("file paths must be absolute: {:?}", file.path);
        };
        if entry_path.is_empty() {
            anyhow::bail!("file path names no file: {:?}", file.path);
        }

        let mut header = tar::Header::new_gnu();
        header.set_size(file.content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, entry_path, file.content.as_slice())
            .with_context(|| format!("failed to archive {:?}", file.path))?;
    }
    builder.into_inner().context("failed to finish archive")
}

/// Resolve the `host:port` address for the primary port.
///
/// Prefers the published host binding (wildcard host normalized to
/// loopback), falling back to the container-network IP plus the primary
/// port.
fn bound_address(inspect: &ContainerInspectResponse, port: u16) -> anyhow::Result<String> {
    let settings = inspect
        .network_settings
        .as_ref()
        .context("container has no network settings")?;

    let key = format!("{port}/tcp");
    if let Some(Some(bindings)) = settings.ports.as_ref().and_then(|ports| ports.get(&key)) {
        if let Some(binding) = bindings.first() {
            if let Some(host_port) = binding.host_port.as_deref() {
                let host = match binding.host_ip.as_deref() {
                    None | Some("") | Some("0.0.0.0") | Some("::") => "127.0.0.1",
                    Some(ip) => ip,
                };
                return Ok(format!("{host}:{host_port}"));
            }
        }
    }

    if let Some(ip) = settings.ip_address.as_deref().filter(|ip| !ip.is_empty()) {
        return Ok(format!("{ip}:{port}"));
    }

    anyhow::bail!("failed to determine container address for port {port}")
}

async fn remove_container(client: &Docker, id: &str) -> anyhow::Result<()> {
    client
        .remove_container(
            id,
            Some(RemoveContainerOptions {
                force: true,
                v: true,
                ..Default::default()
            }),
        )
        .await
        .context("failed to remove container")
}

/// A running container reached over the Docker-compatible API.
pub(crate) struct ApiContainer {
    client: Docker,
    id: String,
    address: String,
}

#[async_trait]
impl RunningContainer for ApiContainer {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn open_log_stream(&self) -> anyhow::Result<LogSource> {
        let stream = self
            .client
            .logs(
                &self.id,
                Some(LogsOptions::<String> {
                    follow: true,
                    stdout: true,
                    stderr: true,
                    ..Default::default()
                }),
            )
            .map(|item| {
                item.map(|chunk| chunk.into_bytes().to_vec())
                    .map_err(anyhow::Error::from)
            })
            .boxed();

        // Dropping the stream tears down the HTTP connection, which
        // happens inside the pump task as it exits; no separate
        // transport handle is needed.
        Ok(LogSource::new(stream))
    }

    async fn remove(&self) -> anyhow::Result<()> {
        remove_container(&self.client, &self.id).await
    }
}
