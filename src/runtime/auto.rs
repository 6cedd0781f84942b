//! Automatic backend selection
//!
//! A composite [`Backend`] that tries each registered factory in
//! registration order; the first backend whose connect succeeds becomes
//! the delegate for all subsequent calls.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ContainerRequest;
use crate::Error;

use super::registry::BackendRegistry;
use super::{Backend, RunningContainer};

pub struct AutoBackend {
    registry: Arc<BackendRegistry>,
    delegate: RwLock<Option<Arc<dyn Backend>>>,
}

impl AutoBackend {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            delegate: RwLock::new(None),
        }
    }

    /// Auto-select from the process-wide registry.
    pub fn from_global_registry() -> Self {
        Self::new(BackendRegistry::global())
    }

    async fn delegate(&self) -> anyhow::Result<Arc<dyn Backend>> {
        self.delegate
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow::anyhow!("auto backend used before connect"))
    }
}

#[async_trait]
impl Backend for AutoBackend {
    fn name(&self) -> &'static str {
        "auto"
    }

    async fn connect(&self) -> anyhow::Result<()> {
        let factories = self.registry.factories();
        if factories.is_empty() {
            return Err(Error::NoBackends.into());
        }

        let mut failures = Vec::with_capacity(factories.len());
        for factory in factories {
            let candidate = factory();
            match candidate.connect().await {
                Ok(()) => {
                    info!(backend = candidate.name(), "auto-selected container backend");
                    *self.delegate.write().await = Some(candidate);
                    return Ok(());
                }
                Err(err) => {
                    debug!(
                        backend = candidate.name(),
                        error = format!("{err:#}"),
                        "backend not available"
                    );
                    failures.push(format!("{}: {err:#}", candidate.name()));
                }
            }
        }

        Err(Error::BackendUnavailable { failures }.into())
    }

    async fn create_and_start(
        &self,
        request: &ContainerRequest,
    ) -> anyhow::Result<Arc<dyn RunningContainer>> {
        self.delegate().await?.create_and_start(request).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        // Safe without a successful connect.
        match self.delegate.write().await.take() {
            Some(delegate) => delegate.close().await,
            None => Ok(()),
        }
    }
}
