//! Container session lifecycle
//!
//! [`start_container`] runs the full startup sequence for one container
//! session. Each acquired resource pushes its release onto a
//! [`CleanupChain`] before the next step runs, so a failure at any step
//! releases exactly what was acquired, in reverse order, and then returns
//! the error for the step that failed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cleanup::CleanupChain;
use crate::config::SessionConfig;
use crate::logs::LogPump;
use crate::readiness::wait_until_ready;
use crate::runtime::{AutoBackend, Backend};
use crate::Error;

/// A running container session.
///
/// Call [`close`](Container::close) when done; the container is removed,
/// the log pump stopped, and the backend connection released, in that
/// order. Dropping without closing leaks the container until the engine
/// prunes it.
pub struct Container {
    id: Uuid,
    address: String,
    started_at: DateTime<Utc>,
    cleanup: Mutex<CleanupChain>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Session identifier, unique per started container.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `host:port` address the containerized service is reachable at.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Release everything the session holds, in reverse acquisition
    /// order. Idempotent; teardown failures are logged, never raised.
    pub async fn close(&self) {
        self.cleanup.lock().await.unwind().await;
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if !self.cleanup.get_mut().is_empty() {
            warn!(
                container = %self.id,
                "container session dropped without close, resources leak until the engine prunes them"
            );
        }
    }
}

/// Run the startup sequence described by `config`.
///
/// Steps, in order: resolve the backend (explicit or auto-selected) and
/// connect; create and start the container; attach the log pump;
/// optionally poll the readiness probe. The first failure unwinds every
/// release registered so far and is returned as the [`Error`] variant for
/// that step.
pub async fn start_container(config: SessionConfig) -> Result<Container, Error> {
    let SessionConfig {
        request,
        sink,
        backend,
        registry,
        probe,
        ready_budget,
    } = config;

    let backend: Arc<dyn Backend> =
        backend.unwrap_or_else(|| Arc::new(AutoBackend::new(registry)));

    if let Err(err) = backend.connect().await {
        // Selection errors from the auto backend come back as-is.
        return Err(match err.downcast::<Error>() {
            Ok(selection) => selection,
            Err(other) => Error::Connect(other),
        });
    }
    debug!(backend = backend.name(), "backend connected");

    let mut chain = CleanupChain::new();
    {
        let backend = backend.clone();
        chain.push("backend", move || async move { backend.close().await });
    }

    let container = match backend.create_and_start(&request).await {
        Ok(container) => container,
        Err(err) => {
            chain.unwind().await;
            return Err(Error::Create(err));
        }
    };
    {
        let container = container.clone();
        chain.push("container", move || async move { container.remove().await });
    }

    let address = container.address();

    let source = match container.open_log_stream().await {
        Ok(source) => source,
        Err(err) => {
            chain.unwind().await;
            return Err(Error::LogStream(err));
        }
    };
    let pump = LogPump::spawn(source, sink);
    chain.push("log pump", move || pump.stop());

    if let Some(probe) = probe {
        if let Err(source) = wait_until_ready(&address, &probe, ready_budget).await {
            chain.unwind().await;
            return Err(Error::NotReady {
                address,
                budget: ready_budget,
                source,
            });
        }
    }

    let id = Uuid::new_v4();
    info!(
        container = %id,
        image = %request.image(),
        address = %address,
        "container session ready"
    );

    Ok(Container {
        id,
        address,
        started_at: Utc::now(),
        cleanup: Mutex::new(chain),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::probe_fn;
    use crate::runtime::registry::{BackendFactory, BackendRegistry};
    use crate::runtime::testing::{EventLog, FakeBackend};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;

    fn registry_of(backends: Vec<Arc<FakeBackend>>) -> Arc<BackendRegistry> {
        let registry = Arc::new(BackendRegistry::new());
        for backend in backends {
            let factory: BackendFactory = Arc::new(move || backend.clone() as Arc<dyn Backend>);
            registry.register(factory);
        }
        registry
    }

    fn session(registry: Arc<BackendRegistry>) -> SessionConfig {
        SessionConfig::new("postgres", "16-alpine", 5432).registry(registry)
    }

    #[tokio::test]
    async fn test_start_auto_selects_first_connectable_backend() {
        let a = Arc::new(FakeBackend::unreachable("a", "no socket"));
        let b = Arc::new(FakeBackend::healthy("b", "127.0.0.1:4242"));

        let container = session(registry_of(vec![a, b.clone()]))
            .start()
            .await
            .unwrap();

        assert_eq!(container.address(), "127.0.0.1:4242");
        assert_eq!(b.create_calls(), 1);

        container.close().await;
        assert!(b.removed());
        assert!(b.closed());
    }

    #[tokio::test]
    async fn test_explicit_backend_skips_auto_selection() {
        let backend = Arc::new(FakeBackend::healthy("explicit", "127.0.0.1:1"));

        // Empty registry; the explicit backend must be used regardless.
        let container = session(Arc::new(BackendRegistry::new()))
            .backend(backend.clone())
            .start()
            .await
            .unwrap();

        assert!(backend.connected());
        container.close().await;
    }

    #[tokio::test]
    async fn test_empty_registry_surfaces_no_backends() {
        let err = session(Arc::new(BackendRegistry::new()))
            .start()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoBackends));
    }

    #[tokio::test]
    async fn test_all_backends_failing_surfaces_every_message() {
        let a = Arc::new(FakeBackend::unreachable("a", "no socket"));
        let b = Arc::new(FakeBackend::unreachable("b", "permission denied"));

        let err = session(registry_of(vec![a, b])).start().await.unwrap_err();

        let msg = err.to_string();
        assert!(matches!(err, Error::BackendUnavailable { .. }));
        assert!(msg.contains("a: no socket"));
        assert!(msg.contains("b: permission denied"));
    }

    #[tokio::test]
    async fn test_create_failure_releases_backend_only() {
        let backend = Arc::new(FakeBackend::failing_create("sick", "image unavailable"));

        let err = session(Arc::new(BackendRegistry::new()))
            .backend(backend.clone())
            .start()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Create(_)));
        assert!(backend.closed());
        assert!(!backend.removed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_tears_down_in_reverse_order() {
        let events: EventLog = Arc::new(StdMutex::new(Vec::new()));
        let backend = Arc::new(
            FakeBackend::healthy("b", "127.0.0.1:4242").with_events(events.clone()),
        );

        let err = session(Arc::new(BackendRegistry::new()))
            .backend(backend.clone())
            .ready_when(probe_fn(|_address| async {
                anyhow::bail!("connection refused")
            }))
            .start()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotReady { .. }));
        if let Error::NotReady { source, .. } = err {
            assert_eq!(source.to_string(), "connection refused");
        }

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "b: connect",
                "b: create",
                "pump: exited",
                "transport: closed",
                "container: removed",
                "b: close",
            ]
        );
    }

    #[tokio::test]
    async fn test_probe_receives_container_address() {
        let backend = Arc::new(FakeBackend::healthy("b", "127.0.0.1:4242"));
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let probed = seen.clone();
        let container = session(Arc::new(BackendRegistry::new()))
            .backend(backend)
            .ready_when(probe_fn(move |address| {
                let probed = probed.clone();
                async move {
                    probed.lock().unwrap().push(address);
                    Ok(())
                }
            }))
            .start()
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["127.0.0.1:4242".to_string()]);
        container.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let backend = Arc::new(FakeBackend::healthy("b", "127.0.0.1:1"));

        let container = session(Arc::new(BackendRegistry::new()))
            .backend(backend.clone())
            .start()
            .await
            .unwrap();

        container.close().await;
        container.close().await;

        assert_eq!(backend.remove_count(), 1);
        assert_eq!(backend.close_count(), 1);
    }
}
