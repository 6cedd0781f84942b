//! Recording fakes shared by the runtime and lifecycle tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;

use crate::config::ContainerRequest;
use crate::logs::{LogSource, LogTransport};

use super::{Backend, RunningContainer};

pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

fn push(events: &Option<EventLog>, event: impl Into<String>) {
    if let Some(events) = events {
        events.lock().unwrap().push(event.into());
    }
}

/// A backend whose every observable action is recorded.
pub(crate) struct FakeBackend {
    name: &'static str,
    address: String,
    connect_error: Option<String>,
    create_error: Option<String>,
    events: Option<EventLog>,
    connected: AtomicBool,
    close_count: AtomicUsize,
    create_count: AtomicUsize,
    removed: Arc<AtomicBool>,
    remove_count: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub(crate) fn healthy(name: &'static str, address: &str) -> Self {
        Self {
            name,
            address: address.to_string(),
            connect_error: None,
            create_error: None,
            events: None,
            connected: AtomicBool::new(false),
            close_count: AtomicUsize::new(0),
            create_count: AtomicUsize::new(0),
            removed: Arc::new(AtomicBool::new(false)),
            remove_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn unreachable(name: &'static str, error: &str) -> Self {
        let mut backend = Self::healthy(name, "");
        backend.connect_error = Some(error.to_string());
        backend
    }

    pub(crate) fn failing_create(name: &'static str, error: &str) -> Self {
        let mut backend = Self::healthy(name, "");
        backend.create_error = Some(error.to_string());
        backend
    }

    pub(crate) fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub(crate) fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> bool {
        self.close_count.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    pub(crate) fn removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    pub(crate) fn remove_count(&self) -> usize {
        self.remove_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn connect(&self) -> anyhow::Result<()> {
        if let Some(error) = &self.connect_error {
            anyhow::bail!("{error}");
        }
        self.connected.store(true, Ordering::SeqCst);
        push(&self.events, format!("{}: connect", self.name));
        Ok(())
    }

    async fn create_and_start(
        &self,
        _request: &ContainerRequest,
    ) -> anyhow::Result<Arc<dyn RunningContainer>> {
        self.create_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.create_error {
            anyhow::bail!("{error}");
        }
        push(&self.events, format!("{}: create", self.name));
        Ok(Arc::new(FakeContainer {
            address: self.address.clone(),
            events: self.events.clone(),
            removed: self.removed.clone(),
            remove_count: self.remove_count.clone(),
        }))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        push(&self.events, format!("{}: close", self.name));
        Ok(())
    }
}

pub(crate) struct FakeContainer {
    address: String,
    events: Option<EventLog>,
    removed: Arc<AtomicBool>,
    remove_count: Arc<AtomicUsize>,
}

/// Drops when the pump task exits, marking the synchronization point.
struct PumpExitGuard {
    events: Option<EventLog>,
}

impl Drop for PumpExitGuard {
    fn drop(&mut self) {
        push(&self.events, "pump: exited");
    }
}

struct FakeTransport {
    events: Option<EventLog>,
}

#[async_trait]
impl LogTransport for FakeTransport {
    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        push(&self.events, "transport: closed");
        Ok(())
    }
}

#[async_trait]
impl RunningContainer for FakeContainer {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn open_log_stream(&self) -> anyhow::Result<LogSource> {
        // Follow-mode stream that never ends on its own; the guard drops
        // when the pump task exits.
        let guard = PumpExitGuard {
            events: self.events.clone(),
        };
        let stream = futures::stream::pending::<anyhow::Result<Vec<u8>>>()
            .map(move |item| {
                let _ = &guard;
                item
            })
            .boxed();

        Ok(LogSource::new(stream).with_transport(Box::new(FakeTransport {
            events: self.events.clone(),
        })))
    }

    async fn remove(&self) -> anyhow::Result<()> {
        self.removed.store(true, Ordering::SeqCst);
        self.remove_count.fetch_add(1, Ordering::SeqCst);
        push(&self.events, "container: removed");
        Ok(())
    }
}
