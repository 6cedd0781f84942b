//! Container log forwarding
//!
//! A [`LogPump`] copies a container's log stream to a [`LogSink`] on a
//! spawned task. The pump's lifetime is governed solely by its own stop
//! signal, never by an ambient deadline, so slow startups are not
//! truncated. [`LogPump::stop`] cancels the task, waits for it to exit,
//! and only then closes the underlying transport.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Destination for container output. Must be safe for concurrent use.
pub trait LogSink: Send + Sync {
    fn write_chunk(&self, chunk: &[u8]) -> anyhow::Result<()>;
}

/// Default sink: forwards container output lines to `tracing` at info
/// level.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_chunk(&self, chunk: &[u8]) -> anyhow::Result<()> {
        let text = String::from_utf8_lossy(chunk);
        for line in text.lines().filter(|l| !l.is_empty()) {
            info!(target: "berth::container", "{line}");
        }
        Ok(())
    }
}

/// The connection a log stream reads from, closed only after the pump's
/// task has exited.
#[async_trait]
pub trait LogTransport: Send {
    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// A follow-mode log stream plus the transport backing it.
pub struct LogSource {
    pub stream: BoxStream<'static, anyhow::Result<Vec<u8>>>,
    pub transport: Option<Box<dyn LogTransport>>,
}

impl LogSource {
    pub fn new(stream: BoxStream<'static, anyhow::Result<Vec<u8>>>) -> Self {
        Self {
            stream,
            transport: None,
        }
    }

    pub fn with_transport(mut self, transport: Box<dyn LogTransport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

/// The copy loop forwarding a [`LogSource`] to a [`LogSink`].
pub struct LogPump {
    token: CancellationToken,
    task: JoinHandle<()>,
    transport: Option<Box<dyn LogTransport>>,
}

impl LogPump {
    /// Spawn the copy loop. Returns immediately; copy errors terminate the
    /// task and are logged, never propagated.
    pub fn spawn(source: LogSource, sink: std::sync::Arc<dyn LogSink>) -> Self {
        let token = CancellationToken::new();
        let stop = token.clone();
        let mut stream = source.stream;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    item = stream.next() => match item {
                        Some(Ok(chunk)) => {
                            if let Err(err) = sink.write_chunk(&chunk) {
                                error!(error = format!("{err:#}"), "failed to write container logs");
                                break;
                            }
                        }
                        Some(Err(err)) => {
                            error!(error = format!("{err:#}"), "failed to read container logs");
                            break;
                        }
                        None => break,
                    },
                }
            }
        });

        Self {
            token,
            task,
            transport: source.transport,
        }
    }

    /// Signal cancellation, wait for the task to exit, then close the
    /// transport. The ordering prevents tearing the transport down while
    /// the copy loop still holds a reference to it.
    pub async fn stop(self) -> anyhow::Result<()> {
        self.token.cancel();
        if let Err(err) = self.task.await {
            if err.is_panic() {
                warn!("log pump task panicked");
            }
        }
        if let Some(transport) = self.transport {
            transport.close().await?;
        }
        Ok(())
    }
}
