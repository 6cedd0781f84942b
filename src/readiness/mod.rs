//! Readiness polling
//!
//! Repeatedly invokes a caller-supplied probe against the container's
//! address until it succeeds or a bounded budget elapses. On exhaustion
//! the most recent probe error is returned, never a generic timeout, so
//! the caller sees the actual cause of unreadiness.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::debug;

/// Overall budget a probe gets before startup is treated as failed.
pub const DEFAULT_READY_BUDGET: Duration = Duration::from_secs(10);

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_millis(800);

/// A readiness probe: given the container's `host:port` address, resolves
/// to `Ok(())` once the service is usable.
pub type Probe = Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Build a [`Probe`] from an async closure.
pub fn probe_fn<F, Fut>(f: F) -> Probe
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |address| Box::pin(f(address)))
}

/// Probe that succeeds once a TCP connection to the address is accepted.
pub fn tcp() -> Probe {
    probe_fn(|address: String| async move {
        tokio::net::TcpStream::connect(&address)
            .await
            .map(drop)
            .map_err(|err| anyhow::anyhow!("tcp connect to {address}: {err}"))
    })
}

/// Probe that succeeds once `GET http://{address}{path}` returns a
/// success status.
pub fn http_get(path: impl Into<String>) -> Probe {
    let path = path.into();
    probe_fn(move |address: String| {
        let url = format!("http://{address}{path}");
        async move {
            let response = reqwest::get(&url).await?;
            if !response.status().is_success() {
                anyhow::bail!("GET {url} returned {}", response.status());
            }
            Ok(())
        }
    })
}

/// Poll `probe` against `address` until it succeeds or `budget` elapses.
///
/// The first attempt starts immediately; between attempts the poller
/// backs off exponentially, capped at both [`MAX_BACKOFF`] and the time
/// remaining. An attempt in flight when the budget runs out is completed
/// and no further attempt is started.
pub async fn wait_until_ready(
    address: &str,
    probe: &Probe,
    budget: Duration,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + budget;
    let mut backoff = INITIAL_BACKOFF;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let last_err = match probe(address.to_string()).await {
            Ok(()) => {
                debug!(address, attempts, "container ready");
                return Ok(());
            }
            Err(err) => err,
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(last_err);
        }

        tokio::time::sleep(backoff.min(deadline - now)).await;
        if Instant::now() >= deadline {
            return Err(last_err);
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
