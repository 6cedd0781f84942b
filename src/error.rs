//! Error types surfaced by container orchestration

use std::time::Duration;

use thiserror::Error;

/// Errors returned from the setup path.
///
/// Each variant names the orchestration step that failed. Errors hit while
/// releasing already-acquired resources are never surfaced here; they are
/// logged so a secondary teardown failure cannot mask the original cause.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no container backends registered, register one or choose explicitly")]
    NoBackends,

    #[error("failed to automatically select a backend:\n{}", .failures.join("\n"))]
    BackendUnavailable {
        /// One failure message per backend, in registration order.
        failures: Vec<String>,
    },

    #[error("failed to connect to container backend")]
    Connect(#[source] anyhow::Error),

    #[error("failed to create and start container")]
    Create(#[source] anyhow::Error),

    #[error("failed to attach container log stream")]
    LogStream(#[source] anyhow::Error),

    #[error("container at {address} did not become ready within {budget:?}")]
    NotReady {
        address: String,
        budget: Duration,
        /// The most recent probe error, not a generic timeout.
        #[source]
        source: anyhow::Error,
    },
}
