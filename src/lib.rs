//! Ephemeral containers as test fixtures
//!
//! `berth` starts throwaway containers for integration tests and tears
//! them down completely: build a [`SessionConfig`], call
//! [`SessionConfig::start`], use the returned [`Container`]'s address,
//! and [`Container::close`] it when the test is done.
//!
//! Backends drive real engines (Docker and Podman are built in) and are
//! auto-selected from a registry unless one is chosen explicitly. Call
//! [`register_default_backends`] once at startup to make both engines
//! candidates.
//!
//! ```no_run
//! use berth::{readiness, register_default_backends, SessionConfig};
//!
//! # async fn demo() -> Result<(), berth::Error> {
//! register_default_backends();
//!
//! let container = SessionConfig::new("postgres", "16-alpine", 5432)
//!     .env(["POSTGRES_PASSWORD=secret"])
//!     .ready_when(readiness::tcp())
//!     .start()
//!     .await?;
//!
//! let database_url = format!("postgres://postgres:secret@{}", container.address());
//! // run the test against database_url ...
//! container.close().await;
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod config;
mod error;
pub mod lifecycle;
pub mod logs;
pub mod readiness;
pub mod runtime;

pub use config::{ContainerRequest, FilePayload, SessionConfig, Ulimit};
pub use error::Error;
pub use lifecycle::{start_container, Container};
pub use logs::{LogSink, TracingSink};
pub use readiness::{http_get, probe_fn, tcp, Probe};
pub use runtime::{
    register_auto_backend, AutoBackend, Backend, BackendFactory, BackendRegistry, RunningContainer,
};

/// Register the built-in engine backends for auto-selection, Docker
/// first.
///
/// Safe to call more than once, though each call appends the backends
/// again; call it once at process startup.
pub fn register_default_backends() {
    runtime::docker::register();
    runtime::podman::register();
}
