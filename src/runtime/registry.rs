//! Backend registration for auto-selection

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use super::Backend;

/// Constructs a fresh backend instance for one auto-selection attempt.
pub type BackendFactory = Arc<dyn Fn() -> Arc<dyn Backend> + Send + Sync>;

static GLOBAL: Lazy<Arc<BackendRegistry>> = Lazy::new(|| Arc::new(BackendRegistry::new()));

/// An append-only list of backend factories, read at auto-selector
/// construction time.
///
/// Registrations are expected to happen before any orchestration call;
/// the list is never cleared during normal operation. Tests and embedding
/// applications can construct their own registry instead of using the
/// process-wide default.
#[derive(Default)]
pub struct BackendRegistry {
    factories: RwLock<Vec<BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default registry.
    pub fn global() -> Arc<BackendRegistry> {
        GLOBAL.clone()
    }

    /// Append `factory` unconditionally; no de-duplication.
    pub fn register(&self, factory: BackendFactory) {
        self.factories
            .write()
            .expect("backend registry poisoned")
            .push(factory);
    }

    /// Snapshot of the registered factories, in registration order.
    pub fn factories(&self) -> Vec<BackendFactory> {
        self.factories
            .read()
            .expect("backend registry poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.factories
            .read()
            .expect("backend registry poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opt a backend into auto-selection on the process-wide registry.
///
/// Call before any orchestration call; registration order is selection
/// order.
pub fn register_auto_backend(factory: BackendFactory) {
    BackendRegistry::global().register(factory);
}
