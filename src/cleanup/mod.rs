//! Reverse-order resource teardown
//!
//! Every resource acquired during startup pushes a matching release action
//! onto a [`CleanupChain`] before the next acquisition is attempted, so
//! the chain always reflects exactly the resources actually held.

use futures::future::BoxFuture;
use std::future::Future;
use tracing::{debug, error};

type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// An ordered stack of named release actions, invoked last-in-first-out.
#[derive(Default)]
pub struct CleanupChain {
    actions: Vec<(&'static str, ReleaseFn)>,
    unwound: bool,
}

impl CleanupChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a release action for `resource`.
    pub fn push<F, Fut>(&mut self, resource: &'static str, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.actions.push((resource, Box::new(move || Box::pin(action()))));
    }

    /// Pop and invoke every action in reverse order, exactly once.
    ///
    /// Individual failures are logged with the resource name and never
    /// raised, so teardown always runs to completion. Calling `unwind` a
    /// second time is a no-op.
    pub async fn unwind(&mut self) {
        if self.unwound {
            return;
        }
        self.unwound = true;

        while let Some((resource, release)) = self.actions.pop() {
            debug!(resource, "releasing");
            if let Err(err) = release().await {
                error!(resource, error = format!("{err:#}"), "failed to release resource");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
