//! Shared application state for the HTTP front door.

use std::sync::Arc;
use std::time::Duration;

use codeloop::engine::Workflow;

/// Shared state accessible from all request handlers.
///
/// The workflow is built once at startup and only read afterwards, so every
/// request runs against the same backend client and configuration.
pub struct AppState<B> {
    pub workflow: Arc<Workflow<B>>,
    /// Wall-clock limit for one run; `None` lets runs finish on their own bounds.
    pub run_timeout: Option<Duration>,
}

impl<B> AppState<B> {
    pub fn new(workflow: Workflow<B>, run_timeout: Option<Duration>) -> Self {
        Self {
            workflow: Arc::new(workflow),
            run_timeout,
        }
    }
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            workflow: Arc::clone(&self.workflow),
            run_timeout: self.run_timeout,
        }
    }
}
