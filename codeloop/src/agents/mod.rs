//! Step implementations. Each model-backed step is one agent module.
//!
//! Agents receive the state the engine handed them and return a new state;
//! they never mutate their input. Failures come back as [`StepError`] and are
//! recorded by the engine, so no agent can abort a run.

use thiserror::Error;

use crate::core::types::{Step, WorkflowState};
use crate::io::config::ModelsConfig;
use crate::io::gateway::{ChatMessage, CompletionBackend, GatewayFailure, ModelGateway};
use crate::io::prompt::PromptEngine;
use crate::io::sandbox::Sandbox;

pub mod coder;
pub mod evaluator;
pub mod planner;
pub mod supervisor;
pub mod tester;

/// A step-local failure, absorbed into `assessment` by the engine.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0}")]
    Gateway(#[from] GatewayFailure),
    #[error("no artifact produced: {0}")]
    ExtractionEmpty(String),
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
    #[error("sandbox failed: {0}")]
    Sandbox(String),
}

impl StepError {
    pub(crate) fn prompt(err: anyhow::Error) -> Self {
        StepError::Prompt(format!("{err:#}"))
    }

    pub(crate) fn sandbox(err: anyhow::Error) -> Self {
        StepError::Sandbox(format!("{err:#}"))
    }
}

/// Read-only collaborators shared by every step of a run.
pub struct StepContext<'a, B> {
    pub run_id: &'a str,
    pub gateway: &'a ModelGateway<B>,
    pub prompts: &'a PromptEngine,
    pub models: &'a ModelsConfig,
    pub sandbox: &'a Sandbox,
}

impl<B: CompletionBackend> StepContext<'_, B> {
    /// Send a single-message prompt using the model list configured for `step`.
    pub(crate) async fn complete(&self, step: Step, prompt: String) -> Result<String, GatewayFailure> {
        let Some(settings) = self.models.for_step(step) else {
            return Err(GatewayFailure {
                reason: format!("{step} has no model configuration"),
                last_error: None,
                attempted: Vec::new(),
            });
        };
        self.gateway
            .complete(&[ChatMessage::user(prompt)], &settings.models, settings.temperature)
            .await
    }
}

/// Execute the step named by `state.next_step`.
pub async fn run_step<B: CompletionBackend>(
    ctx: &StepContext<'_, B>,
    state: &WorkflowState,
) -> Result<WorkflowState, StepError> {
    match state.next_step {
        Step::Plan => planner::run(ctx, state).await,
        Step::Route => Ok(state.routed_to(supervisor::decide(ctx, state).await)),
        Step::Generate => coder::run(ctx, state).await,
        Step::Verify => tester::run(ctx, state).await,
        Step::Evaluate => evaluator::run(ctx, state).await,
        Step::Terminate => Ok(state.clone()),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::time::Duration;

    use super::*;
    use crate::io::config::CodeloopConfig;
    use crate::test_support::{ScriptedBackend, test_config};

    /// Owned collaborators for building a [`StepContext`] in unit tests.
    pub(crate) struct Harness {
        pub gateway: ModelGateway<ScriptedBackend>,
        pub prompts: PromptEngine,
        pub config: CodeloopConfig,
        pub sandbox: Sandbox,
        _scratch: tempfile::TempDir,
    }

    impl Harness {
        pub(crate) fn new(backend: ScriptedBackend) -> Self {
            let scratch = tempfile::tempdir().expect("tempdir");
            let config = test_config(scratch.path());
            Self {
                gateway: ModelGateway::new(backend, Duration::ZERO),
                prompts: PromptEngine::new(&config.sandbox).expect("prompts"),
                sandbox: Sandbox::new(config.sandbox.clone()),
                config,
                _scratch: scratch,
            }
        }

        pub(crate) fn ctx(&self) -> StepContext<'_, ScriptedBackend> {
            StepContext {
                run_id: "test-run",
                gateway: &self.gateway,
                prompts: &self.prompts,
                models: &self.config.models,
                sandbox: &self.sandbox,
            }
        }
    }
}
