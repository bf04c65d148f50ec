//! Workflow engine: drives one run from Plan to Terminate.
//!
//! The engine owns the only mutable copy of a run's state. Each step gets the
//! current state by reference and hands back a new one; step failures are
//! recorded into `assessment` and the run continues at Route. Two bounds make
//! every run finite no matter what the models say: the cycle limit enforced by
//! the router, and a step budget checked each time control returns to Route.

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::agents::{StepContext, run_step};
use crate::api::RunResponse;
use crate::core::convergence::{complete_cycle, select_final};
use crate::core::graph::validate_table;
use crate::core::invariants::validate_history;
use crate::core::types::{Step, WorkflowState, failure_note};
use crate::io::config::CodeloopConfig;
use crate::io::gateway::{CompletionBackend, ModelGateway};
use crate::io::openai::OpenAiBackend;
use crate::io::prompt::PromptEngine;
use crate::io::run_log::RunLog;
use crate::io::sandbox::Sandbox;

/// Failure to assemble a workflow. Nothing else escapes the engine.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("prompt templates failed to load: {0}")]
    Prompts(String),
    #[error("step graph is invalid: {0}")]
    Graph(String),
    #[error("model backend unavailable: {0}")]
    Backend(String),
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// The router chose Terminate (cycle limit or advisory `end`).
    Terminated,
    /// `max_steps` ran out; the engine routed to Terminate itself.
    StepBudgetExhausted,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    /// Authoritative state: highest cycle, latest among equals.
    pub final_state: WorkflowState,
    /// Every state produced by the run, in order (the initial state excluded).
    pub history: Vec<WorkflowState>,
    pub steps_executed: u32,
    pub stop: RunStop,
}

pub struct Workflow<B> {
    gateway: ModelGateway<B>,
    prompts: PromptEngine,
    sandbox: Sandbox,
    config: CodeloopConfig,
}

/// Build a workflow against the configured OpenAI-compatible endpoint.
pub fn connect(config: CodeloopConfig) -> Result<Workflow<OpenAiBackend>, InitError> {
    config
        .validate()
        .map_err(|err| InitError::Config(format!("{err:#}")))?;
    let backend =
        OpenAiBackend::new(&config.gateway).map_err(|err| InitError::Backend(format!("{err:#}")))?;
    Workflow::new(backend, config)
}

impl<B: CompletionBackend> Workflow<B> {
    pub fn new(backend: B, config: CodeloopConfig) -> Result<Self, InitError> {
        let graph_errors = validate_table();
        if !graph_errors.is_empty() {
            return Err(InitError::Graph(graph_errors.join("; ")));
        }
        config
            .validate()
            .map_err(|err| InitError::Config(format!("{err:#}")))?;
        let prompts = PromptEngine::new(&config.sandbox)
            .map_err(|err| InitError::Prompts(format!("{err:#}")))?;
        Ok(Self {
            gateway: ModelGateway::new(backend, config.gateway.transient_delay()),
            prompts,
            sandbox: Sandbox::new(config.sandbox.clone()),
            config,
        })
    }

    pub fn backend(&self) -> &B {
        self.gateway.backend()
    }

    pub async fn run(&self, goal: &str) -> RunOutcome {
        self.run_with(goal, |_| {}).await
    }

    /// Run to completion, calling `on_step` with every produced state.
    pub async fn run_with<F: FnMut(&WorkflowState)>(&self, goal: &str, on_step: F) -> RunOutcome {
        let run_id = Uuid::new_v4().to_string();
        self.drive(run_id, goal, on_step).await
    }

    #[instrument(skip_all, fields(run_id = %run_id))]
    async fn drive<F: FnMut(&WorkflowState)>(
        &self,
        run_id: String,
        goal: &str,
        mut on_step: F,
    ) -> RunOutcome {
        let initial = WorkflowState::new(goal, self.config.cycle_limit);
        let run_log = self
            .config
            .run_log_dir
            .as_deref()
            .map(|dir| RunLog::new(dir, &run_id));
        let ctx = StepContext {
            run_id: &run_id,
            gateway: &self.gateway,
            prompts: &self.prompts,
            models: &self.config.models,
            sandbox: &self.sandbox,
        };
        info!(cycle_limit = initial.cycle_limit, "run started");

        let mut history: Vec<WorkflowState> = Vec::new();
        let mut state = initial.clone();
        let mut steps_executed = 0u32;
        let mut stop = RunStop::Terminated;

        while state.next_step != Step::Terminate {
            let step = state.next_step;
            let next = if step == Step::Route && steps_executed >= self.config.max_steps {
                warn!(
                    steps_executed,
                    max_steps = self.config.max_steps,
                    "step budget exhausted, terminating"
                );
                stop = RunStop::StepBudgetExhausted;
                self.exhausted(&state)
            } else {
                info!(%step, cycle = state.cycle, "step started");
                let mut next = match run_step(&ctx, &state).await {
                    Ok(next) => next,
                    Err(err) => {
                        warn!(%step, err = %err, "step failed, recorded into assessment");
                        state.with_failure(step, &err.to_string())
                    }
                };
                if step == Step::Evaluate {
                    complete_cycle(&mut next);
                }
                steps_executed += 1;
                next
            };
            debug!(%step, next = %next.next_step, cycle = next.cycle, "state produced");

            if let Some(log) = &run_log {
                let index = u32::try_from(history.len() + 1).unwrap_or(u32::MAX);
                if let Err(err) = log.write_step(index, step, &next) {
                    warn!(err = %format!("{err:#}"), "failed to write run log entry");
                }
            }
            on_step(&next);
            history.push(next.clone());
            state = next;
        }

        let final_state = select_final(&history).cloned().unwrap_or(state);
        for violation in validate_history(&initial, &history) {
            error!(%violation, "run history violates workflow invariants");
        }
        if let Some(log) = &run_log
            && let Err(err) = log.write_final(&RunResponse::from(&final_state))
        {
            warn!(err = %format!("{err:#}"), "failed to write final run log entry");
        }
        info!(
            steps_executed,
            cycle = final_state.cycle,
            ?stop,
            "run finished"
        );

        RunOutcome {
            run_id,
            final_state,
            history,
            steps_executed,
            stop,
        }
    }

    /// Route decision forced by the step budget.
    fn exhausted(&self, state: &WorkflowState) -> WorkflowState {
        let note = failure_note(
            Step::Route,
            &format!("step budget of {} steps exhausted", self.config.max_steps),
        );
        let mut next = state.routed_to(Step::Terminate);
        next.assessment = if state.has_assessment() {
            format!("{}\n\n{note}", state.assessment.trim_end())
        } else {
            note
        };
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::gateway::BackendError;
    use crate::test_support::{ScriptedBackend, test_config};

    const ARTIFACT_REPLY: &str = "```sh\nadd() { echo $(($1 + $2)); }\n```";
    const TESTS_REPLY: &str = "```sh\n. ./solution.sh\n[ \"$(add 1 2)\" = 3 ]\n```";

    fn happy_backend() -> ScriptedBackend {
        ScriptedBackend::new()
            .reply("plan", "1. add two numbers")
            .reply("generate", ARTIFACT_REPLY)
            .reply("verify", TESTS_REPLY)
            .reply("route", "evaluate")
            .reply("evaluate", "Works.")
    }

    #[tokio::test]
    async fn runs_until_cycle_limit() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let config = CodeloopConfig {
            cycle_limit: 2,
            ..test_config(scratch.path())
        };
        let workflow = Workflow::new(happy_backend(), config).expect("workflow");

        let outcome = workflow.run("add numbers").await;
        assert_eq!(outcome.stop, RunStop::Terminated);
        assert_eq!(outcome.final_state.cycle, 2);
        assert_eq!(outcome.final_state.next_step, Step::Terminate);
        assert_eq!(outcome.final_state.last_step, Some(Step::Route));
        assert_eq!(outcome.final_state.assessment, "Works.");
        assert!(validate_history(&WorkflowState::new("add numbers", 2), &outcome.history).is_empty());

        let executed: Vec<Step> = outcome
            .history
            .iter()
            .filter_map(|state| state.last_step)
            .collect();
        assert_eq!(
            executed,
            vec![
                Step::Plan,
                Step::Route,
                Step::Generate,
                Step::Route,
                Step::Verify,
                Step::Route,
                Step::Evaluate,
                Step::Route,
                Step::Evaluate,
                Step::Route,
            ]
        );
        assert_eq!(outcome.steps_executed, 10);
    }

    #[tokio::test]
    async fn failed_steps_are_recorded_and_bounded_by_step_budget() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let config = CodeloopConfig {
            max_steps: 7,
            ..test_config(scratch.path())
        };
        let backend = ScriptedBackend::new()
            .reply("plan", "plan")
            .fail("generate", BackendError::Transport("unreachable".to_string()));
        let workflow = Workflow::new(backend, config).expect("workflow");

        let outcome = workflow.run("goal").await;
        assert_eq!(outcome.stop, RunStop::StepBudgetExhausted);
        assert_eq!(outcome.steps_executed, 7);
        assert_eq!(outcome.final_state.next_step, Step::Terminate);
        assert_eq!(outcome.final_state.cycle, 0);
        assert!(outcome.final_state.artifact.is_empty());
        assert!(
            outcome
                .final_state
                .assessment
                .contains("[generate error] all 1 models failed")
        );
        assert!(
            outcome
                .final_state
                .assessment
                .ends_with("[route error] step budget of 7 steps exhausted")
        );
    }

    #[tokio::test]
    async fn writes_run_log_when_configured() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let logs = tempfile::tempdir().expect("tempdir");
        let config = CodeloopConfig {
            cycle_limit: 1,
            run_log_dir: Some(logs.path().to_path_buf()),
            ..test_config(scratch.path())
        };
        let workflow = Workflow::new(happy_backend(), config).expect("workflow");

        let outcome = workflow.run("add numbers").await;
        let log = RunLog::new(logs.path(), &outcome.run_id);
        assert!(log.step_path(1, Step::Plan).exists());
        assert!(log.step_path(7, Step::Evaluate).exists());
        let final_json = std::fs::read_to_string(log.final_path()).expect("final");
        let parsed: serde_json::Value = serde_json::from_str(&final_json).expect("json");
        assert_eq!(parsed["iterations"], 1);
        assert_eq!(parsed["last_agent"], "supervisor");
    }

    #[tokio::test]
    async fn on_step_sees_every_state() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let config = CodeloopConfig {
            cycle_limit: 1,
            ..test_config(scratch.path())
        };
        let workflow = Workflow::new(happy_backend(), config).expect("workflow");

        let mut seen = Vec::new();
        let outcome = workflow
            .run_with("add numbers", |state| seen.push(state.clone()))
            .await;
        assert_eq!(seen, outcome.history);
    }

    #[test]
    fn invalid_config_fails_initialization() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let config = CodeloopConfig {
            cycle_limit: 0,
            ..test_config(scratch.path())
        };
        let err = Workflow::new(ScriptedBackend::new(), config)
            .err()
            .expect("invalid config");
        assert!(matches!(err, InitError::Config(_)));
    }
}
