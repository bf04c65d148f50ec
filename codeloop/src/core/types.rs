//! Shared deterministic types for the workflow core.
//!
//! These types define stable contracts between core components. They do not
//! depend on external state or I/O and serialize to a stable JSON shape.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One state-machine stage of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Plan,
    Route,
    Generate,
    Verify,
    Evaluate,
    Terminate,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Plan,
        Step::Route,
        Step::Generate,
        Step::Verify,
        Step::Evaluate,
        Step::Terminate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Plan => "plan",
            Step::Route => "route",
            Step::Generate => "generate",
            Step::Verify => "verify",
            Step::Evaluate => "evaluate",
            Step::Terminate => "terminate",
        }
    }

    /// Name of the agent role that performs this step (reported as `last_agent`).
    pub fn agent_name(self) -> &'static str {
        match self {
            Step::Plan => "planner",
            Step::Route => "supervisor",
            Step::Generate => "coder",
            Step::Verify => "tester",
            Step::Evaluate => "evaluator",
            Step::Terminate => "end",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single record threaded through a run.
///
/// Empty strings are the "not produced yet" sentinels for `plan`, `artifact`
/// and `verification`. Steps never mutate a state they received: they clone it,
/// fill their field and hand the copy back to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub goal: String,
    pub plan: String,
    pub artifact: String,
    pub verification: String,
    pub assessment: String,
    pub cycle: u32,
    pub cycle_limit: u32,
    pub next_step: Step,
    pub last_step: Option<Step>,
}

impl WorkflowState {
    /// Fresh state at Plan entry.
    pub fn new(goal: impl Into<String>, cycle_limit: u32) -> Self {
        Self {
            goal: goal.into(),
            plan: String::new(),
            artifact: String::new(),
            verification: String::new(),
            assessment: String::new(),
            cycle: 0,
            cycle_limit,
            next_step: Step::Plan,
            last_step: None,
        }
    }

    pub fn has_plan(&self) -> bool {
        !self.plan.trim().is_empty()
    }

    pub fn has_artifact(&self) -> bool {
        !self.artifact.trim().is_empty()
    }

    pub fn has_verification(&self) -> bool {
        !self.verification.trim().is_empty()
    }

    pub fn has_assessment(&self) -> bool {
        !self.assessment.trim().is_empty()
    }

    /// Copy of this state marked as produced by `step`, handing control back to Route.
    pub fn produced_by(&self, step: Step) -> Self {
        Self {
            last_step: Some(step),
            next_step: Step::Route,
            ..self.clone()
        }
    }

    /// Copy of this state carrying a routing decision.
    pub fn routed_to(&self, next: Step) -> Self {
        Self {
            last_step: Some(Step::Route),
            next_step: next,
            ..self.clone()
        }
    }

    /// Copy of this state with a step failure recorded into `assessment`.
    ///
    /// Every other field is left as the failing step received it.
    pub fn with_failure(&self, step: Step, message: &str) -> Self {
        let mut next = self.produced_by(step);
        next.assessment = failure_note(step, message);
        next
    }
}

/// Structured note recorded into `assessment` when a step fails.
pub fn failure_note(step: Step, message: &str) -> String {
    format!("[{step} error] {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_at_plan_with_empty_sentinels() {
        let state = WorkflowState::new("build a calculator", 3);
        assert_eq!(state.next_step, Step::Plan);
        assert_eq!(state.last_step, None);
        assert_eq!(state.cycle, 0);
        assert!(!state.has_plan());
        assert!(!state.has_artifact());
        assert!(!state.has_verification());
        assert!(!state.has_assessment());
    }

    #[test]
    fn whitespace_only_fields_count_as_empty() {
        let mut state = WorkflowState::new("goal", 3);
        state.artifact = "  \n".to_string();
        assert!(!state.has_artifact());
    }

    #[test]
    fn with_failure_keeps_fields_and_returns_to_route() {
        let mut state = WorkflowState::new("goal", 3);
        state.artifact = "print(1)".to_string();
        state.next_step = Step::Generate;

        let failed = state.with_failure(Step::Generate, "all models failed");
        assert_eq!(failed.artifact, "print(1)");
        assert_eq!(failed.next_step, Step::Route);
        assert_eq!(failed.last_step, Some(Step::Generate));
        assert_eq!(failed.assessment, "[generate error] all models failed");
        // The received state is untouched.
        assert_eq!(state.next_step, Step::Generate);
    }

    #[test]
    fn step_serializes_lowercase() {
        let json = serde_json::to_string(&Step::Evaluate).expect("serialize");
        assert_eq!(json, "\"evaluate\"");
        let parsed: Step = serde_json::from_str("\"terminate\"").expect("parse");
        assert_eq!(parsed, Step::Terminate);
    }

    #[test]
    fn agent_names_match_roles() {
        assert_eq!(Step::Route.agent_name(), "supervisor");
        assert_eq!(Step::Generate.agent_name(), "coder");
        assert_eq!(Step::Verify.agent_name(), "tester");
    }
}
