//! JSON shapes exchanged at the HTTP boundary.

use serde::{Deserialize, Serialize};

use crate::core::types::{Step, WorkflowState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub user_input: String,
}

/// Success body: the authoritative state of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    pub code: String,
    pub tests: String,
    pub evaluation: String,
    pub iterations: u32,
    pub last_agent: String,
}

impl From<&WorkflowState> for RunResponse {
    fn from(state: &WorkflowState) -> Self {
        Self {
            code: state.artifact.clone(),
            tests: state.verification.clone(),
            evaluation: state.assessment.clone(),
            iterations: state.cycle,
            last_agent: state
                .last_step
                .map_or("", Step::agent_name)
                .to_string(),
        }
    }
}

/// Failure body, used only for conditions that produced no final state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            raw_output: None,
        }
    }

    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        self.raw_output = Some(raw.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_maps_state_fields() {
        let mut state = WorkflowState::new("goal", 3);
        state.artifact = "code".to_string();
        state.verification = "tests".to_string();
        state.assessment = "fine".to_string();
        state.cycle = 2;
        let state = state.routed_to(Step::Terminate);

        let body = serde_json::to_value(RunResponse::from(&state)).expect("serialize");
        assert_eq!(
            body,
            json!({
                "code": "code",
                "tests": "tests",
                "evaluation": "fine",
                "iterations": 2,
                "last_agent": "supervisor",
            })
        );
    }

    #[test]
    fn error_omits_missing_raw_output() {
        let body = serde_json::to_value(ErrorResponse::new("boom")).expect("serialize");
        assert_eq!(body, json!({ "error": "boom" }));

        let body = serde_json::to_value(ErrorResponse::new("bad json").with_raw_output("{"))
            .expect("serialize");
        assert_eq!(body, json!({ "error": "bad json", "raw_output": "{" }));
    }
}
