//! Semantic checks over the sequence of states a run produced.

use crate::core::graph::{ENTRY, is_allowed};
use crate::core::types::{Step, WorkflowState};

/// Validate a run history (initial state first, then one state per executed step).
///
/// Returns a list of human-readable violations (empty when valid).
pub fn validate_history(initial: &WorkflowState, produced: &[WorkflowState]) -> Vec<String> {
    let mut errors = Vec::new();
    if initial.next_step != ENTRY {
        errors.push(format!(
            "run must start at {ENTRY}, started at {}",
            initial.next_step
        ));
    }
    if initial.cycle != 0 {
        errors.push(format!("run must start at cycle 0, got {}", initial.cycle));
    }

    let mut prev = initial;
    for (index, state) in produced.iter().enumerate() {
        let executed = prev.next_step;
        if state.goal != initial.goal {
            errors.push(format!("state {index}: goal changed"));
        }
        if state.cycle_limit != initial.cycle_limit {
            errors.push(format!("state {index}: cycle_limit changed"));
        }
        if state.cycle > state.cycle_limit {
            errors.push(format!(
                "state {index}: cycle {} exceeds limit {}",
                state.cycle, state.cycle_limit
            ));
        }

        let expected_cycle = if executed == Step::Evaluate {
            prev.cycle + 1
        } else {
            prev.cycle
        };
        if state.cycle != expected_cycle {
            errors.push(format!(
                "state {index}: cycle moved {} -> {} after {executed}",
                prev.cycle, state.cycle
            ));
        }

        if !is_allowed(executed, state.next_step) {
            errors.push(format!(
                "state {index}: illegal transition {executed} -> {}",
                state.next_step
            ));
        }
        if state.last_step != Some(executed) {
            errors.push(format!(
                "state {index}: produced by {executed} but last_step is {:?}",
                state.last_step
            ));
        }
        prev = state;
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initial() -> WorkflowState {
        WorkflowState::new("goal", 2)
    }

    #[test]
    fn accepts_plan_route_generate() {
        let start = initial();
        let planned = start.produced_by(Step::Plan);
        let routed = planned.routed_to(Step::Generate);
        let generated = routed.produced_by(Step::Generate);
        let errors = validate_history(&start, &[planned, routed, generated]);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn reports_cycle_jump_outside_evaluate() {
        let start = initial();
        let mut planned = start.produced_by(Step::Plan);
        planned.cycle = 1;
        let errors = validate_history(&start, &[planned]);
        assert!(errors.iter().any(|err| err.contains("cycle moved")));
    }

    #[test]
    fn reports_missing_cycle_after_evaluate() {
        let start = initial();
        let planned = start.produced_by(Step::Plan);
        let routed = planned.routed_to(Step::Evaluate);
        let evaluated = routed.produced_by(Step::Evaluate);
        let errors = validate_history(&start, &[planned, routed, evaluated]);
        assert!(errors.iter().any(|err| err.contains("after evaluate")));
    }

    #[test]
    fn reports_illegal_transition_and_goal_change() {
        let start = initial();
        let mut planned = start.produced_by(Step::Plan);
        planned.next_step = Step::Evaluate;
        planned.goal = "other".to_string();
        let errors = validate_history(&start, &[planned]);
        assert!(errors.iter().any(|err| err.contains("illegal transition")));
        assert!(errors.iter().any(|err| err.contains("goal changed")));
    }
}
