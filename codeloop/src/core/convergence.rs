//! Cycle bookkeeping and final-state selection.

use crate::core::types::WorkflowState;

/// True once the run has used every permitted Evaluate cycle.
pub fn limit_reached(state: &WorkflowState) -> bool {
    state.cycle >= state.cycle_limit
}

/// Record one completed Evaluate step.
///
/// Called by the engine exactly once per Evaluate, after the step returns and
/// before control goes back to Route.
pub fn complete_cycle(state: &mut WorkflowState) {
    state.cycle = state.cycle.saturating_add(1);
}

/// Pick the authoritative state among everything a run produced.
///
/// The highest `cycle` wins; among equals the latest produced state wins.
pub fn select_final(states: &[WorkflowState]) -> Option<&WorkflowState> {
    states.iter().max_by_key(|state| state.cycle)
}
