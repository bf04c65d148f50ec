//! Fixed transition table of the workflow state machine.

use crate::core::types::Step;

/// Entry point of every run.
pub const ENTRY: Step = Step::Plan;

/// Steps reachable from `step` in one transition.
pub fn successors(step: Step) -> &'static [Step] {
    match step {
        Step::Plan | Step::Generate | Step::Verify | Step::Evaluate => &[Step::Route],
        Step::Route => &[
            Step::Generate,
            Step::Verify,
            Step::Evaluate,
            Step::Terminate,
        ],
        Step::Terminate => &[],
    }
}

pub fn is_allowed(from: Step, to: Step) -> bool {
    successors(from).contains(&to)
}

/// Check that the table forms a usable graph: every non-terminal step can move,
/// only `Terminate` is terminal, and `Terminate` is reachable from the entry.
///
/// Returns a list of human-readable violations (empty when valid).
pub fn validate_table() -> Vec<String> {
    let mut errors = Vec::new();
    for step in Step::ALL {
        let next = successors(step);
        if step == Step::Terminate {
            if !next.is_empty() {
                errors.push("terminate must not have successors".to_string());
            }
            continue;
        }
        if next.is_empty() {
            errors.push(format!("{step} has no successors"));
        }
        if next.contains(&ENTRY) {
            errors.push(format!("{step} must not re-enter {ENTRY}"));
        }
    }

    let mut seen = vec![ENTRY];
    let mut frontier = vec![ENTRY];
    while let Some(step) = frontier.pop() {
        for &next in successors(step) {
            if !seen.contains(&next) {
                seen.push(next);
                frontier.push(next);
            }
        }
    }
    if !seen.contains(&Step::Terminate) {
        errors.push(format!("terminate is unreachable from {ENTRY}"));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_valid() {
        assert!(validate_table().is_empty());
    }

    #[test]
    fn work_steps_return_to_route() {
        for step in [Step::Plan, Step::Generate, Step::Verify, Step::Evaluate] {
            assert_eq!(successors(step), &[Step::Route]);
        }
    }

    #[test]
    fn route_cannot_replan_or_route_again() {
        assert!(!is_allowed(Step::Route, Step::Plan));
        assert!(!is_allowed(Step::Route, Step::Route));
        assert!(is_allowed(Step::Route, Step::Terminate));
    }

    #[test]
    fn terminate_is_terminal() {
        assert!(successors(Step::Terminate).is_empty());
    }
}
