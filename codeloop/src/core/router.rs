//! Routing policy for the supervisor step.
//!
//! Deterministic override rules always win. The model's classification is only
//! consulted once none of them applies, and anything it says that cannot be
//! mapped cleanly falls back to `Generate`.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::convergence::limit_reached;
use crate::core::extract::strip_reasoning;
use crate::core::types::{Step, WorkflowState};

/// Options offered to the model, in the exact wording of the route prompt.
pub const ADVICE_OPTIONS: [&str; 4] = ["generate code", "generate tests", "evaluate", "end"];

/// A parsed advisory classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advice {
    GenerateCode,
    GenerateTests,
    Evaluate,
    End,
}

impl Advice {
    pub fn step(self) -> Step {
        match self {
            Advice::GenerateCode => Step::Generate,
            Advice::GenerateTests => Step::Verify,
            Advice::Evaluate => Step::Evaluate,
            Advice::End => Step::Terminate,
        }
    }
}

/// Deterministic rules 1-3. `None` means the advisory path decides.
pub fn override_step(state: &WorkflowState) -> Option<Step> {
    if limit_reached(state) {
        return Some(Step::Terminate);
    }
    if !state.has_artifact() {
        return Some(Step::Generate);
    }
    if !state.has_verification() {
        return Some(Step::Verify);
    }
    None
}

/// Map a parsed advice onto a step, rejecting self-contradictory choices.
pub fn resolve_advice(state: &WorkflowState, advice: Option<Advice>) -> Step {
    match advice {
        Some(Advice::End) if !state.has_assessment() => Step::Generate,
        Some(advice) => advice.step(),
        None => Step::Generate,
    }
}

/// Full routing decision given the raw advisory text (if any was obtained).
pub fn route(state: &WorkflowState, advisory: Option<&str>) -> Step {
    if let Some(step) = override_step(state) {
        return step;
    }
    resolve_advice(state, advisory.and_then(parse_advice))
}

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bgenerate\s+code\b").expect("code pattern is valid"));
static TESTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bgenerate\s+tests?\b").expect("tests pattern is valid"));
static EVALUATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bevaluate\b").expect("evaluate pattern is valid"));
static END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bend\b").expect("end pattern is valid"));

/// Parse free-form model text into one of the four options.
///
/// Returns `None` when no option is named or more than one distinct option is.
pub fn parse_advice(text: &str) -> Option<Advice> {
    let normalized = strip_reasoning(text)
        .to_lowercase()
        .replace(['"', '\'', '`', '*'], " ");
    let normalized = normalized.trim().trim_end_matches(['.', '!']).trim();

    let mentioned: Vec<Advice> = [
        (&*CODE_RE, Advice::GenerateCode),
        (&*TESTS_RE, Advice::GenerateTests),
        (&*EVALUATE_RE, Advice::Evaluate),
        (&*END_RE, Advice::End),
    ]
    .into_iter()
    .filter(|(re, _)| re.is_match(normalized))
    .map(|(_, advice)| advice)
    .collect();

    match mentioned.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}
