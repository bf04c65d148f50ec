//! Plan step: turn the goal into a technical plan.

use tracing::debug;

use crate::agents::{StepContext, StepError};
use crate::core::extract::strip_reasoning;
use crate::core::types::{Step, WorkflowState};
use crate::io::gateway::CompletionBackend;

pub async fn run<B: CompletionBackend>(
    ctx: &StepContext<'_, B>,
    state: &WorkflowState,
) -> Result<WorkflowState, StepError> {
    let prompt = ctx.prompts.render_plan(state).map_err(StepError::prompt)?;
    let reply = ctx.complete(Step::Plan, prompt).await?;
    let plan = strip_reasoning(&reply).trim().to_string();
    if plan.is_empty() {
        return Err(StepError::ExtractionEmpty("plan reply was blank".to_string()));
    }
    debug!(chars = plan.len(), "plan produced");

    let mut next = state.produced_by(Step::Plan);
    next.plan = plan;
    Ok(next)
}
