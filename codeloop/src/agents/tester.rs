//! Verify step: produce tests for the current artifact.

use tracing::debug;

use crate::agents::{StepContext, StepError};
use crate::core::extract::{first_block, strip_reasoning};
use crate::core::types::{Step, WorkflowState};
use crate::io::gateway::CompletionBackend;

pub async fn run<B: CompletionBackend>(
    ctx: &StepContext<'_, B>,
    state: &WorkflowState,
) -> Result<WorkflowState, StepError> {
    let prompt = ctx.prompts.render_verify(state).map_err(StepError::prompt)?;
    let reply = ctx.complete(Step::Verify, prompt).await?;

    // Some models answer with bare test code; accept it when no fence is present.
    let verification = match first_block(&reply) {
        Some(block) => block,
        None => strip_reasoning(&reply).trim().to_string(),
    };
    if verification.is_empty() {
        return Err(StepError::ExtractionEmpty(
            "verify reply contained no tests".to_string(),
        ));
    }
    debug!(chars = verification.len(), "verification produced");

    let mut next = state.produced_by(Step::Verify);
    next.verification = verification;
    Ok(next)
}
