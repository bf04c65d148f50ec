//! Generate step: produce the artifact from the plan and the latest feedback.

use tracing::{debug, warn};

use crate::agents::{StepContext, StepError};
use crate::core::extract::first_block;
use crate::core::types::{Step, WorkflowState};
use crate::io::gateway::CompletionBackend;

pub async fn run<B: CompletionBackend>(
    ctx: &StepContext<'_, B>,
    state: &WorkflowState,
) -> Result<WorkflowState, StepError> {
    let prompt = ctx
        .prompts
        .render_generate(state)
        .map_err(StepError::prompt)?;
    let reply = ctx.complete(Step::Generate, prompt).await?;

    let Some(artifact) = first_block(&reply) else {
        warn!(reply_chars = reply.len(), "generate reply had no fenced block");
        return Err(StepError::ExtractionEmpty(
            "generate reply contained no fenced code block".to_string(),
        ));
    };
    debug!(chars = artifact.len(), "artifact produced");

    let mut next = state.produced_by(Step::Generate);
    next.artifact = artifact;
    Ok(next)
}
