//! Route step: deterministic overrides first, model advice last.

use tracing::{debug, warn};

use crate::agents::StepContext;
use crate::core::router;
use crate::core::types::{Step, WorkflowState};
use crate::io::gateway::CompletionBackend;

/// Decide the next step. Never fails: a missing or garbled advisory falls back to `Generate`.
///
/// Overrides are checked before the model is asked, so a forced step costs no call.
pub async fn decide<B: CompletionBackend>(ctx: &StepContext<'_, B>, state: &WorkflowState) -> Step {
    if let Some(step) = router::override_step(state) {
        debug!(%step, "routing override applied");
        return step;
    }

    let advisory = match ctx.prompts.render_route(state) {
        Ok(prompt) => match ctx.complete(Step::Route, prompt).await {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(err = %err, "route advisory unavailable");
                None
            }
        },
        Err(err) => {
            warn!(err = %format!("{err:#}"), "route prompt failed to render");
            None
        }
    };

    let step = router::route(state, advisory.as_deref());
    debug!(raw = ?advisory, %step, "routing decided by advisory");
    step
}
