//! Evaluate step: run the artifact and its tests, then ask for feedback.
//!
//! Non-zero exits and timeouts are evaluation signal and flow into the prompt
//! as plain reports. If the model cannot be reached, the reports themselves
//! become the assessment so the next Generate still sees what went wrong.

use tracing::{debug, info, warn};

use crate::agents::{StepContext, StepError};
use crate::core::extract::strip_reasoning;
use crate::core::types::{Step, WorkflowState, failure_note};
use crate::io::gateway::CompletionBackend;
use crate::io::prompt::EvaluationReports;
use crate::io::sandbox::RunKind;

pub async fn run<B: CompletionBackend>(
    ctx: &StepContext<'_, B>,
    state: &WorkflowState,
) -> Result<WorkflowState, StepError> {
    let executed = ctx
        .sandbox
        .run(ctx.run_id, &state.artifact, RunKind::Execute)
        .await
        .map_err(StepError::sandbox)?;
    let tested = ctx
        .sandbox
        .run_tests(ctx.run_id, &state.verification, &state.artifact)
        .await
        .map_err(StepError::sandbox)?;
    info!(
        execute_exit = executed.exit_code,
        execute_timed_out = executed.timed_out,
        test_exit = tested.exit_code,
        test_timed_out = tested.timed_out,
        "sandbox reports collected"
    );

    let execute_report = executed.report();
    let test_report = tested.report();
    let sandbox_summary = format!("{execute_report}\n\n{test_report}");

    let prompt = ctx
        .prompts
        .render_evaluate(
            state,
            EvaluationReports {
                execute: &execute_report,
                test: &test_report,
            },
        )
        .map_err(StepError::prompt)?;

    let mut next = state.produced_by(Step::Evaluate);
    next.assessment = match ctx.complete(Step::Evaluate, prompt).await {
        Ok(reply) => {
            let feedback = strip_reasoning(&reply).trim().to_string();
            if feedback.is_empty() {
                warn!("evaluate reply was blank");
                format!(
                    "{sandbox_summary}\n\n{}",
                    failure_note(Step::Evaluate, "evaluation reply was blank")
                )
            } else {
                debug!(chars = feedback.len(), "assessment produced");
                feedback
            }
        }
        Err(err) => {
            warn!(err = %err, "evaluation feedback unavailable");
            format!(
                "{sandbox_summary}\n\n{}",
                failure_note(Step::Evaluate, &err.to_string())
            )
        }
    };
    Ok(next)
}
