//! HTTP route handlers.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use codeloop::api::{ErrorResponse, RunRequest, RunResponse};
use codeloop::engine::RunOutcome;
use codeloop::io::gateway::CompletionBackend;

use crate::state::AppState;

/// Build the application router.
///
/// `/graph` is kept as an alias of `/api/run` for existing clients.
pub fn app_router<B: CompletionBackend + 'static>(state: AppState<B>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/run", post(run_workflow::<B>))
        .route("/graph", post(run_workflow::<B>))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Aborts the run task when dropped (timeout or client disconnect).
struct RunTask(JoinHandle<RunOutcome>);

impl Drop for RunTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn failure(status: StatusCode, body: ErrorResponse) -> Response {
    (status, Json(body)).into_response()
}

/// POST /api/run - run the workflow for `user_input` and return its final state.
async fn run_workflow<B: CompletionBackend + 'static>(
    State(state): State<AppState<B>>,
    body: Bytes,
) -> Response {
    let request: RunRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(err = %err, "rejecting malformed run request");
            return failure(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new(format!("invalid request body: {err}"))
                    .with_raw_output(String::from_utf8_lossy(&body)),
            );
        }
    };
    if request.user_input.trim().is_empty() {
        return failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorResponse::new("user_input must not be empty"),
        );
    }

    let workflow = Arc::clone(&state.workflow);
    let mut task = RunTask(tokio::spawn(async move {
        workflow.run(&request.user_input).await
    }));

    let joined = match state.run_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut task.0).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(timeout_secs = limit.as_secs(), "run timed out, cancelling");
                return failure(
                    StatusCode::GATEWAY_TIMEOUT,
                    ErrorResponse::new(format!("run timed out after {}s", limit.as_secs())),
                );
            }
        },
        None => (&mut task.0).await,
    };

    match joined {
        Ok(outcome) => {
            info!(
                run_id = %outcome.run_id,
                cycle = outcome.final_state.cycle,
                steps = outcome.steps_executed,
                "run finished"
            );
            Json(RunResponse::from(&outcome.final_state)).into_response()
        }
        Err(err) => {
            error!(err = %err, "run task failed");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(format!("run failed: {err}")),
            )
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use codeloop::engine::Workflow;
    use codeloop::test_support::{ScriptedBackend, test_config};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn backend(artifact_reply: &str) -> ScriptedBackend {
        ScriptedBackend::new()
            .reply("plan", "1. add")
            .reply("generate", artifact_reply)
            .reply("verify", "```sh\n. ./solution.sh\n[ \"$(add 1 2)\" = 3 ]\n```")
            .reply("route", "evaluate")
            .reply("evaluate", "Looks right.")
    }

    fn app(scratch: &tempfile::TempDir, backend: ScriptedBackend, timeout: Option<Duration>) -> Router {
        let mut config = test_config(scratch.path());
        config.cycle_limit = 1;
        config.sandbox.timeout_secs = 30;
        let workflow = Workflow::new(backend, config).expect("workflow");
        app_router(AppState::new(workflow, timeout))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let resp = app(&scratch, backend("```sh\nadd() { :; }\n```"), None)
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn run_returns_final_state_on_both_paths() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let router = app(&scratch, backend("```sh\nadd() { echo $(($1 + $2)); }\n```"), None);

        for uri in ["/api/run", "/graph"] {
            let resp = router
                .clone()
                .oneshot(post_json(uri, r#"{"user_input": "adder"}"#))
                .await
                .expect("response");
            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
            let body = body_json(resp).await;
            assert_eq!(body["code"], "add() { echo $(($1 + $2)); }");
            assert_eq!(body["tests"], ". ./solution.sh\n[ \"$(add 1 2)\" = 3 ]");
            assert_eq!(body["evaluation"], "Looks right.");
            assert_eq!(body["iterations"], 1);
            assert_eq!(body["last_agent"], "supervisor");
        }
    }

    #[tokio::test]
    async fn malformed_body_is_unprocessable_with_raw_output() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let resp = app(&scratch, backend("```sh\n:\n```"), None)
            .oneshot(post_json("/api/run", "{not json"))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().expect("error").starts_with("invalid request body"));
        assert_eq!(body["raw_output"], "{not json");
    }

    #[tokio::test]
    async fn blank_input_is_unprocessable() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let resp = app(&scratch, backend("```sh\n:\n```"), None)
            .oneshot(post_json("/graph", r#"{"user_input": "   "}"#))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(resp).await,
            json!({ "error": "user_input must not be empty" })
        );
    }

    #[tokio::test]
    async fn slow_run_times_out_as_gateway_timeout() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let marks = tempfile::tempdir().expect("tempdir");
        let pid_file = marks.path().join("pids");
        let artifact = format!(
            "```sh\necho $$ >> {p}\nsleep 30 &\necho $! >> {p}\nwait\n```",
            p = pid_file.display()
        );
        let router = app(&scratch, backend(&artifact), Some(Duration::from_secs(1)));

        let started = std::time::Instant::now();
        let resp = router
            .oneshot(post_json("/api/run", r#"{"user_input": "hang"}"#))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(10));
        let body = body_json(resp).await;
        assert_eq!(body["error"], "run timed out after 1s");

        // The aborted run takes its sandbox processes with it.
        #[cfg(target_os = "linux")]
        {
            use codeloop::test_support::{parse_pids, wait_for_exit};

            let pids = parse_pids(&std::fs::read_to_string(&pid_file).expect("pid file"));
            assert_eq!(pids.len(), 2, "shell and background sleep pids");
            for pid in pids {
                assert!(wait_for_exit(pid).await, "process {pid} outlived the 504");
            }
        }
    }
}
