//! Model Gateway: ordered fallback over a completion backend.
//!
//! A single `complete` call walks the model preference list once. Every
//! failure advances to the next model; transient failures (rate limits,
//! overloaded servers, network trouble) also pause for a fixed delay first.
//! Exhausting the list yields a [`GatewayFailure`] value, never a panic.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One backend call against exactly one model identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Failure of a single backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request rejected {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("response carried no completion text")]
    EmptyResponse,
}

impl BackendError {
    /// Whether the same request could plausibly succeed a moment later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::RateLimited(_) | BackendError::Server { .. } | BackendError::Transport(_)
        )
    }
}

/// Language-completion backend seam.
///
/// Implementations hold only read-only client configuration so one backend
/// can serve many concurrent runs.
pub trait CompletionBackend: Send + Sync {
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;
}

impl<B: CompletionBackend> CompletionBackend for Arc<B> {
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<String, BackendError>> + Send {
        (**self).complete(request)
    }
}

/// Every candidate model failed (or none was configured).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}{}", .last_error.as_deref().map(|err| format!(" (last error: {err})")).unwrap_or_default())]
pub struct GatewayFailure {
    pub reason: String,
    pub last_error: Option<String>,
    /// Model identifiers tried, in order.
    pub attempted: Vec<String>,
}

pub struct ModelGateway<B> {
    backend: B,
    transient_delay: Duration,
}

impl<B: CompletionBackend> ModelGateway<B> {
    pub fn new(backend: B, transient_delay: Duration) -> Self {
        Self {
            backend,
            transient_delay,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Try each model in order and return the first successful completion.
    #[instrument(skip_all, fields(candidates = models.len(), temperature = temperature))]
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        models: &[String],
        temperature: f32,
    ) -> Result<String, GatewayFailure> {
        if models.is_empty() {
            return Err(GatewayFailure {
                reason: "no models configured".to_string(),
                last_error: None,
                attempted: Vec::new(),
            });
        }

        let mut attempted = Vec::with_capacity(models.len());
        let mut last_error = None;
        for (index, model) in models.iter().enumerate() {
            let request = CompletionRequest {
                model: model.clone(),
                messages: messages.to_vec(),
                temperature,
            };
            attempted.push(model.clone());
            debug!(%model, "requesting completion");
            match self.backend.complete(&request).await {
                Ok(text) => {
                    debug!(%model, chars = text.len(), "completion received");
                    return Ok(text);
                }
                Err(err) => {
                    let transient = err.is_transient();
                    warn!(%model, transient, err = %err, "model call failed");
                    last_error = Some(err.to_string());
                    let more_candidates = index + 1 < models.len();
                    if transient && more_candidates && !self.transient_delay.is_zero() {
                        tokio::time::sleep(self.transient_delay).await;
                    }
                }
            }
        }

        Err(GatewayFailure {
            reason: format!("all {} models failed", models.len()),
            last_error,
            attempted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedBackend;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    fn prompt() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hello")]
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_past_failing_model() {
        let backend = ScriptedBackend::new()
            .fail("a", BackendError::RateLimited("slow down".to_string()))
            .reply("b", "from b");
        let gateway = ModelGateway::new(backend, Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        let text = gateway
            .complete(&prompt(), &names(&["a", "b"]), 0.2)
            .await
            .expect("fallback succeeds");

        assert_eq!(text, "from b");
        assert_eq!(gateway.backend().called_models(), names(&["a", "b"]));
        // One transient failure with a remaining candidate costs one delay.
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_failure_advances_without_delay() {
        let backend = ScriptedBackend::new()
            .fail(
                "a",
                BackendError::Rejected {
                    status: 401,
                    body: "bad key".to_string(),
                },
            )
            .reply("b", "ok");
        let gateway = ModelGateway::new(backend, Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        let text = gateway
            .complete(&prompt(), &names(&["a", "b"]), 0.2)
            .await
            .expect("fallback succeeds");
        assert_eq!(text, "ok");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_last_error_without_trailing_delay() {
        let backend = ScriptedBackend::new()
            .fail("a", BackendError::Transport("connection reset".to_string()))
            .fail("b", BackendError::RateLimited("quota".to_string()));
        let gateway = ModelGateway::new(backend, Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        let failure = gateway
            .complete(&prompt(), &names(&["a", "b"]), 0.2)
            .await
            .expect_err("all models fail");

        assert_eq!(failure.attempted, names(&["a", "b"]));
        assert_eq!(failure.last_error.as_deref(), Some("rate limited: quota"));
        assert!(failure.to_string().contains("all 2 models failed"));
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn empty_preference_list_is_a_failure_value() {
        let gateway = ModelGateway::new(ScriptedBackend::new(), Duration::ZERO);
        let failure = gateway
            .complete(&prompt(), &[], 0.2)
            .await
            .expect_err("nothing to try");
        assert_eq!(failure.reason, "no models configured");
        assert!(failure.attempted.is_empty());
    }

    #[tokio::test]
    async fn forwards_messages_and_temperature() {
        let backend = ScriptedBackend::new().reply("m", "done");
        let gateway = ModelGateway::new(backend, Duration::ZERO);
        gateway
            .complete(&prompt(), &names(&["m"]), 0.7)
            .await
            .expect("complete");

        let calls = gateway.backend().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].messages, prompt());
        assert_eq!(calls[0].temperature, 0.7);
    }

    #[test]
    fn transient_classification() {
        assert!(BackendError::RateLimited(String::new()).is_transient());
        assert!(
            BackendError::Server {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!BackendError::EmptyResponse.is_transient());
        assert!(
            !BackendError::Rejected {
                status: 400,
                body: String::new()
            }
            .is_transient()
        );
    }
}
