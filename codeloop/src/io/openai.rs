//! OpenAI-compatible chat completions backend (Groq by default).

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::io::config::GatewayConfig;
use crate::io::gateway::{BackendError, ChatMessage, CompletionBackend, CompletionRequest};

pub struct OpenAiBackend {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiBackend {
    /// Build a backend reading the bearer token from `config.api_key_env`.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("environment variable {} is not set", config.api_key_env))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &GatewayConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }
}

impl CompletionBackend for OpenAiBackend {
    #[instrument(skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "completion request failed");
            return Err(classify_status(status, text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| BackendError::InvalidResponse(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(BackendError::EmptyResponse)
    }
}

fn classify_status(status: StatusCode, body: String) -> BackendError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        BackendError::RateLimited(body)
    } else if status.is_server_error() {
        BackendError::Server {
            status: status.as_u16(),
            body,
        }
    } else {
        BackendError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}
