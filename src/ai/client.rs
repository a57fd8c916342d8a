// src/ai/client.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;

/// Errors from the AI provider boundary.
#[derive(Debug)]
pub enum AiError {
    /// No API key configured; callers should use their fallback path.
    NotConfigured,
    /// Transport-level failure (connect, timeout, TLS).
    Http(String),
    /// The provider answered with a non-success status.
    Upstream { status: u16, body: String },
    /// The provider answered 200 but the payload was not usable.
    Malformed(String),
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiError::NotConfigured => write!(f, "AI provider is not configured"),
            AiError::Http(msg) => write!(f, "AI request failed: {}", msg),
            AiError::Upstream { status, body } => {
                write!(f, "AI provider returned {}: {}", status, body)
            }
            AiError::Malformed(msg) => write!(f, "AI response was malformed: {}", msg),
        }
    }
}

impl std::error::Error for AiError {}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        AiError::Http(err.to_string())
    }
}

/// One message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatTurn>,
    /// Ask the provider for a guaranteed-JSON body (generation and grading).
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatTurn>) -> Self {
        Self { messages, json_mode: false }
    }

    pub fn json(messages: Vec<ChatTurn>) -> Self {
        Self { messages, json_mode: true }
    }
}

/// Seam for the completion provider, so tests can swap in a scripted backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Runs a completion to the end and returns the assistant text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError>;

    /// Opens a streaming completion and returns the provider's raw SSE bytes.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<Bytes, AiError>>, AiError>;

    fn name(&self) -> &str;
}

/// OpenAI-compatible chat completions backend.
pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self { http: reqwest::Client::new(), api_key, base_url, model }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": stream,
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(60))
            .json(&self.request_body(&request, false))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Upstream { status: status.as_u16(), body });
        }

        let payload: serde_json::Value = response.json().await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AiError::Malformed("missing choices[0].message.content".to_string()))
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<Bytes, AiError>>, AiError> {
        // No per-request timeout here: a tutoring stream legitimately stays
        // open for as long as the model keeps talking.
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&request, true))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Upstream { status: status.as_u16(), body });
        }

        Ok(response.bytes_stream().map(|chunk| chunk.map_err(AiError::from)).boxed())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Handle the rest of the app talks to. Cheap to clone; `None` inside means
/// every AI feature runs its deterministic fallback.
#[derive(Clone)]
pub struct AiClient {
    backend: Option<Arc<dyn CompletionBackend>>,
}

impl AiClient {
    pub fn from_config(config: &Config) -> Self {
        match &config.openai_api_key {
            Some(key) => {
                tracing::info!(model = %config.openai_model, "AI provider configured");
                Self {
                    backend: Some(Arc::new(OpenAiBackend::new(
                        key.clone(),
                        config.openai_base_url.clone(),
                        config.openai_model.clone(),
                    ))),
                }
            }
            None => {
                tracing::warn!("OPENAI_API_KEY not set, AI features run in fallback mode");
                Self { backend: None }
            }
        }
    }

    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend: Some(backend) }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<String, AiError> {
        match &self.backend {
            Some(backend) => backend.complete(request).await,
            None => Err(AiError::NotConfigured),
        }
    }

    pub async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<Bytes, AiError>>, AiError> {
        match &self.backend {
            Some(backend) => backend.stream(request).await,
            None => Err(AiError::NotConfigured),
        }
    }
}
