//! Completion backend boundary.
//!
//! [`CompletionBackend`] is the seam between the analysis pipeline and the
//! text-completion service. [`OpenAiBackend`] talks to any OpenAI-compatible
//! chat-completions endpoint. Each call is exactly one HTTP request: no
//! retry, no backoff, no local timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::AnalysisConfig;

/// Maximum number of response-body characters kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion response contained no message content")]
    EmptyResponse,
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message of a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// A single completion request: fixed system instruction plus one user message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(settings: &AnalysisConfig, system: String, user: String) -> Self {
        Self {
            model: settings.model.clone(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: system,
                },
                ChatMessage {
                    role: Role::User,
                    content: user,
                },
            ],
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

/// A text-completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Send one request and return the response text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError>;
}

/// OpenAI-compatible chat-completions backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OpenAiBackend {
    /// Create a backend for `url` authenticated with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, url: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// First choice's message content of a chat-completions response.
fn first_choice_content(response: ChatResponse) -> Result<String, BackendError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or(BackendError::EmptyResponse)
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.to_owned()
    } else {
        let head: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{head}...")
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    #[instrument(skip_all, fields(url = %self.url, model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = first_choice_content(parsed)?;
        debug!(chars = content.len(), "received completion");
        Ok(content)
    }
}
