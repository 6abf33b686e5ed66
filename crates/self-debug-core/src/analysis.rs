//! Analysis client adapter.
//!
//! Turns an [`InvocationContext`] into one completion request and decodes
//! the response into an [`AnalysisResult`]. Decoding never fails: text that
//! is not a structured result becomes a fallback result carrying the raw
//! text. Missing configuration and failed requests surface as
//! [`Unavailable`] so the caller can re-raise the original failure.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use self_debug_pm::{ANALYSIS_SYSTEM, ANALYSIS_USER, PmError, PromptManager};

use crate::backend::{BackendError, CompletionBackend, CompletionRequest};
use crate::capture::InvocationContext;
use crate::config::AnalysisConfig;

/// `suggested_fix` of a fallback result.
pub const MANUAL_REVIEW_REQUIRED: &str = "Manual review required";

/// Confidence reported by the backend.
///
/// Unrecognized values are kept verbatim in [`Confidence::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Confidence {
    High,
    Medium,
    Low,
    Other(String),
}

impl From<String> for Confidence {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Other(value),
        }
    }
}

impl From<Confidence> for String {
    fn from(value: Confidence) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("high"),
            Self::Medium => f.write_str("medium"),
            Self::Low => f.write_str("low"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

/// Structured explanation of a failure.
///
/// `None` means the backend did not report the field; the presenter skips it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

impl AnalysisResult {
    /// Result used when the response is not a structured object.
    pub fn fallback(raw: impl Into<String>) -> Self {
        Self {
            explanation: Some(raw.into()),
            suggested_fix: Some(MANUAL_REVIEW_REQUIRED.to_owned()),
            confidence: Some(Confidence::Medium),
            ..Self::default()
        }
    }

    /// Decode a response, falling back to [`AnalysisResult::fallback`].
    ///
    /// The whole text must be one JSON object; a response that is a single
    /// fenced code block is unwrapped first.
    pub fn parse(content: &str) -> Self {
        if let Ok(result) = serde_json::from_str::<Self>(content) {
            return result;
        }
        if let Some(inner) = strip_code_fence(content)
            && let Ok(result) = serde_json::from_str::<Self>(inner)
        {
            return result;
        }
        debug!("analysis response is not structured, using fallback");
        Self::fallback(content)
    }
}

/// Body of a response that consists of exactly one fenced code block.
fn strip_code_fence(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    let without_open = trimmed.strip_prefix("```")?;
    let body_start = without_open.find('\n')? + 1;
    let body = without_open[body_start..].strip_suffix("```")?;
    (!body.contains("```")).then_some(body.trim())
}

/// Why no analysis could be produced.
#[derive(Debug, Error)]
pub enum Unavailable {
    #[error("no analysis backend is configured")]
    NotConfigured,

    #[error("failed to build analysis prompt: {0}")]
    Prompt(#[from] PmError),

    #[error("analysis request failed: {0}")]
    Request(#[from] BackendError),
}

/// Builds prompts, calls the backend once, and decodes the answer.
pub struct Analyzer {
    backend: Arc<dyn CompletionBackend>,
    prompts: PromptManager,
    settings: AnalysisConfig,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("backend", &self.backend.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Analyzer {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        prompts: PromptManager,
        settings: AnalysisConfig,
    ) -> Self {
        Self {
            backend,
            prompts,
            settings,
        }
    }

    pub fn settings(&self) -> &AnalysisConfig {
        &self.settings
    }

    /// Render the system and user prompts for a failure.
    ///
    /// # Errors
    ///
    /// Returns `PmError` if either template fails to render.
    pub fn build_request(&self, ctx: &InvocationContext) -> Result<CompletionRequest, PmError> {
        let vars = ctx.prompt_context();
        let system = self.prompts.render(ANALYSIS_SYSTEM, &vars)?;
        let user = self.prompts.render(ANALYSIS_USER, &vars)?;
        Ok(CompletionRequest::new(&self.settings, system, user))
    }

    /// Analyze one failure with a single backend request.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable::Prompt` if the prompt cannot be rendered and
    /// `Unavailable::Request` if the request fails. A response that is not
    /// structured is not an error.
    #[instrument(skip_all, fields(function = %ctx.function_name(), backend = self.backend.name()))]
    pub async fn analyze(&self, ctx: &InvocationContext) -> Result<AnalysisResult, Unavailable> {
        let request = self.build_request(ctx)?;
        let content = self.backend.complete(request).await.map_err(|e| {
            error!(error = %e, "analysis request failed");
            Unavailable::Request(e)
        })?;
        info!(chars = content.len(), "analysis received");
        Ok(AnalysisResult::parse(&content))
    }
}
