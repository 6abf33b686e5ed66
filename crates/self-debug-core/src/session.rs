//! Debug session: the explicit configuration object shared by the
//! interceptor and the script runner.
//!
//! A [`DebugSession`] is built once at startup (from [`Settings`] or with its
//! builder) and passed by reference. It decides whether interception is
//! active and runs the failure pipeline: banner, analysis, presentation and
//! the fix offer.

use std::io::{BufRead, IsTerminal};
use std::sync::Arc;

use crossterm::style::Stylize;
use tracing::{info, instrument, warn};
use typed_builder::TypedBuilder;

use self_debug_pm::PromptManager;

use crate::analysis::{AnalysisResult, Analyzer, Unavailable};
use crate::backend::OpenAiBackend;
use crate::capture::{InvocationContext, Target};
use crate::config::{FixPromptMode, Settings};
use crate::console::Console;
use crate::error::CoreError;
use crate::fix::apply_fix;
use crate::intercept::Intercepted;
use crate::present::present;

const MISSING_KEY_WARNING: &str =
    "Warning: OPENAI_API_KEY not set. Set it in your environment or pass --api-key";

/// What the pipeline did with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Analysis was shown; the original failure is swallowed.
    Handled,
    /// No analysis; the caller re-raises the original failure.
    Unhandled,
}

/// Interception state for one process or one test.
///
/// # Examples
///
/// ```
/// use self_debug_core::{Console, DebugSession};
///
/// let (console, _output) = Console::buffered();
/// let session = DebugSession::builder().console(console).build();
/// assert!(!session.is_active());
/// ```
#[derive(Debug, TypedBuilder)]
pub struct DebugSession {
    #[builder(default = true)]
    enabled: bool,

    /// Absent when no credential is configured.
    #[builder(default, setter(strip_option))]
    analyzer: Option<Analyzer>,

    #[builder(default)]
    console: Console,

    #[builder(default)]
    fix_prompt: FixPromptMode,
}

impl DebugSession {
    /// Build a session from resolved settings.
    ///
    /// Without a credential the session is created without an analyzer and a
    /// warning is printed; failures then propagate unchanged.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Prompt` if a prompt override directory cannot be
    /// loaded and `CoreError::Backend` if the HTTP client cannot be built.
    #[instrument(skip_all, fields(enabled = settings.enabled))]
    pub fn from_settings(settings: &Settings, console: Console) -> Result<Self, CoreError> {
        let analyzer = match settings.api_key.as_deref() {
            Some(api_key) => {
                let mut prompts = PromptManager::new()?;
                for dir in &settings.prompt_dirs {
                    prompts.load_dir(dir)?;
                }
                let backend = OpenAiBackend::new(api_key, settings.analysis.endpoint.clone())?;
                info!(url = backend.url(), model = %settings.analysis.model, "analysis backend configured");
                Some(Analyzer::new(
                    Arc::new(backend),
                    prompts,
                    settings.analysis.clone(),
                ))
            }
            None => {
                warn!("no API key configured, interception is inert");
                if console.color() {
                    console.line(MISSING_KEY_WARNING.yellow().to_string());
                } else {
                    console.line(MISSING_KEY_WARNING);
                }
                None
            }
        };

        Ok(Self {
            enabled: settings.enabled,
            analyzer,
            console,
            fix_prompt: settings.fix_prompt,
        })
    }

    /// Wrap a target so its failures go through this session.
    pub fn intercept<F>(&self, target: Target<F>) -> Intercepted<'_, F> {
        Intercepted::new(self, target)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn analyzer(&self) -> Option<&Analyzer> {
        self.analyzer.as_ref()
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn fix_prompt(&self) -> FixPromptMode {
        self.fix_prompt
    }

    /// Interception is active when enabled and an analyzer is configured.
    pub fn is_active(&self) -> bool {
        self.enabled && self.analyzer.is_some()
    }

    /// Analyze one captured failure without printing anything.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable::NotConfigured` when the session has no analyzer,
    /// and the analyzer's error when the prompt or the request fails.
    pub async fn analyze(&self, ctx: &InvocationContext) -> Result<AnalysisResult, Unavailable> {
        let analyzer = self.analyzer.as_ref().ok_or(Unavailable::NotConfigured)?;
        analyzer.analyze(ctx).await
    }

    /// Run the failure pipeline for one captured failure.
    #[instrument(skip_all, fields(function = %ctx.function_name(), kind = %ctx.error_kind()))]
    pub async fn handle(&self, ctx: &InvocationContext) -> Disposition {
        if !self.is_active() {
            return Disposition::Unhandled;
        }

        self.print_banner(ctx);

        match self.analyze(ctx).await {
            Ok(result) => {
                present(&self.console, &result);
                if self.accept_fix().await {
                    apply_fix(&self.console, &result, ctx);
                }
                info!("failure handled by analysis");
                Disposition::Handled
            }
            Err(e) => {
                self.notice(&format!("Error calling analysis backend: {e}"), false);
                self.notice("Could not analyze error. Re-raising original error.", true);
                Disposition::Unhandled
            }
        }
    }

    fn print_banner(&self, ctx: &InvocationContext) {
        let lines = [
            "\n🚨 Error occurred!".to_owned(),
            format!("Function: {}", ctx.function_name()),
            format!("Error: {}: {}", ctx.error_kind(), ctx.error_message()),
        ];
        for line in lines {
            if self.console.color() {
                self.console.line(line.red().to_string());
            } else {
                self.console.line(line);
            }
        }
    }

    fn notice(&self, text: &str, soft: bool) {
        if !self.console.color() {
            self.console.line(text);
        } else if soft {
            self.console.line(text.yellow().to_string());
        } else {
            self.console.line(text.red().to_string());
        }
    }

    async fn accept_fix(&self) -> bool {
        match self.fix_prompt {
            FixPromptMode::Never => false,
            FixPromptMode::Always => true,
            FixPromptMode::Ask => {
                if !std::io::stdin().is_terminal() {
                    return false;
                }
                self.console
                    .write("\nWould you like to apply the suggested fix? [y/N]: ");
                let answer = tokio::task::spawn_blocking(|| {
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line).map(|_| line)
                })
                .await;
                match answer {
                    Ok(Ok(line)) => is_yes(&line),
                    Ok(Err(e)) => {
                        warn!(error = %e, "failed to read fix confirmation");
                        false
                    }
                    Err(e) => {
                        warn!(error = %e, "fix confirmation task failed");
                        false
                    }
                }
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
