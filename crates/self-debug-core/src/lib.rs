mod analysis;
mod backend;
mod capture;
mod config;
mod console;
mod error;
mod fix;
mod intercept;
mod present;
mod runner;
mod session;

#[cfg(test)]
mod testing;

pub use analysis::{AnalysisResult, Analyzer, Confidence, MANUAL_REVIEW_REQUIRED, Unavailable};
pub use backend::{
    BackendError, ChatMessage, CompletionBackend, CompletionRequest, OpenAiBackend, Role,
};
pub use capture::{ErrorKind, InvocationContext, SOURCE_UNAVAILABLE, SourceHint, Target};
pub use config::{
    API_KEY_ENV, AnalysisConfig, BASE_URL_ENV, DEBUG_MODE_ENV, FixPromptMode, InterceptionConfig,
    PROJECT_DIR_NAME, ProjectConfig, PromptsConfig, RunnerConfig, SessionConfig, Settings,
    load_project_config,
};
pub use console::{Console, SharedBuffer};
pub use error::CoreError;
pub use fix::apply_fix;
pub use intercept::{Intercepted, Invoke};
pub use present::{ColorMode, present, render_analysis};
pub use runner::{RunOutcome, ScriptRunner};
pub use session::{DebugSession, Disposition};
