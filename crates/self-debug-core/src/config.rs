//! Configuration types for self-debug-core.
//!
//! [`SessionConfig`] carries CLI-level overrides, [`ProjectConfig`] is read
//! from `.self-debug/config.yaml`, and [`Settings`] is the merged result a
//! [`DebugSession`](crate::DebugSession) is built from. Precedence, highest
//! first: CLI overrides, environment variables, the project file, defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::CoreError;

/// Environment variable holding the completion-service credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable toggling interception (`"true"` enables).
pub const DEBUG_MODE_ENV: &str = "SELF_DEBUG_MODE";

/// Environment variable holding the API base URL (e.g. `https://api.openai.com/v1`).
/// `/chat/completions` is appended to it.
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Directory holding the project file, prompt overrides and logs.
pub const PROJECT_DIR_NAME: &str = ".self-debug";

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

// ── Session Configuration (CLI-level) ────────────────────────

/// Session configuration provided by the CLI layer.
///
/// Every override is optional; unset values fall through to the environment
/// and then to [`ProjectConfig`].
///
/// # Examples
///
/// ```
/// use self_debug_core::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .api_key("sk-test".to_owned())
///     .enabled(false)
///     .build();
/// assert_eq!(config.enabled(), Some(false));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct SessionConfig {
    /// Directory that contains `.self-debug/` (defaults to the current directory).
    #[builder(default = PathBuf::from("."), setter(into))]
    project_dir: PathBuf,

    /// Credential override. Never serialized.
    #[builder(default, setter(into))]
    #[serde(skip_serializing, default)]
    api_key: Option<String>,

    /// Interception on/off override.
    #[builder(default, setter(into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,

    /// Model override.
    #[builder(default, setter(into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,

    /// Explicit path to the project file.
    #[builder(default, setter(into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    config_path: Option<PathBuf>,
}

impl SessionConfig {
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn enabled(&self) -> Option<bool> {
        self.enabled
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Returns the `.self-debug` directory under the project directory.
    pub fn self_debug_dir(&self) -> PathBuf {
        self.project_dir.join(PROJECT_DIR_NAME)
    }

    /// Returns the project file path: the explicit one, or
    /// `.self-debug/config.yaml`.
    pub fn config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| self.self_debug_dir().join("config.yaml"))
    }
}

// ── Project Configuration (.self-debug/config.yaml) ──────────

/// Project-level configuration, deserialized from `.self-debug/config.yaml`.
///
/// All fields have serde defaults so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub interception: InterceptionConfig,

    #[serde(default)]
    pub prompts: PromptsConfig,

    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Completion request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Full chat-completions endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output-length cap for the analysis response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Interception switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub fix_prompt: FixPromptMode,
}

impl Default for InterceptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fix_prompt: FixPromptMode::default(),
        }
    }
}

/// Whether the "apply the suggested fix?" offer is shown after an analysis.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FixPromptMode {
    /// Ask on an interactive terminal; decline otherwise (default).
    #[default]
    Ask,
    /// Accept without asking.
    Always,
    /// Never offer.
    Never,
}

/// Prompt template override directories, searched in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsConfig {
    #[serde(default)]
    pub include: Vec<PathBuf>,
}

/// Script runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Interpreter command per file extension (e.g. `py: python3`).
    #[serde(default = "default_interpreters")]
    pub interpreters: BTreeMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreters: default_interpreters(),
        }
    }
}

impl RunnerConfig {
    /// Interpreter command words for a script, chosen by its extension.
    pub fn interpreter_for(&self, script: &Path) -> Option<Vec<String>> {
        let ext = script.extension()?.to_str()?;
        let command = self.interpreters.get(ext)?;
        let words: Vec<String> = command.split_whitespace().map(String::from).collect();
        (!words.is_empty()).then_some(words)
    }
}

// ── Default value functions for serde ────────────────────────

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "gpt-4".to_owned()
}

fn default_endpoint() -> String {
    chat_completions_url(DEFAULT_API_BASE)
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_interpreters() -> BTreeMap<String, String> {
    [("py", "python3"), ("sh", "sh"), ("js", "node"), ("rb", "ruby")]
        .into_iter()
        .map(|(ext, cmd)| (ext.to_owned(), cmd.to_owned()))
        .collect()
}

/// Chat-completions endpoint under an API base URL.
fn chat_completions_url(base: &str) -> String {
    format!("{}/chat/completions", base.trim_end_matches('/'))
}

// ── Config loading ───────────────────────────────────────────

/// Load [`ProjectConfig`] from a YAML file.
///
/// If the file does not exist, returns the default configuration.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file exists but cannot be read.
/// Returns `CoreError::Yaml` if the file contains invalid YAML.
pub fn load_project_config(config_path: &Path) -> Result<ProjectConfig, CoreError> {
    if !config_path.exists() {
        return Ok(ProjectConfig::default());
    }
    let content = std::fs::read_to_string(config_path)?;
    if content.trim().is_empty() {
        return Ok(ProjectConfig::default());
    }
    let config: ProjectConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

// ── Merged settings ──────────────────────────────────────────

/// Fully resolved settings for one debug session.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Credential; `None` leaves interception configured but inert.
    pub api_key: Option<String>,
    pub enabled: bool,
    pub analysis: AnalysisConfig,
    pub fix_prompt: FixPromptMode,
    /// Prompt override directories, resolved against the project directory.
    pub prompt_dirs: Vec<PathBuf>,
    pub runner: RunnerConfig,
}

impl Settings {
    /// Load the project file and merge it with the process environment.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Io` or `CoreError::Yaml` if the project file exists
    /// but cannot be read or parsed.
    pub fn load(config: &SessionConfig) -> Result<Self, CoreError> {
        let project = load_project_config(&config.config_path())?;
        Ok(Self::resolve(config, project, |key| std::env::var(key).ok()))
    }

    /// Merge CLI overrides, environment lookups and the project file.
    pub fn resolve(
        config: &SessionConfig,
        project: ProjectConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let api_key = config
            .api_key()
            .map(String::from)
            .or_else(|| env(API_KEY_ENV))
            .filter(|key| !key.trim().is_empty());

        let enabled = config
            .enabled()
            .or_else(|| env(DEBUG_MODE_ENV).map(|v| v.trim().eq_ignore_ascii_case("true")))
            .unwrap_or(project.interception.enabled);

        let mut analysis = project.analysis;
        if let Some(model) = config.model() {
            analysis.model = model.to_owned();
        }
        if let Some(base) = env(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            analysis.endpoint = chat_completions_url(base.trim());
        }

        let prompt_dirs = project
            .prompts
            .include
            .into_iter()
            .map(|dir| {
                if dir.is_absolute() {
                    dir
                } else {
                    config.project_dir().join(dir)
                }
            })
            .collect();

        Self {
            api_key,
            enabled,
            analysis,
            fix_prompt: project.interception.fix_prompt,
            prompt_dirs,
            runner: project.runner,
        }
    }
}
