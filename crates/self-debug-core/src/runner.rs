//! Script runner.
//!
//! Runs a script as a child process under a [`DebugSession`]. When the
//! script exits unsuccessfully, its captured stderr becomes the traceback of
//! a synthesized [`InvocationContext`] that goes through the same pipeline as
//! an intercepted call.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crossterm::style::Stylize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use crate::capture::{ErrorKind, InvocationContext, SOURCE_UNAVAILABLE};
use crate::config::RunnerConfig;
use crate::error::CoreError;
use crate::session::{DebugSession, Disposition};

/// How a script run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    /// The script failed and the failure was analyzed.
    Handled,
    /// The script failed without analysis. `code` is `None` when the child
    /// was terminated by a signal.
    Failed { code: Option<i32> },
}

impl RunOutcome {
    /// Process exit code the CLI should report.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded | Self::Handled => 0,
            Self::Failed { code } => code.filter(|c| *c != 0).unwrap_or(1),
        }
    }
}

/// Runs scripts under a debug session.
#[derive(Debug)]
pub struct ScriptRunner<'a> {
    session: &'a DebugSession,
    config: RunnerConfig,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(session: &'a DebugSession, config: RunnerConfig) -> Self {
        Self { session, config }
    }

    /// Run `script` with passthrough `args`.
    ///
    /// stdin and stdout are inherited; stderr is echoed and captured.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ScriptNotFound` if `script` is not a file, before
    /// anything runs, and `CoreError::Io` if the child cannot be spawned.
    #[instrument(skip(self, script), fields(script = %script.display()))]
    pub async fn run(&self, script: &Path, args: &[String]) -> Result<RunOutcome, CoreError> {
        if !script.is_file() {
            return Err(CoreError::ScriptNotFound(script.to_path_buf()));
        }
        let source = std::fs::read_to_string(script).unwrap_or_else(|e| {
            warn!(error = %e, "failed to read script source");
            SOURCE_UNAVAILABLE.to_owned()
        });

        let banner = format!("🚀 Running {} with self-debugging enabled", script.display());
        let console = self.session.console();
        if console.color() {
            console.line(banner.bold().green().to_string());
        } else {
            console.line(banner);
        }

        let (program, program_args) = self.command_for(script);
        debug!(program = %program.display(), ?program_args, "spawning script");
        let mut child = Command::new(&program)
            .args(&program_args)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!(program = %program.display(), error = %e, "failed to spawn script");
                CoreError::Io(e)
            })?;

        let stderr = match child.stderr.take() {
            Some(pipe) => echo_and_capture(pipe).await?,
            None => String::new(),
        };
        let status = child.wait().await?;

        if status.success() {
            info!("script succeeded");
            return Ok(RunOutcome::Succeeded);
        }
        let failed = RunOutcome::Failed {
            code: status.code(),
        };
        warn!(code = ?status.code(), "script failed");
        if !self.session.is_active() {
            return Ok(failed);
        }

        let ctx = script_failure_context(script, source, args, status.code(), &stderr);
        Ok(match self.session.handle(&ctx).await {
            Disposition::Handled => RunOutcome::Handled,
            Disposition::Unhandled => failed,
        })
    }

    /// Program and leading arguments used to execute `script`.
    fn command_for(&self, script: &Path) -> (PathBuf, Vec<String>) {
        match self.config.interpreter_for(script) {
            Some(mut words) => {
                let program = PathBuf::from(words.remove(0));
                words.push(script.display().to_string());
                (program, words)
            }
            None => (script.to_path_buf(), Vec::new()),
        }
    }
}

async fn echo_and_capture(pipe: tokio::process::ChildStderr) -> Result<String, CoreError> {
    let mut reader = BufReader::new(pipe);
    let mut echo = tokio::io::stderr();
    let mut captured = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        echo.write_all(&buf).await?;
        captured.push_str(&String::from_utf8_lossy(&buf));
    }
    echo.flush().await?;
    Ok(captured)
}

fn script_failure_context(
    script: &Path,
    source: String,
    args: &[String],
    code: Option<i32>,
    stderr: &str,
) -> InvocationContext {
    let (error_kind, error_message) = match classify_stderr(stderr) {
        Some((name, message)) => (ErrorKind::Foreign { name }, message),
        None => {
            let kind = ErrorKind::ExitStatus { code };
            let message = format!("script exited with {kind}");
            (kind, message)
        }
    };
    let function_name = script
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.display().to_string());
    let traceback = if stderr.trim().is_empty() {
        "<no stderr output>".to_owned()
    } else {
        stderr.to_owned()
    };

    InvocationContext::builder()
        .error_kind(error_kind)
        .error_message(error_message)
        .function_name(function_name)
        .function_source(source)
        .arguments(format!("{args:?}"))
        .traceback(traceback)
        .language(language_for(script))
        .build()
}

/// Find the error line in a failed script's stderr, searching from the end.
///
/// Recognizes `Name: message` (Python, Node) and `...: message (Name)`
/// (Ruby) where the name ends in `Error` or `Exception`.
fn classify_stderr(stderr: &str) -> Option<(String, String)> {
    stderr.lines().rev().map(str::trim).find_map(|line| {
        if let Some((name, message)) = line.split_once(": ")
            && is_error_name(name)
        {
            return Some((name.to_owned(), message.trim().to_owned()));
        }
        if is_error_name(line) {
            return Some((line.to_owned(), String::new()));
        }
        let inner = line.strip_suffix(')')?;
        let (head, name) = inner.rsplit_once(" (")?;
        if !is_error_name(name) {
            return None;
        }
        let message = head.rsplit_once(": ").map_or(head, |(_, m)| m);
        Some((name.to_owned(), message.trim().to_owned()))
    })
}

fn is_error_name(name: &str) -> bool {
    let last = name.rsplit(['.', ':']).next().unwrap_or_default();
    !last.is_empty()
        && last.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && last.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && (last.ends_with("Error") || last.ends_with("Exception"))
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':'))
}

/// Language tag for a script's source block.
fn language_for(script: &Path) -> &'static str {
    match script.extension().and_then(|e| e.to_str()) {
        Some("py") => "python",
        Some("js" | "mjs" | "cjs") => "javascript",
        Some("rb") => "ruby",
        Some("sh" | "bash") => "sh",
        Some("rs") => "rust",
        _ => "",
    }
}
