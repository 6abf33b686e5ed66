use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use self_debug_core::{Console, DebugSession, ScriptRunner, SessionConfig, Settings};

#[derive(Debug, Parser)]
#[command(
    name = "self-debug",
    version,
    about = "Run scripts with AI-assisted failure analysis"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a script with self-debugging enabled
    Run {
        /// Completion service API key (defaults to $OPENAI_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Enable interception, overriding $SELF_DEBUG_MODE and the config file
        #[arg(long, overrides_with = "no_debug")]
        debug: bool,

        /// Disable interception; failures propagate unchanged
        #[arg(long, overrides_with = "debug")]
        no_debug: bool,

        /// Model used for analysis
        #[arg(short, long)]
        model: Option<String>,

        /// Project config file (defaults to .self-debug/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Script to run
        script: PathBuf,

        /// Arguments passed through to the script
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl Cli {
    /// Project directory and log directory name for this invocation.
    pub fn log_context(&self) -> (PathBuf, Option<String>) {
        match &self.command {
            Commands::Run { script, .. } => {
                let stem = script
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .filter(|stem| !stem.is_empty());
                (PathBuf::from("."), stem)
            }
        }
    }

    pub async fn run(self) -> Result<ExitCode> {
        match self.command {
            Commands::Run {
                api_key,
                debug,
                no_debug,
                model,
                config,
                script,
                args,
            } => {
                let session_config = SessionConfig::builder()
                    .api_key(api_key)
                    .enabled(debug_override(debug, no_debug))
                    .model(model)
                    .config_path(config)
                    .build();
                let settings =
                    Settings::load(&session_config).context("failed to load configuration")?;
                let session = DebugSession::from_settings(&settings, Console::stdout())?;
                let runner = ScriptRunner::new(&session, settings.runner.clone());

                let outcome = runner.run(&script, &args).await?;
                info!(?outcome, "run finished");
                Ok(ExitCode::from(
                    u8::try_from(outcome.exit_code()).unwrap_or(u8::MAX),
                ))
            }
        }
    }
}

/// `--debug` / `--no-debug` as an optional override; the last flag wins.
fn debug_override(debug: bool, no_debug: bool) -> Option<bool> {
    match (debug, no_debug) {
        (_, true) => Some(false),
        (true, false) => Some(true),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("should parse")
    }

    #[test]
    fn test_should_parse_run_with_passthrough_args() {
        let cli = parse(&["self-debug", "run", "job.py", "--verbose", "-n", "3"]);
        let Commands::Run {
            script,
            args,
            debug,
            no_debug,
            api_key,
            ..
        } = cli.command;

        assert_eq!(script, PathBuf::from("job.py"));
        assert_eq!(args, vec!["--verbose", "-n", "3"]);
        assert!(!debug);
        assert!(!no_debug);
        assert!(api_key.is_none());
    }

    #[test]
    fn test_should_parse_overrides() {
        let cli = parse(&[
            "self-debug",
            "run",
            "--api-key",
            "sk-cli",
            "--no-debug",
            "--model",
            "gpt-4o",
            "--config",
            "custom.yaml",
            "job.sh",
        ]);
        let Commands::Run {
            api_key,
            no_debug,
            model,
            config,
            ..
        } = cli.command;

        assert_eq!(api_key.as_deref(), Some("sk-cli"));
        assert!(no_debug);
        assert_eq!(model.as_deref(), Some("gpt-4o"));
        assert_eq!(config, Some(PathBuf::from("custom.yaml")));
    }

    #[test]
    fn test_should_let_last_debug_flag_win() {
        let cli = parse(&["self-debug", "run", "--no-debug", "--debug", "job.sh"]);
        let Commands::Run {
            debug, no_debug, ..
        } = cli.command;
        assert_eq!(debug_override(debug, no_debug), Some(true));

        let cli = parse(&["self-debug", "run", "--debug", "--no-debug", "job.sh"]);
        let Commands::Run {
            debug, no_debug, ..
        } = cli.command;
        assert_eq!(debug_override(debug, no_debug), Some(false));

        assert_eq!(debug_override(false, false), None);
    }

    #[test]
    fn test_should_require_script() {
        assert!(Cli::try_parse_from(["self-debug", "run"]).is_err());
    }

    #[test]
    fn test_should_derive_log_context_from_script_stem() {
        let cli = parse(&["self-debug", "run", "scripts/divide.py"]);
        let (project, stem) = cli.log_context();
        assert_eq!(project, PathBuf::from("."));
        assert_eq!(stem.as_deref(), Some("divide"));
    }

    #[tokio::test]
    async fn test_should_fail_for_missing_script() {
        let tmp = tempfile::tempdir().expect("should create temp dir");
        let missing = tmp.path().join("missing.py");
        let config = tmp.path().join("config.yaml");
        let cli = parse(&[
            "self-debug",
            "run",
            "--no-debug",
            "--config",
            config.to_str().expect("utf-8 path"),
            missing.to_str().expect("utf-8 path"),
        ]);

        let err = cli.run().await.expect_err("missing script is fatal");
        assert!(err.to_string().contains("script not found"), "got: {err}");
    }
}
