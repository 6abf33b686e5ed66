//! Logging initialization and log file management.
//!
//! Diagnostics go to stderr (human-readable, `warn` unless `RUST_LOG` says
//! otherwise) and, for `run`, to a JSON log file at
//! `.self-debug/logs/<script-stem>/<timestamp>.log`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use self_debug_core::PROJECT_DIR_NAME;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Maximum age of log files before cleanup, in days.
const LOG_RETENTION_DAYS: u64 = 3;

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "warn";

/// Initialize the tracing subscriber with stderr output.
///
/// When `script_stem` is `Some`, an additional JSON file layer writes to
/// `.self-debug/logs/<script_stem>/<timestamp>.log` under `project_dir`.
///
/// The returned [`WorkerGuard`] must be held for the lifetime of the program
/// so buffered log lines are flushed.
///
/// # Errors
///
/// Returns an error if the log directory or file cannot be created.
pub fn init_tracing(project_dir: &Path, script_stem: Option<&str>) -> Result<Option<WorkerGuard>> {
    let Some(stem) = script_stem else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter())
            .init();
        return Ok(None);
    };

    let (non_blocking, guard) = open_log_writer(project_dir, stem)?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(env_filter()),
        )
        .init();
    Ok(Some(guard))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Create the log directory and file, returning a non-blocking writer and guard.
fn open_log_writer(project_dir: &Path, script_stem: &str) -> Result<(NonBlocking, WorkerGuard)> {
    let log_path = build_log_path(project_dir, script_stem, Utc::now());
    let log_dir = log_path.parent().with_context(|| {
        format!(
            "failed to resolve parent directory for log path: {}",
            log_path.display()
        )
    })?;

    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;
    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(log_file))
}

fn logs_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(PROJECT_DIR_NAME).join("logs")
}

/// `.self-debug/logs/<script_stem>/<YYYYMMDD_HHMMSS>.log`
fn build_log_path(project_dir: &Path, script_stem: &str, now: DateTime<Utc>) -> PathBuf {
    logs_dir(project_dir)
        .join(script_stem)
        .join(format!("{}.log", now.format("%Y%m%d_%H%M%S")))
}

/// Remove `.log` files older than three days and then empty directories.
///
/// Best-effort: failures are reported with `eprintln!` because tracing is
/// not initialized yet.
pub fn cleanup_old_logs(project_dir: &Path) {
    let dir = logs_dir(project_dir);
    if !dir.is_dir() {
        return;
    }
    let cutoff = SystemTime::now() - Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
    remove_old_log_files(&dir, cutoff);
    remove_empty_dirs(&dir);
}

fn remove_old_log_files(dir: &Path, cutoff: SystemTime) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("warning: failed to read log directory {}: {e}", dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_old_log_files(&path, cutoff);
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("warning: failed to read metadata for {}: {e}", path.display());
                continue;
            }
        };
        if modified < cutoff
            && let Err(e) = fs::remove_file(&path)
        {
            eprintln!(
                "warning: failed to remove old log file {}: {e}",
                path.display()
            );
        }
    }
}

/// Remove empty subdirectories under `dir`, keeping `dir` itself.
fn remove_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|entry| entry.path()) {
        if path.is_dir() {
            remove_empty_dirs(&path);
            // Fails for non-empty directories.
            let _ = fs::remove_dir(&path);
        }
    }
}
