use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("prompt error: {0}")]
    Prompt(#[from] self_debug_pm::PmError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
