use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or rendering prompt templates.
#[derive(Debug, Error)]
pub enum PmError {
    #[error("prompt template not found: {0}")]
    TemplateNotFound(String),

    #[error("failed to render prompt {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("prompt template {name} does not compile: {source}")]
    InvalidTemplate {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to read prompt templates from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
