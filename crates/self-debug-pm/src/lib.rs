//! Prompt templates for self-debug error analysis.
//!
//! The [`PromptManager`] ships with the built-in `analysis/system` and
//! `analysis/user` templates and lets callers override them from template
//! directories on disk.

mod error;
mod manager;
mod template;

pub use error::PmError;
pub use manager::{ANALYSIS_SYSTEM, ANALYSIS_USER, PromptManager};
pub use template::PromptTemplate;
