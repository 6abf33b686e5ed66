//! Template source type used by the prompt manager.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// File extensions recognized as prompt templates when loading a directory.
pub(crate) const TEMPLATE_EXTENSIONS: &[&str] = &["j2", "jinja"];

/// A named prompt template and its raw Jinja source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name used for lookup (e.g., `analysis/user`).
    pub name: String,

    /// Raw Jinja2 template source.
    pub source: String,
}

impl PromptTemplate {
    /// Create a template from a name and source text.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Derive a template name from a file path relative to `root`.
    ///
    /// `root/analysis/user.j2` becomes `analysis/user`. Returns `None` when
    /// the file does not carry a template extension or is outside `root`.
    pub(crate) fn name_for(root: &Path, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?;
        if !TEMPLATE_EXTENSIONS.contains(&ext) {
            return None;
        }
        let relative = path.strip_prefix(root).ok()?.with_extension("");
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_should_derive_name_from_nested_path() {
        let root = PathBuf::from("/prompts");
        let name = PromptTemplate::name_for(&root, &root.join("analysis").join("user.j2"));
        assert_eq!(name.as_deref(), Some("analysis/user"));
    }

    #[test]
    fn test_should_skip_non_template_files() {
        let root = PathBuf::from("/prompts");
        assert!(PromptTemplate::name_for(&root, &root.join("README.md")).is_none());
        assert!(PromptTemplate::name_for(&root, &root.join("noext")).is_none());
    }

    #[test]
    fn test_should_accept_jinja_extension() {
        let root = PathBuf::from("/prompts");
        let name = PromptTemplate::name_for(&root, &root.join("system.jinja"));
        assert_eq!(name.as_deref(), Some("system"));
    }
}
