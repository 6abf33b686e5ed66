use std::fs;
use std::path::Path;

use minijinja::Environment;
use tracing::{debug, warn};

use crate::error::PmError;
use crate::template::PromptTemplate;

/// Name of the built-in system prompt for error analysis.
pub const ANALYSIS_SYSTEM: &str = "analysis/system";

/// Name of the built-in user prompt for error analysis.
pub const ANALYSIS_USER: &str = "analysis/user";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (ANALYSIS_SYSTEM, include_str!("templates/analysis/system.j2")),
    (ANALYSIS_USER, include_str!("templates/analysis/user.j2")),
];

/// Manages prompt templates and renders them with context variables.
///
/// A new manager always contains the built-in analysis templates. Templates
/// loaded later with the same name replace the built-in ones.
#[derive(Debug)]
pub struct PromptManager {
    env: Environment<'static>,
}

impl PromptManager {
    /// Create a manager preloaded with the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if a built-in template fails to
    /// compile, which indicates a packaging bug.
    pub fn new() -> Result<Self, PmError> {
        let mut manager = Self {
            env: Environment::new(),
        };
        for (name, source) in BUILTIN_TEMPLATES {
            manager.add_template(PromptTemplate::new(*name, *source))?;
        }
        Ok(manager)
    }

    /// Load all `.j2` / `.jinja` templates under a directory, recursively.
    ///
    /// Template names are the path relative to `dir` without the extension,
    /// joined with `/`. Returns the number of templates loaded.
    ///
    /// # Errors
    ///
    /// Returns `PmError::Io` if the directory or a template file cannot be
    /// read, and `PmError::InvalidTemplate` if a template fails to compile.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, PmError> {
        let mut loaded = 0;
        self.load_dir_inner(dir, dir, &mut loaded)?;
        debug!(dir = %dir.display(), loaded, "loaded prompt directory");
        Ok(loaded)
    }

    fn load_dir_inner(&mut self, root: &Path, dir: &Path, loaded: &mut usize) -> Result<(), PmError> {
        let io_err = |source| PmError::Io {
            path: dir.to_path_buf(),
            source,
        };
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_dir() {
                self.load_dir_inner(root, &path, loaded)?;
                continue;
            }
            let Some(name) = PromptTemplate::name_for(root, &path) else {
                continue;
            };
            let source = fs::read_to_string(&path).map_err(|source| PmError::Io {
                path: path.clone(),
                source,
            })?;
            self.add_template(PromptTemplate::new(name, source))?;
            *loaded += 1;
        }
        Ok(())
    }

    /// Register a single template, replacing any template with the same name.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if the source fails to compile.
    pub fn add_template(&mut self, template: PromptTemplate) -> Result<(), PmError> {
        let PromptTemplate { name, source } = template;
        self.env
            .add_template_owned(name.clone(), source)
            .map_err(|e| {
                warn!(template = %name, error = %e, "rejected prompt template");
                PmError::InvalidTemplate { name, source: e }
            })
    }

    /// Render a template by name with the given context.
    ///
    /// # Errors
    ///
    /// Returns `PmError::TemplateNotFound` for an unknown name and
    /// `PmError::Render` if rendering fails.
    pub fn render(&self, name: &str, ctx: &serde_json::Value) -> Result<String, PmError> {
        let template = self.env.get_template(name).map_err(|e| match e.kind() {
            minijinja::ErrorKind::TemplateNotFound => PmError::TemplateNotFound(name.to_owned()),
            _ => PmError::Render {
                name: name.to_owned(),
                source: e,
            },
        })?;
        template.render(ctx).map_err(|e| PmError::Render {
            name: name.to_owned(),
            source: e,
        })
    }

    /// Names of all registered templates, sorted.
    pub fn list_templates(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .env
            .templates()
            .map(|(name, _)| name.to_owned())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn analysis_context() -> serde_json::Value {
        json!({
            "language": "rust",
            "language_name": "Rust",
            "error_type": "ParseIntError",
            "error_message": "invalid digit found in string",
            "function_name": "parse_port",
            "function_args": "(\"80a\",)",
            "function_kwargs": "{}",
            "function_source": "fn parse_port(s: &str) -> Result<u16, ParseIntError> { s.parse() }",
            "traceback": "Error: invalid digit found in string",
            "runtime_version": "self-debug 0.1.0 (linux/x86_64)",
            "working_directory": "/tmp/project",
        })
    }

    #[test]
    fn test_should_list_builtin_templates() {
        let pm = PromptManager::new().expect("should create manager");
        assert_eq!(
            pm.list_templates(),
            vec![ANALYSIS_SYSTEM.to_owned(), ANALYSIS_USER.to_owned()]
        );
    }

    #[test]
    fn test_should_render_user_prompt_with_every_field() {
        let pm = PromptManager::new().expect("should create manager");
        let prompt = pm
            .render(ANALYSIS_USER, &analysis_context())
            .expect("should render");

        assert!(prompt.contains("- Error Type: ParseIntError"));
        assert!(prompt.contains("- Error Message: invalid digit found in string"));
        assert!(prompt.contains("- Function: parse_port"));
        assert!(prompt.contains("- Arguments: (\"80a\",)"));
        assert!(prompt.contains("- Keyword Arguments: {}"));
        assert!(prompt.contains("```rust\nfn parse_port"));
        assert!(prompt.contains("Runtime Version: self-debug 0.1.0 (linux/x86_64)"));
        assert!(prompt.contains("Working Directory: /tmp/project"));
        assert!(prompt.contains("\"suggested_fix\": \"Specific code fix or workaround\""));
    }

    #[test]
    fn test_should_not_escape_source_text() {
        let pm = PromptManager::new().expect("should create manager");
        let mut ctx = analysis_context();
        ctx["function_source"] = json!("if a < b && b > c { \"<tag>\" }");
        let prompt = pm.render(ANALYSIS_USER, &ctx).expect("should render");
        assert!(prompt.contains("if a < b && b > c { \"<tag>\" }"));
    }

    #[test]
    fn test_should_render_system_prompt_for_language() {
        let pm = PromptManager::new().expect("should create manager");
        let prompt = pm
            .render(ANALYSIS_SYSTEM, &analysis_context())
            .expect("should render");
        assert_eq!(
            prompt,
            "You are a Rust debugging expert. Analyze the error and provide clear explanations and fixes."
        );
    }

    #[test]
    fn test_should_return_not_found_for_unknown_template() {
        let pm = PromptManager::new().expect("should create manager");
        let err = pm.render("nope/missing", &json!({})).unwrap_err();
        assert!(matches!(err, PmError::TemplateNotFound(name) if name == "nope/missing"));
    }

    #[test]
    fn test_should_reject_invalid_template() {
        let mut pm = PromptManager::new().expect("should create manager");
        let err = pm
            .add_template(PromptTemplate::new("broken", "{% if %}"))
            .unwrap_err();
        assert!(matches!(err, PmError::InvalidTemplate { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_should_override_builtin_from_directory() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        std::fs::create_dir_all(dir.path().join("analysis")).expect("should create dir");
        std::fs::write(
            dir.path().join("analysis").join("system.j2"),
            "Custom reviewer for {{ language_name }}.",
        )
        .expect("should write template");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("should write file");

        let mut pm = PromptManager::new().expect("should create manager");
        let loaded = pm.load_dir(dir.path()).expect("should load dir");
        assert_eq!(loaded, 1);

        let prompt = pm
            .render(ANALYSIS_SYSTEM, &analysis_context())
            .expect("should render");
        assert_eq!(prompt, "Custom reviewer for Rust.");
    }

    #[test]
    fn test_should_fail_to_load_missing_directory() {
        let mut pm = PromptManager::new().expect("should create manager");
        let err = pm
            .load_dir(Path::new("/nonexistent/self-debug/prompts"))
            .unwrap_err();
        assert!(matches!(err, PmError::Io { .. }));
    }
}
