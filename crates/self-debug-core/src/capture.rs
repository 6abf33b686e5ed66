//! Failure capture.
//!
//! Builds the immutable [`InvocationContext`] describing one failed call:
//! error kind and message, function name and best-effort source, argument
//! renderings, the stack trace taken at the catch point, and environment
//! details. Capture never fails; anything it cannot determine is replaced by
//! a placeholder.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use serde_json::json;
use typed_builder::TypedBuilder;

/// Placeholder used when a function's source text cannot be retrieved.
pub const SOURCE_UNAVAILABLE: &str = "Source code not available";

// ── Error kind ───────────────────────────────────────────────

/// What kind of failure was intercepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ErrorKind {
    /// An `Err` returned by the target; `type_name` is the error's Rust type.
    Error { type_name: String },
    /// The target panicked.
    Panic,
    /// A child process failed and its stderr named the error (e.g. `KeyError`).
    Foreign { name: String },
    /// A child process failed without a recognizable error line.
    ExitStatus { code: Option<i32> },
}

impl ErrorKind {
    /// Kind for an error value of type `E`, using its short type name.
    pub fn of<E: ?Sized>() -> Self {
        Self::Error {
            type_name: short_type_name(std::any::type_name::<E>()),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error { type_name } => f.write_str(type_name),
            Self::Panic => f.write_str("panic"),
            Self::Foreign { name } => f.write_str(name),
            Self::ExitStatus { code: Some(code) } => write!(f, "exit status {code}"),
            Self::ExitStatus { code: None } => f.write_str("terminated by signal"),
        }
    }
}

/// Strip module paths from every path segment of a type name.
///
/// `alloc::boxed::Box<dyn core::error::Error>` becomes `Box<dyn Error>`.
pub(crate) fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut word = String::new();
    let flush = |word: &mut String, out: &mut String| {
        out.push_str(word.rsplit("::").next().unwrap_or_default());
        word.clear();
    };
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            word.push(ch);
        } else {
            flush(&mut word, &mut out);
            out.push(ch);
        }
    }
    flush(&mut word, &mut out);
    out
}

// ── Target ───────────────────────────────────────────────────

/// Where a target's source text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceHint {
    Unknown,
    /// Source text captured at the wrapping site.
    Inline(String),
    /// A `fn <name>` definition to look up in a source file at capture time.
    Definition {
        file: PathBuf,
        manifest_dir: PathBuf,
        name: String,
    },
}

/// A callable paired with the metadata capture needs.
///
/// Prefer the [`target!`](crate::target) macro, which fills in the name and
/// a source hint automatically.
#[derive(Debug, Clone)]
pub struct Target<F> {
    name: String,
    source: SourceHint,
    language: String,
    func: F,
}

impl<F> Target<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            source: SourceHint::Unknown,
            language: "rust".to_owned(),
            func,
        }
    }

    /// Use `source` verbatim as the function source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = SourceHint::Inline(source.into());
        self
    }

    /// Look the function's definition up in `file` when a failure is captured.
    ///
    /// Relative paths are tried against the working directory and then every
    /// ancestor of `manifest_dir`, which covers `file!()` output for both
    /// single crates and workspace members.
    pub fn with_definition(mut self, file: &str, manifest_dir: &str) -> Self {
        self.source = SourceHint::Definition {
            file: PathBuf::from(file),
            manifest_dir: PathBuf::from(manifest_dir),
            name: self.name.clone(),
        };
        self
    }

    /// Language tag used for the source code block (default `rust`).
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn source_hint(&self) -> &SourceHint {
        &self.source
    }

    pub(crate) fn func(&self) -> &F {
        &self.func
    }

    /// Resolve the source text, or [`SOURCE_UNAVAILABLE`].
    pub fn source(&self) -> String {
        match &self.source {
            SourceHint::Unknown => SOURCE_UNAVAILABLE.to_owned(),
            SourceHint::Inline(text) => text.clone(),
            SourceHint::Definition {
                file,
                manifest_dir,
                name,
            } => resolve_source_file(file, manifest_dir)
                .and_then(|path| std::fs::read_to_string(path).ok())
                .and_then(|text| extract_definition(&text, name))
                .unwrap_or_else(|| SOURCE_UNAVAILABLE.to_owned()),
        }
    }
}

/// Wrap a function or closure as a [`Target`].
///
/// `target!(name)` records the function's name and looks its definition up
/// in the calling source file; `target!("label", closure)` records the
/// closure's own tokens as its source.
#[macro_export]
macro_rules! target {
    ($func:ident) => {
        $crate::Target::new(stringify!($func), $func)
            .with_definition(file!(), env!("CARGO_MANIFEST_DIR"))
    };
    ($name:expr, $func:expr) => {
        $crate::Target::new($name, $func).with_source(stringify!($func))
    };
}

fn resolve_source_file(file: &Path, manifest_dir: &Path) -> Option<PathBuf> {
    if file.is_absolute() {
        return file.is_file().then(|| file.to_path_buf());
    }
    if file.is_file() {
        return Some(file.to_path_buf());
    }
    manifest_dir
        .ancestors()
        .map(|dir| dir.join(file))
        .find(|candidate| candidate.is_file())
}

/// Extract the text of `fn <name>` (signature through closing brace).
///
/// Declarations without a body (trait items, extern fns) are skipped.
pub(crate) fn extract_definition(text: &str, name: &str) -> Option<String> {
    let needle = format!("fn {name}");
    let mut from = 0;
    while let Some(found) = text[from..].find(&needle) {
        let at = from + found;
        from = at + needle.len();

        let preceded_ok = text[..at]
            .chars()
            .next_back()
            .is_none_or(|c| c.is_whitespace());
        let followed_ok = text[from..]
            .chars()
            .find(|c| !c.is_whitespace())
            .is_some_and(|c| c == '(' || c == '<');
        if !preceded_ok || !followed_ok {
            continue;
        }

        let line_start = text[..at].rfind('\n').map_or(0, |i| i + 1);
        if let Some(end) = body_end(text, at) {
            return Some(text[line_start..end].to_owned());
        }
    }
    None
}

/// Byte offset just past the brace that closes the body starting after `start`.
fn body_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    // `(`/`[` nesting, so `[u8; 4]` in a signature is not a declaration end.
    let mut nesting = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            ';' if depth == 0 && nesting == 0 => return None,
            '(' | '[' if depth == 0 => nesting += 1,
            ')' | ']' if depth == 0 => nesting = nesting.saturating_sub(1),
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Panic capture ────────────────────────────────────────────

static PANIC_HOOK: Once = Once::new();
static INTERCEPTIONS_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicRecord>> = const { RefCell::new(None) };
}

#[derive(Debug)]
struct PanicRecord {
    location: Option<String>,
    backtrace: String,
}

/// Marks an interception in flight so the panic hook records backtraces.
///
/// The hook is installed once per process and chains to the previous hook.
pub(crate) struct PanicCaptureGuard(());

impl PanicCaptureGuard {
    pub(crate) fn enter() -> Self {
        PANIC_HOOK.call_once(|| {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                if INTERCEPTIONS_IN_FLIGHT.load(Ordering::SeqCst) > 0 {
                    let record = PanicRecord {
                        location: info.location().map(ToString::to_string),
                        backtrace: Backtrace::force_capture().to_string(),
                    };
                    LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(record));
                }
                previous(info);
            }));
        });
        LAST_PANIC.with(|slot| slot.borrow_mut().take());
        INTERCEPTIONS_IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
        Self(())
    }
}

impl Drop for PanicCaptureGuard {
    fn drop(&mut self) {
        INTERCEPTIONS_IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

// ── Invocation context ───────────────────────────────────────

/// Immutable snapshot of one failed invocation.
///
/// Created once per failure and dropped when the pipeline finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    error_kind: ErrorKind,
    #[builder(setter(into))]
    error_message: String,
    #[builder(setter(into))]
    function_name: String,
    #[builder(default = SOURCE_UNAVAILABLE.to_owned(), setter(into))]
    function_source: String,
    #[builder(default = "()".to_owned(), setter(into))]
    arguments: String,
    #[builder(default = "{}".to_owned(), setter(into))]
    keyword_arguments: String,
    #[builder(setter(into))]
    traceback: String,
    #[builder(default = runtime_version())]
    runtime_version: String,
    #[builder(default = working_directory())]
    working_directory: String,
    #[builder(default = "rust".to_owned(), setter(into))]
    language: String,
}

impl InvocationContext {
    /// Capture an `Err` returned by `target`.
    ///
    /// The traceback is the error's debug rendering (cause chains included
    /// for `anyhow`-style errors) plus a backtrace taken here, at the catch
    /// point.
    pub fn capture<F, E>(error: &E, target: &Target<F>, arguments: String, keyword_arguments: String) -> Self
    where
        E: fmt::Display + fmt::Debug,
    {
        let traceback = format!(
            "{error:?}\n\nStack backtrace (captured at interception point):\n{}",
            Backtrace::force_capture()
        );
        Self::builder()
            .error_kind(ErrorKind::of::<E>())
            .error_message(error.to_string())
            .function_name(target.name())
            .function_source(target.source())
            .arguments(arguments)
            .keyword_arguments(keyword_arguments)
            .traceback(traceback)
            .language(target.language())
            .build()
    }

    /// Capture a panic raised by `target`.
    ///
    /// Uses the backtrace recorded by the panic hook when the panic happened
    /// on this thread during the interception; otherwise falls back to a
    /// backtrace taken here.
    pub(crate) fn capture_panic<F>(
        payload: &(dyn Any + Send),
        target: &Target<F>,
        arguments: String,
        keyword_arguments: String,
    ) -> Self {
        let message = panic_message(payload);
        let record = LAST_PANIC.with(|slot| slot.borrow_mut().take());
        let traceback = match record {
            Some(PanicRecord {
                location: Some(location),
                backtrace,
            }) => format!("panicked at {location}:\n{message}\n\nStack backtrace:\n{backtrace}"),
            Some(PanicRecord {
                location: None,
                backtrace,
            }) => format!("panicked:\n{message}\n\nStack backtrace:\n{backtrace}"),
            None => format!(
                "panicked:\n{message}\n\nStack backtrace (captured after unwinding):\n{}",
                Backtrace::force_capture()
            ),
        };
        Self::builder()
            .error_kind(ErrorKind::Panic)
            .error_message(message)
            .function_name(target.name())
            .function_source(target.source())
            .arguments(arguments)
            .keyword_arguments(keyword_arguments)
            .traceback(traceback)
            .language(target.language())
            .build()
    }

    pub fn error_kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn function_source(&self) -> &str {
        &self.function_source
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    pub fn keyword_arguments(&self) -> &str {
        &self.keyword_arguments
    }

    pub fn traceback(&self) -> &str {
        &self.traceback
    }

    pub fn runtime_version(&self) -> &str {
        &self.runtime_version
    }

    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Template variables for the analysis prompt.
    pub(crate) fn prompt_context(&self) -> serde_json::Value {
        json!({
            "language": self.language,
            "language_name": language_name(&self.language),
            "error_type": self.error_kind.to_string(),
            "error_message": self.error_message,
            "function_name": self.function_name,
            "function_source": self.function_source,
            "function_args": self.arguments,
            "function_kwargs": self.keyword_arguments,
            "traceback": self.traceback,
            "runtime_version": self.runtime_version,
            "working_directory": self.working_directory,
        })
    }
}

fn runtime_version() -> String {
    format!(
        "{} {} ({}/{})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn working_directory() -> String {
    std::env::current_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|_| "<unknown>".to_owned())
}

fn language_name(language: &str) -> String {
    match language {
        "rust" => "Rust".to_owned(),
        "python" => "Python".to_owned(),
        "javascript" => "JavaScript".to_owned(),
        "ruby" => "Ruby".to_owned(),
        "bash" | "sh" => "shell".to_owned(),
        "" => "program".to_owned(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::num::ParseIntError;

    use super::*;

    fn parse_port(raw: &str) -> Result<u16, ParseIntError> {
        raw.parse::<u16>()
    }

    #[test]
    fn test_should_shorten_type_names() {
        assert_eq!(short_type_name("core::num::error::ParseIntError"), "ParseIntError");
        assert_eq!(
            short_type_name("alloc::boxed::Box<dyn core::error::Error + Send>"),
            "Box<dyn Error + Send>"
        );
        assert_eq!(short_type_name("anyhow::Error"), "Error");
        assert_eq!(short_type_name("&str"), "&str");
    }

    #[test]
    fn test_should_display_error_kinds() {
        assert_eq!(ErrorKind::of::<ParseIntError>().to_string(), "ParseIntError");
        assert_eq!(ErrorKind::Panic.to_string(), "panic");
        assert_eq!(
            ErrorKind::Foreign {
                name: "ZeroDivisionError".to_owned()
            }
            .to_string(),
            "ZeroDivisionError"
        );
        assert_eq!(ErrorKind::ExitStatus { code: Some(2) }.to_string(), "exit status 2");
        assert_eq!(ErrorKind::ExitStatus { code: None }.to_string(), "terminated by signal");
    }

    #[test]
    fn test_should_capture_result_error() {
        let target = crate::target!(parse_port);
        let err = (target.func())("80a").unwrap_err();

        let ctx = InvocationContext::capture(&err, &target, "(\"80a\",)".to_owned(), "{}".to_owned());

        assert_eq!(
            ctx.error_kind(),
            &ErrorKind::Error {
                type_name: "ParseIntError".to_owned()
            }
        );
        assert_eq!(ctx.error_message(), "invalid digit found in string");
        assert_eq!(ctx.function_name(), "parse_port");
        assert_eq!(ctx.arguments(), "(\"80a\",)");
        assert_eq!(ctx.keyword_arguments(), "{}");
        assert!(ctx.traceback().starts_with("ParseIntError"));
        assert!(ctx.traceback().contains("Stack backtrace"));
        assert!(ctx.runtime_version().starts_with("self-debug-core "));
        assert!(!ctx.working_directory().is_empty());
        assert_eq!(ctx.language(), "rust");
    }

    #[test]
    fn test_should_find_source_of_named_function() {
        let target = crate::target!(parse_port);
        let source = target.source();
        assert!(source.contains("fn parse_port(raw: &str)"), "got: {source}");
        assert!(source.trim_end().ends_with('}'));
        assert!(source.contains("raw.parse::<u16>()"));
    }

    #[test]
    fn test_should_use_sentinel_when_source_file_is_missing() {
        let target = Target::new("ghost", parse_port)
            .with_definition("does/not/exist.rs", "/nonexistent/manifest");
        assert_eq!(target.source(), SOURCE_UNAVAILABLE);

        let err = (target.func())("x").unwrap_err();
        let ctx = InvocationContext::capture(&err, &target, "()".to_owned(), "{}".to_owned());
        assert_eq!(ctx.function_source(), SOURCE_UNAVAILABLE);
    }

    #[test]
    fn test_should_use_sentinel_when_definition_is_absent() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let file = dir.path().join("lib.rs");
        std::fs::write(&file, "fn other() {}\n").expect("should write");

        let target = Target::new("missing", ())
            .with_definition(&file.display().to_string(), "/");
        assert_eq!(target.source(), SOURCE_UNAVAILABLE);
    }

    #[test]
    fn test_should_capture_closure_tokens_inline() {
        let target = crate::target!("double", |x: i32| x * 2);
        assert_eq!(target.name(), "double");
        assert!(target.source().contains("x * 2"));
        assert_eq!(Target::new("bare", ()).source(), SOURCE_UNAVAILABLE);
    }

    #[test]
    fn test_should_extract_definition_skipping_declarations() {
        let text = r#"
trait Calc {
    fn divide(a: i32, b: i32) -> i32;
}

fn divide_all() {}

pub fn divide(a: i32, b: i32) -> i32 {
    let msg = "}";
    if b == 0 { panic!("{}", msg) }
    a / b
}

fn after() {}
"#;
        let body = extract_definition(text, "divide").expect("should find fn");
        assert!(body.starts_with("pub fn divide(a: i32, b: i32)"));
        assert!(body.ends_with("a / b\n}"));
        assert!(!body.contains("after"));
    }

    #[test]
    fn test_should_extract_definition_with_array_parameter() {
        let text = r#"
fn digest(block: [u8; 4]) -> [u8; 4];

fn checksum(block: [u8; 4]) -> u8 {
    block.iter().fold(0, |acc, b| acc ^ b)
}
"#;
        let body = extract_definition(text, "checksum").expect("should find fn");
        assert!(body.starts_with("fn checksum(block: [u8; 4]) -> u8 {"));
        assert!(body.ends_with("acc ^ b)\n}"));
        assert!(extract_definition(text, "digest").is_none());
    }

    #[test]
    fn test_should_read_panic_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_should_record_panic_backtrace_at_panic_site() {
        let target = Target::new("explode", ());
        let payload = {
            let _guard = PanicCaptureGuard::enter();
            let result: std::thread::Result<()> = std::panic::catch_unwind(|| panic!("kaboom"));
            result.unwrap_err()
        };

        let ctx = InvocationContext::capture_panic(payload.as_ref(), &target, "()".to_owned(), "{}".to_owned());

        assert_eq!(ctx.error_kind(), &ErrorKind::Panic);
        assert_eq!(ctx.error_message(), "kaboom");
        assert!(ctx.traceback().starts_with("panicked at "), "got: {}", ctx.traceback());
        assert!(ctx.traceback().contains("capture.rs"));
    }

    #[test]
    fn test_should_build_prompt_context_with_every_field() {
        let ctx = InvocationContext::builder()
            .error_kind(ErrorKind::Foreign {
                name: "KeyError".to_owned(),
            })
            .error_message("'user'")
            .function_name("job.py")
            .arguments("[\"--fast\"]")
            .traceback("Traceback (most recent call last): ...")
            .language("python")
            .build();

        let value = ctx.prompt_context();
        assert_eq!(value["error_type"], "KeyError");
        assert_eq!(value["error_message"], "'user'");
        assert_eq!(value["function_name"], "job.py");
        assert_eq!(value["function_source"], SOURCE_UNAVAILABLE);
        assert_eq!(value["function_args"], "[\"--fast\"]");
        assert_eq!(value["function_kwargs"], "{}");
        assert_eq!(value["language_name"], "Python");
        assert!(value["runtime_version"].as_str().is_some());
        assert!(value["working_directory"].as_str().is_some());
    }
}
