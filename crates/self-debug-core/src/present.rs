//! Result presenter.

use crossterm::style::Stylize;

use crate::analysis::{AnalysisResult, Confidence};
use crate::console::Console;

/// Whether rendered text carries terminal styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Plain,
    Styled,
}

impl From<bool> for ColorMode {
    fn from(color: bool) -> Self {
        if color { Self::Styled } else { Self::Plain }
    }
}

/// Render an analysis into titled sections. Absent fields produce no output.
pub fn render_analysis(result: &AnalysisResult, mode: ColorMode) -> String {
    let styled = mode == ColorMode::Styled;
    let mut out = String::new();

    let header = "🔍 Analysis";
    out.push('\n');
    out.push_str(&if styled {
        header.bold().blue().to_string()
    } else {
        header.to_owned()
    });
    out.push('\n');

    if let Some(explanation) = &result.explanation {
        push_section(&mut out, "Explanation", explanation, styled);
    }
    if let Some(root_cause) = &result.root_cause {
        push_section(&mut out, "Root Cause", root_cause, styled);
    }
    if let Some(fix) = &result.suggested_fix {
        push_section(&mut out, "Suggested Fix", &format!("```\n{fix}\n```"), styled);
    }
    if let Some(confidence) = &result.confidence {
        out.push('\n');
        out.push_str(&confidence_line(confidence, styled));
        out.push('\n');
    }
    if let Some(notes) = &result.additional_notes {
        push_section(&mut out, "Additional Notes", notes, styled);
    }
    out
}

/// Write an analysis to the console.
pub fn present(console: &Console, result: &AnalysisResult) {
    console.write(render_analysis(result, console.color().into()));
}

fn push_section(out: &mut String, title: &str, body: &str, styled: bool) {
    out.push('\n');
    if styled {
        out.push_str(&title.bold().to_string());
    } else {
        out.push_str(title);
    }
    out.push('\n');
    out.push_str(&"─".repeat(title.chars().count()));
    out.push('\n');
    out.push_str(body.trim_end());
    out.push('\n');
}

fn confidence_line(confidence: &Confidence, styled: bool) -> String {
    let line = format!("Confidence: {confidence}");
    if !styled {
        return line;
    }
    match confidence {
        Confidence::High => line.green().to_string(),
        Confidence::Medium => line.yellow().to_string(),
        Confidence::Low => line.red().to_string(),
        Confidence::Other(_) => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_result() -> AnalysisResult {
        AnalysisResult {
            explanation: Some("x divided by zero".to_owned()),
            root_cause: Some("denominator is zero".to_owned()),
            suggested_fix: Some("if b == 0 { return Err(..) }".to_owned()),
            confidence: Some(Confidence::High),
            additional_notes: Some("consider checked_div".to_owned()),
        }
    }

    #[test]
    fn test_should_render_sections_in_order() {
        let text = render_analysis(&full_result(), ColorMode::Plain);

        let order = [
            "🔍 Analysis",
            "Explanation",
            "x divided by zero",
            "Root Cause",
            "denominator is zero",
            "Suggested Fix",
            "```\nif b == 0 { return Err(..) }\n```",
            "Confidence: high",
            "Additional Notes",
            "consider checked_div",
        ];
        let mut cursor = 0;
        for needle in order {
            let found = text[cursor..]
                .find(needle)
                .unwrap_or_else(|| panic!("missing {needle:?} after offset {cursor} in {text}"));
            cursor += found + needle.len();
        }
    }

    #[test]
    fn test_should_skip_absent_sections() {
        let result = AnalysisResult {
            explanation: Some("only an explanation".to_owned()),
            ..AnalysisResult::default()
        };
        let text = render_analysis(&result, ColorMode::Plain);

        assert!(text.contains("only an explanation"));
        assert!(!text.contains("Root Cause"));
        assert!(!text.contains("Suggested Fix"));
        assert!(!text.contains("Confidence"));
        assert!(!text.contains("Additional Notes"));
    }

    #[test]
    fn test_should_render_unknown_confidence_neutrally() {
        let result = AnalysisResult {
            confidence: Some(Confidence::Other("certain-ish".to_owned())),
            ..AnalysisResult::default()
        };
        let plain = render_analysis(&result, ColorMode::Plain);
        let styled = render_analysis(&result, ColorMode::Styled);

        assert!(plain.contains("Confidence: certain-ish"));
        assert!(styled.contains("Confidence: certain-ish"));
    }

    #[test]
    fn test_should_style_known_confidence() {
        let result = AnalysisResult {
            confidence: Some(Confidence::Low),
            ..AnalysisResult::default()
        };
        let styled = render_analysis(&result, ColorMode::Styled);
        assert!(styled.contains('\u{1b}'));
        assert!(!render_analysis(&result, ColorMode::Plain).contains('\u{1b}'));
    }

    #[test]
    fn test_should_present_through_console() {
        let (console, buffer) = Console::buffered();
        present(&console, &full_result());
        assert_eq!(buffer.contents(), render_analysis(&full_result(), ColorMode::Plain));
    }
}
