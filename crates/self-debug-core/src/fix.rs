//! Fix application placeholder.
//!
//! Applying a suggested fix is not implemented. [`apply_fix`] reports that
//! every time it is called and changes nothing.

use crossterm::style::Stylize;
use tracing::info;

use crate::analysis::AnalysisResult;
use crate::capture::InvocationContext;
use crate::console::Console;

pub const FIX_NOT_IMPLEMENTED: &str = "⚠️  Auto-fix feature is not yet implemented.";
pub const APPLY_MANUALLY: &str = "Please manually apply the suggested fix from the analysis above.";

/// Report that the suggested fix was not applied.
pub fn apply_fix(console: &Console, result: &AnalysisResult, ctx: &InvocationContext) {
    info!(
        function = %ctx.function_name(),
        has_fix = result.suggested_fix.is_some(),
        "fix requested, auto-fix unavailable"
    );
    for line in [FIX_NOT_IMPLEMENTED, APPLY_MANUALLY] {
        if console.color() {
            console.line(line.yellow().to_string());
        } else {
            console.line(line);
        }
    }
}
