//! Submission validation — size and shape checks before any expensive work
//!
//! The validator enforces resource bounds only. It deliberately carries no
//! denylist of dangerous API names: keyword lists are trivially evaded and
//! false-positive on legitimate code, so the trust boundary is the sandbox,
//! not this file. See `guard.rs` for the separate heuristic re-scan applied
//! to machine-generated fixes.

use regex::Regex;
use std::sync::OnceLock;

/// Hard ceiling on submission length in characters
pub const MAX_CODE_LENGTH: usize = 10_000;
/// Hard ceiling on submission line count
pub const MAX_LINE_COUNT: usize = 500;
/// Single lines longer than this draw a warning (possible obfuscation)
const LONG_LINE_THRESHOLD: usize = 1_000;
/// Base64-ish runs at least this long draw a warning (possible smuggling)
const BASE64_RUN_THRESHOLD: usize = 120;

fn base64_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z0-9+/=]{120,}").expect("static regex"))
}

/// Result of validating one submission
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// False when any hard limit was exceeded
    pub is_valid: bool,
    /// Hard failures; the pipeline stops on any of these
    pub errors: Vec<String>,
    /// Soft heuristics; logged and recorded, never blocking
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Combined error text for the validation step record
    pub fn error_summary(&self) -> String {
        self.errors.join("; ")
    }
}

/// Validate a submission against size and shape limits.
pub fn validate(code: &str) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let length = code.chars().count();
    if length > MAX_CODE_LENGTH {
        errors.push(format!(
            "code is {length} characters, maximum is {MAX_CODE_LENGTH}"
        ));
    }

    let line_count = code.lines().count();
    if line_count > MAX_LINE_COUNT {
        errors.push(format!(
            "code is {line_count} lines, maximum is {MAX_LINE_COUNT}"
        ));
    }

    for (index, line) in code.lines().enumerate() {
        if line.chars().count() > LONG_LINE_THRESHOLD {
            warnings.push(format!(
                "line {} is over {LONG_LINE_THRESHOLD} characters",
                index + 1
            ));
        }
    }

    if let Some(found) = base64_run_pattern().find(code) {
        if found.as_str().len() >= BASE64_RUN_THRESHOLD {
            warnings.push(format!(
                "contains a {}-character base64-like run",
                found.as_str().len()
            ));
        }
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}
