//! Strict validation of provider responses
//!
//! Providers wrap JSON in markdown fences often enough that we strip those
//! before parsing, but that is the only leniency. Missing required fields,
//! unknown confidence values or a blank fix are hard `Schema` errors —
//! malformed output is reported, never best-effort coerced.

use crate::{AdvisorError, BugFinding, CodeAnalysis};
use codemend_core::{FixSuggestion, SafetyVerdict};
use serde::Deserialize;

/// Remove a leading/trailing markdown fence if the whole payload is fenced.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, then the closing fence
    let body = match rest.find('\n') {
        Some(index) => &rest[index + 1..],
        None => return trimmed,
    };
    match body.rfind("```") {
        Some(index) => body[..index].trim(),
        None => body.trim(),
    }
}

/// Parse and validate a structured fix response.
pub fn parse_fix_suggestion(raw: &str) -> Result<FixSuggestion, AdvisorError> {
    let cleaned = strip_code_fences(raw);
    let fix: FixSuggestion = serde_json::from_str(cleaned)
        .map_err(|e| AdvisorError::Schema(format!("fix suggestion did not parse: {e}")))?;

    if !fix.is_malicious && fix.fixed_code.trim().is_empty() {
        return Err(AdvisorError::Schema(
            "fix suggestion has an empty fixed_code".to_string(),
        ));
    }
    Ok(fix)
}

#[derive(Debug, Deserialize)]
struct AnalysisWire {
    is_safe: bool,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    bug: Option<BugFinding>,
}

/// Parse and validate a combined safety-and-bug analysis response.
///
/// When the verdict is unsafe, any bug analysis in the same response is
/// dropped here so nothing downstream can act on it.
pub fn parse_analysis(raw: &str) -> Result<CodeAnalysis, AdvisorError> {
    let cleaned = strip_code_fences(raw);
    let wire: AnalysisWire = serde_json::from_str(cleaned)
        .map_err(|e| AdvisorError::Schema(format!("analysis did not parse: {e}")))?;

    let bug = if wire.is_safe { wire.bug } else { None };
    Ok(CodeAnalysis {
        verdict: SafetyVerdict {
            is_safe: wire.is_safe,
            issues: wire.issues,
        },
        bug,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemend_core::Confidence;

    #[test]
    fn test_parse_fix_suggestion_plain_json() {
        let raw = r#"{
            "is_malicious": false,
            "malicious_reason": null,
            "reasoning_steps": ["condition assigns instead of comparing"],
            "fixed_code": "if (n === 0) return 1;",
            "changes_made": ["replaced = with ==="],
            "confidence": "high"
        }"#;
        let fix = parse_fix_suggestion(raw).unwrap();
        assert!(!fix.is_malicious);
        assert_eq!(fix.confidence, Confidence::High);
        assert_eq!(fix.changes_made.len(), 1);
    }

    #[test]
    fn test_parse_fix_suggestion_fenced_json() {
        let raw = "```json\n{\"is_malicious\":false,\"fixed_code\":\"x\",\"confidence\":\"low\"}\n```";
        let fix = parse_fix_suggestion(raw).unwrap();
        assert_eq!(fix.fixed_code, "x");
        assert_eq!(fix.confidence, Confidence::Low);
    }

    #[test]
    fn test_parse_fix_suggestion_rejects_unknown_confidence() {
        let raw = r#"{"is_malicious":false,"fixed_code":"x","confidence":"certain"}"#;
        match parse_fix_suggestion(raw) {
            Err(AdvisorError::Schema(message)) => assert!(message.contains("did not parse")),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_fix_suggestion_rejects_prose() {
        let raw = "Sure! Here is the fix: use === instead of =.";
        assert!(matches!(
            parse_fix_suggestion(raw),
            Err(AdvisorError::Schema(_))
        ));
    }

    #[test]
    fn test_parse_fix_suggestion_rejects_blank_fix() {
        let raw = r#"{"is_malicious":false,"fixed_code":"  ","confidence":"high"}"#;
        assert!(matches!(
            parse_fix_suggestion(raw),
            Err(AdvisorError::Schema(_))
        ));
    }

    #[test]
    fn test_malicious_fix_may_omit_code() {
        let raw = r#"{"is_malicious":true,"malicious_reason":"fork bomb","fixed_code":"","confidence":"high"}"#;
        let fix = parse_fix_suggestion(raw).unwrap();
        assert!(fix.is_malicious);
        assert_eq!(fix.malicious_reason.as_deref(), Some("fork bomb"));
    }

    #[test]
    fn test_parse_analysis_safe_with_bug() {
        let raw = r#"{"is_safe":true,"issues":[],"bug":{"description":"off by one","location":"line 3"}}"#;
        let analysis = parse_analysis(raw).unwrap();
        assert!(analysis.verdict.is_safe);
        assert_eq!(analysis.bug.unwrap().description, "off by one");
    }

    #[test]
    fn test_parse_analysis_unsafe_drops_bug() {
        let raw = r#"{"is_safe":false,"issues":["reads host files"],"bug":{"description":"irrelevant"}}"#;
        let analysis = parse_analysis(raw).unwrap();
        assert!(!analysis.verdict.is_safe);
        assert_eq!(analysis.verdict.issues, vec!["reads host files"]);
        assert!(analysis.bug.is_none(), "bug must be ignored when unsafe");
    }

    #[test]
    fn test_strip_code_fences_passthrough() {
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }
}
