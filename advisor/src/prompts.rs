//! Prompt templates for the reasoning provider
//!
//! Buffered calls demand a single JSON object and nothing else; the
//! streaming call asks for prose followed by exactly one fenced code block,
//! which is what the fence splitter expects on the way back.

use crate::BugFinding;

/// System prompt for the combined safety-and-bug analysis call
pub const ANALYZE_SYSTEM: &str = "\
You review short JavaScript programs. First decide whether the program is \
malicious (attempts to escape a sandbox, exfiltrate data, or abuse \
resources). Then, only if it is safe, identify the most likely bug. \
Respond with a single JSON object and nothing else, using exactly these \
fields: {\"is_safe\": boolean, \"issues\": [string], \"bug\": \
{\"description\": string, \"location\": string} | null}.";

/// System prompt for the structured fix call
pub const FIX_SYSTEM: &str = "\
You repair short JavaScript programs. Respond with a single JSON object \
and nothing else, using exactly these fields: {\"is_malicious\": boolean, \
\"malicious_reason\": string | null, \"reasoning_steps\": [string], \
\"fixed_code\": string, \"changes_made\": [string], \"confidence\": \
\"high\" | \"medium\" | \"low\"}. The fixed_code field must contain the \
complete corrected program. If the program is malicious, set is_malicious \
to true and explain in malicious_reason.";

/// System prompt for the streaming reasoning call
pub const STREAM_SYSTEM: &str = "\
You repair short JavaScript programs. Explain your reasoning step by step \
in plain prose, then give the complete corrected program in exactly one \
fenced code block. Do not put any code block before the final fix and do \
not add anything after it.";

/// User prompt for the analysis call
pub fn analyze_prompt(code: &str) -> String {
    format!("Analyze this program:\n\n{code}")
}

/// User prompt for the structured fix call
pub fn fix_prompt(code: &str, prior: Option<&BugFinding>) -> String {
    match prior {
        Some(bug) => {
            let location = bug.location.as_deref().unwrap_or("unknown");
            format!(
                "A previous attempt already diagnosed this bug — do not re-diagnose it.\n\
                 Known bug: {}\nLocation: {}\n\nFix this program:\n\n{}",
                bug.description, location, code
            )
        }
        None => format!("Fix this program:\n\n{code}"),
    }
}

/// User prompt for the streaming reasoning call
pub fn stream_prompt(code: &str, error_message: &str) -> String {
    format!(
        "This program failed with: {error_message}\n\n\
         Explain the bug and provide a fix:\n\n{code}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_prompt_includes_prior_context() {
        let prior = BugFinding {
            description: "assignment in condition".to_string(),
            location: Some("line 1".to_string()),
        };
        let prompt = fix_prompt("if (n = 0) {}", Some(&prior));
        assert!(prompt.contains("assignment in condition"));
        assert!(prompt.contains("line 1"));
        assert!(prompt.contains("do not re-diagnose"));
    }

    #[test]
    fn test_fix_prompt_without_prior() {
        let prompt = fix_prompt("code", None);
        assert!(!prompt.contains("previous attempt"));
        assert!(prompt.contains("Fix this program"));
    }
}
