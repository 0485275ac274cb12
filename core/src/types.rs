//! Shared data model
//!
//! Every value that crosses a crate boundary lives here: sandbox results,
//! rate-limit status, advisor output and the step records that make up a
//! debug outcome.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Classification of a failed sandbox run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Wall-clock timeout hit; the process was killed
    Timeout,
    /// The engine aborted on its memory ceiling
    MemoryExceeded,
    /// The program raised (syntax error, thrown exception, non-zero exit)
    RuntimeError,
    /// The host failed to run the program at all (spawn error, missing runtime)
    Internal,
}

/// Result of one sandbox invocation
///
/// Produced exactly once per run and never mutated afterwards. All failure
/// modes are encoded here — the executor itself does not return errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// True when the program ran to completion without raising
    pub ok: bool,
    /// Everything the program printed
    pub stdout: String,
    /// Captured errors (exception message and stack, engine diagnostics)
    pub stderr: String,
    /// Failure classification, `None` when `ok`
    pub error_kind: Option<ErrorKind>,
    /// True when the wall-clock limit killed the run
    pub timed_out: bool,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// One-line failure description for advisor prompts and step messages.
    ///
    /// Never exposes raw engine crash dumps — stderr is truncated to its
    /// first meaningful line.
    pub fn failure_summary(&self) -> String {
        if self.ok {
            return "execution succeeded".to_string();
        }
        match self.error_kind {
            Some(ErrorKind::Timeout) => {
                format!("execution timed out after {}ms", self.duration_ms)
            }
            Some(ErrorKind::MemoryExceeded) => "execution exceeded the memory limit".to_string(),
            _ => {
                let first_line = self
                    .stderr
                    .lines()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("execution failed with no diagnostic output");
                first_line.trim().to_string()
            }
        }
    }
}

/// Outcome of one rate-limit check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Whether this request is within quota
    pub allowed: bool,
    /// Requests permitted per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the current window resets (epoch milliseconds)
    pub reset_at_epoch_ms: i64,
}

/// Advisor safety verdict
///
/// When `is_safe` is false no fix is produced and any bug analysis in the
/// same response is ignored downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub is_safe: bool,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Advisor confidence in a proposed fix
///
/// Parsed strictly: anything other than the three known values is a schema
/// error, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        };
        write!(f, "{label}")
    }
}

/// Structured fix proposed by the advisor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixSuggestion {
    /// Advisor flagged the submission as malicious; no fix should run
    pub is_malicious: bool,
    #[serde(default)]
    pub malicious_reason: Option<String>,
    /// Ordered reasoning steps that led to the fix
    #[serde(default)]
    pub reasoning_steps: Vec<String>,
    /// Complete replacement program
    pub fixed_code: String,
    /// Ordered list of concrete changes
    #[serde(default)]
    pub changes_made: Vec<String>,
    pub confidence: Confidence,
}

/// Progress state of one pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Success,
    Error,
    Skipped,
}

/// One entry in the pipeline's append-only audit log
///
/// A step name may recur with an updated status; consumers treat the record
/// with the latest timestamp as the current state of that step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp_ms: i64,
}

impl StepRecord {
    pub fn new(name: &str, status: StepStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: None,
            payload: serde_json::Value::Null,
            timestamp_ms: now_ms(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Terminal result of a debug request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugOutcome {
    /// True iff some execution attempt (original or a fix) succeeded
    pub success: bool,
    /// Full ordered audit log of pipeline progress
    pub steps: Vec<StepRecord>,
    pub original_code: String,
    /// Last fix attempted, present only when a fix was generated
    #[serde(default)]
    pub fixed_code: Option<String>,
    /// stdout of the successful (or last attempted) execution
    #[serde(default)]
    pub execution_output: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitStatus>,
}

/// Current time as epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_summary_timeout() {
        let result = ExecutionResult {
            ok: false,
            stdout: String::new(),
            stderr: String::new(),
            error_kind: Some(ErrorKind::Timeout),
            timed_out: true,
            duration_ms: 5003,
        };
        assert_eq!(result.failure_summary(), "execution timed out after 5003ms");
    }

    #[test]
    fn test_failure_summary_uses_first_stderr_line() {
        let result = ExecutionResult {
            ok: false,
            stdout: String::new(),
            stderr: "\nReferenceError: x is not defined\n    at <anonymous>:1:1\n".to_string(),
            error_kind: Some(ErrorKind::RuntimeError),
            timed_out: false,
            duration_ms: 12,
        };
        assert_eq!(
            result.failure_summary(),
            "ReferenceError: x is not defined"
        );
    }

    #[test]
    fn test_confidence_rejects_unknown_value() {
        let parsed: Result<Confidence, _> = serde_json::from_str("\"very_high\"");
        assert!(parsed.is_err());
        let parsed: Confidence = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, Confidence::Medium);
    }

    #[test]
    fn test_fix_suggestion_requires_fixed_code() {
        // Optional fields may be absent, required ones may not
        let minimal = r#"{"is_malicious":false,"fixed_code":"console.log(1)","confidence":"high"}"#;
        let fix: FixSuggestion = serde_json::from_str(minimal).unwrap();
        assert!(fix.reasoning_steps.is_empty());
        assert_eq!(fix.confidence, Confidence::High);

        let missing = r#"{"is_malicious":false,"confidence":"high"}"#;
        assert!(serde_json::from_str::<FixSuggestion>(missing).is_err());
    }

    #[test]
    fn test_step_record_builder() {
        let record = StepRecord::new("execute", StepStatus::Error)
            .with_message("boom")
            .with_payload(serde_json::json!({"exit": 1}));
        assert_eq!(record.name, "execute");
        assert_eq!(record.status, StepStatus::Error);
        assert_eq!(record.message.as_deref(), Some("boom"));
        assert!(record.timestamp_ms > 0);
    }
}
