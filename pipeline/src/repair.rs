//! Buffered repair pipeline
//!
//! The bounded-retry state machine:
//! parse → rate-limit → validate → execute → (on failure) generate fix →
//! execute fix → (on failure) retry once → terminate. Each state is
//! recorded as a step; rate-limit and validation failures terminate
//! immediately, a malicious verdict terminates as a refusal, and at most
//! two fix attempts are ever generated. Advisor and internal errors are
//! absorbed at the pipeline boundary into a terminal failure outcome.

use crate::steps::{step, StepLog};
use codemend_advisor::{AdvisorError, BugFinding, RepairAdvisor};
use codemend_core::{validate, DebugOutcome, RateLimitStatus, StepRecord, StepStatus};
use codemend_sandbox::Executor;
use codemend_store::{RateLimitError, RateLimiter};
use std::sync::Arc;
use tracing::{debug, info};

/// How a pipeline run ended, used by the transport layer to pick a status
/// code; the response body is always the `DebugOutcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Ran to a verdict: original worked, a fix worked, or both fixes failed
    Completed,
    /// The caller's quota for this window is exhausted
    RateLimited,
    /// The submission failed parsing or validation
    Invalid,
    /// The advisor refused the code as malicious or unsafe
    Rejected,
    /// The advisor itself is throttling; the caller may retry later
    AdvisorThrottled,
    /// Unexpected internal failure
    Internal,
}

/// Terminal result plus its termination class
#[derive(Debug)]
pub struct RepairReport {
    pub outcome: DebugOutcome,
    pub termination: Termination,
}

/// Buffered orchestration state machine
pub struct RepairPipeline {
    limiter: Arc<RateLimiter>,
    advisor: Arc<dyn RepairAdvisor>,
    executor: Arc<dyn Executor>,
}

impl RepairPipeline {
    pub fn new(
        limiter: Arc<RateLimiter>,
        advisor: Arc<dyn RepairAdvisor>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            limiter,
            advisor,
            executor,
        }
    }

    /// Run the full repair loop for one submission.
    pub async fn run(&self, code: &str, identity: &str) -> RepairReport {
        let mut log = StepLog::new();

        // parse_request — the transport decoded the body; shape check here
        if code.trim().is_empty() {
            log.error(step::PARSE_REQUEST, "request contained no code");
            return self.report(
                log,
                code,
                Termination::Invalid,
                Outcome::failed("parse_request: request contained no code"),
                None,
            );
        }
        log.success(step::PARSE_REQUEST);

        // rate_limit_check
        let rate_limit = match self.limiter.check_or_reject(identity).await {
            Ok(status) => {
                log.success_with(
                    step::RATE_LIMIT_CHECK,
                    format!("{} of {} requests remaining", status.remaining, status.limit),
                );
                status
            }
            Err(RateLimitError::Exceeded { status }) => {
                log.error(step::RATE_LIMIT_CHECK, "rate limit exceeded");
                return self.report(
                    log,
                    code,
                    Termination::RateLimited,
                    Outcome::failed("rate_limit_check: rate limit exceeded"),
                    Some(status),
                );
            }
        };
        let rate_limit = Some(rate_limit);

        // validate_size
        let validation = validate(code);
        if !validation.is_valid {
            log.error(step::VALIDATE_SIZE, validation.error_summary());
            return self.report(
                log,
                code,
                Termination::Invalid,
                Outcome::failed(format!("validate_size: {}", validation.error_summary())),
                rate_limit,
            );
        }
        if validation.warnings.is_empty() {
            log.success(step::VALIDATE_SIZE);
        } else {
            log.record(
                StepRecord::new(step::VALIDATE_SIZE, StepStatus::Success)
                    .with_payload(serde_json::json!({ "warnings": validation.warnings })),
            );
        }

        // execute_original — success here means no advisor call at all
        let original = self.executor.run(code).await;
        if original.ok {
            log.success(step::EXECUTE_ORIGINAL);
            info!("Original code executed cleanly, no repair needed");
            return self.report(
                log,
                code,
                Termination::Completed,
                Outcome::succeeded(None, original.stdout),
                rate_limit,
            );
        }
        log.error(step::EXECUTE_ORIGINAL, original.failure_summary());
        debug!("Original execution failed: {}", original.failure_summary());

        // generate_fix — safety analysis first, then the structured fix
        log.record(StepRecord::new(step::GENERATE_FIX, StepStatus::Pending));
        let analysis = match self.advisor.analyze(code).await {
            Ok(analysis) => analysis,
            Err(error) => {
                return self.advisor_failure(log, code, step::GENERATE_FIX, error, rate_limit)
            }
        };
        if !analysis.verdict.is_safe {
            let reason = if analysis.verdict.issues.is_empty() {
                "flagged unsafe".to_string()
            } else {
                analysis.verdict.issues.join("; ")
            };
            log.error(step::GENERATE_FIX, format!("rejected: {reason}"));
            return self.report(
                log,
                code,
                Termination::Rejected,
                Outcome::failed(format!("generate_fix: code rejected as unsafe: {reason}")),
                rate_limit,
            );
        }

        let fix = match self.advisor.propose_fix(code, analysis.bug.as_ref()).await {
            Ok(fix) => fix,
            Err(error) => {
                return self.advisor_failure(log, code, step::GENERATE_FIX, error, rate_limit)
            }
        };
        if fix.is_malicious {
            let reason = fix
                .malicious_reason
                .as_deref()
                .unwrap_or("no reason given")
                .to_string();
            log.error(step::GENERATE_FIX, format!("rejected as malicious: {reason}"));
            return self.report(
                log,
                code,
                Termination::Rejected,
                Outcome::failed(format!("generate_fix: code rejected as malicious: {reason}")),
                rate_limit,
            );
        }
        log.success_with(step::GENERATE_FIX, format!("confidence: {}", fix.confidence));

        // execute_fixed_code
        let first_attempt = self.executor.run(&fix.fixed_code).await;
        if first_attempt.ok {
            log.success(step::EXECUTE_FIXED_CODE);
            return self.report(
                log,
                code,
                Termination::Completed,
                Outcome::succeeded(Some(fix.fixed_code), first_attempt.stdout),
                rate_limit,
            );
        }
        log.error(step::EXECUTE_FIXED_CODE, first_attempt.failure_summary());

        // retry_fix — one retry, seeded with the failed fix as new input
        log.record(StepRecord::new(step::RETRY_FIX, StepStatus::Pending));
        let prior = BugFinding {
            description: format!(
                "a previous fix attempt still failed with: {}",
                first_attempt.failure_summary()
            ),
            location: None,
        };
        let retry = match self.advisor.propose_fix(&fix.fixed_code, Some(&prior)).await {
            Ok(retry) => retry,
            Err(error) => return self.advisor_failure(log, code, step::RETRY_FIX, error, rate_limit),
        };
        if retry.is_malicious {
            let reason = retry
                .malicious_reason
                .as_deref()
                .unwrap_or("no reason given")
                .to_string();
            log.error(step::RETRY_FIX, format!("rejected as malicious: {reason}"));
            return self.report(
                log,
                code,
                Termination::Rejected,
                Outcome::failed(format!("retry_fix: fix rejected as malicious: {reason}")),
                rate_limit,
            );
        }
        log.success_with(step::RETRY_FIX, format!("confidence: {}", retry.confidence));

        // execute_retry_fixed_code — last attempt, win or lose
        let second_attempt = self.executor.run(&retry.fixed_code).await;
        if second_attempt.ok {
            log.success(step::EXECUTE_RETRY_FIXED_CODE);
            return self.report(
                log,
                code,
                Termination::Completed,
                Outcome::succeeded(Some(retry.fixed_code), second_attempt.stdout),
                rate_limit,
            );
        }
        log.error(
            step::EXECUTE_RETRY_FIXED_CODE,
            second_attempt.failure_summary(),
        );

        // Both fixes failed; the last attempt stays visible in the outcome
        let failure_summary = second_attempt.failure_summary();
        self.report(
            log,
            code,
            Termination::Completed,
            Outcome {
                success: false,
                fixed_code: Some(retry.fixed_code),
                execution_output: Some(second_attempt.stdout),
                error_message: Some(format!(
                    "execute_retry_fixed_code: {}",
                    failure_summary
                )),
            },
            rate_limit,
        )
    }

    fn advisor_failure(
        &self,
        mut log: StepLog,
        code: &str,
        step_name: &str,
        error: AdvisorError,
        rate_limit: Option<RateLimitStatus>,
    ) -> RepairReport {
        log.error(step_name, error.to_string());
        let termination = match error {
            AdvisorError::Quota => Termination::AdvisorThrottled,
            _ => Termination::Internal,
        };
        self.report(
            log,
            code,
            termination,
            Outcome::failed(format!("{step_name}: {error}")),
            rate_limit,
        )
    }

    fn report(
        &self,
        log: StepLog,
        code: &str,
        termination: Termination,
        outcome: Outcome,
        rate_limit: Option<RateLimitStatus>,
    ) -> RepairReport {
        RepairReport {
            outcome: DebugOutcome {
                success: outcome.success,
                steps: log.into_records(),
                original_code: code.to_string(),
                fixed_code: outcome.fixed_code,
                execution_output: outcome.execution_output,
                error_message: outcome.error_message,
                rate_limit,
            },
            termination,
        }
    }
}

/// Outcome fields that vary between terminal states
struct Outcome {
    success: bool,
    fixed_code: Option<String>,
    execution_output: Option<String>,
    error_message: Option<String>,
}

impl Outcome {
    fn succeeded(fixed_code: Option<String>, output: String) -> Self {
        Self {
            success: true,
            fixed_code,
            execution_output: Some(output),
            error_message: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            fixed_code: None,
            execution_output: None,
            error_message: Some(message.into()),
        }
    }
}
