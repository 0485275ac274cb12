//! Streaming repair pipeline
//!
//! Same front half as the buffered pipeline, but after the original
//! execution fails the advisor's reasoning is forwarded to the caller chunk
//! by chunk through a bounded channel. The fence splitter decides, on the
//! fly, where narrative ends and the candidate fix begins; a guard-rail
//! re-scan runs before the single fix execution. A slow caller is waited on
//! for at most `flush_timeout`; a disconnected caller cancels in-flight
//! advisor and sandbox work via dropped futures (the sandbox child is
//! killed on drop).

use crate::events::DebugEvent;
use crate::steps::step;
use codemend_advisor::RepairAdvisor;
use codemend_core::{validate, FenceSplitter, GuardRailSet, StepStatus};
use codemend_sandbox::Executor;
use codemend_store::{RateLimitError, RateLimiter};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Bound on the event channel between pipeline and response writer
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// The caller stopped listening; all in-flight work is abandoned.
struct CallerGone;

/// Streaming orchestration state machine — exactly one fix attempt
pub struct StreamingRepairPipeline {
    limiter: Arc<RateLimiter>,
    advisor: Arc<dyn RepairAdvisor>,
    executor: Arc<dyn Executor>,
    guard_rails: GuardRailSet,
    flush_timeout: Duration,
}

impl StreamingRepairPipeline {
    pub fn new(
        limiter: Arc<RateLimiter>,
        advisor: Arc<dyn RepairAdvisor>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            limiter,
            advisor,
            executor,
            guard_rails: GuardRailSet::default(),
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    /// Replace the guard-rail set (tightening it needs no pipeline change).
    pub fn with_guard_rails(mut self, guard_rails: GuardRailSet) -> Self {
        self.guard_rails = guard_rails;
        self
    }

    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    /// Run one streaming repair; events are delivered through `tx` until a
    /// terminal event or until the receiver goes away.
    pub async fn run(&self, code: &str, identity: &str, tx: mpsc::Sender<DebugEvent>) {
        if self.drive(code, identity, &tx).await.is_err() {
            debug!("Caller disconnected, abandoned in-flight repair work");
        }
    }

    /// Deliver one event, waiting at most `flush_timeout` for a slow
    /// caller. A closed or stalled receiver counts as gone.
    async fn emit(
        &self,
        tx: &mpsc::Sender<DebugEvent>,
        event: DebugEvent,
    ) -> Result<(), CallerGone> {
        tx.send_timeout(event, self.flush_timeout)
            .await
            .map_err(|_| CallerGone)
    }

    async fn drive(
        &self,
        code: &str,
        identity: &str,
        tx: &mpsc::Sender<DebugEvent>,
    ) -> Result<(), CallerGone> {
        // parse_request
        if code.trim().is_empty() {
            self.emit(tx, DebugEvent::step_error(step::PARSE_REQUEST, "request contained no code"))
                .await?;
            return self
                .fail(tx, step::PARSE_REQUEST, "request contained no code")
                .await;
        }
        self.emit(tx, DebugEvent::step(step::PARSE_REQUEST, StepStatus::Success))
            .await?;

        // rate_limit_check
        match self.limiter.check_or_reject(identity).await {
            Ok(_) => {
                self.emit(tx, DebugEvent::step(step::RATE_LIMIT_CHECK, StepStatus::Success))
                    .await?;
            }
            Err(RateLimitError::Exceeded { status }) => {
                self.emit(tx, DebugEvent::step_error(step::RATE_LIMIT_CHECK, "rate limit exceeded"))
                    .await?;
                return self
                    .fail(
                        tx,
                        step::RATE_LIMIT_CHECK,
                        format!(
                            "rate limit exceeded, resets at epoch ms {}",
                            status.reset_at_epoch_ms
                        ),
                    )
                    .await;
            }
        }

        // validate_size
        let validation = validate(code);
        if !validation.is_valid {
            self.emit(tx, DebugEvent::step_error(step::VALIDATE_SIZE, validation.error_summary()))
                .await?;
            return self.fail(tx, step::VALIDATE_SIZE, validation.error_summary()).await;
        }
        self.emit(tx, DebugEvent::step(step::VALIDATE_SIZE, StepStatus::Success))
            .await?;

        // execute_original
        self.emit(tx, DebugEvent::step(step::EXECUTE_ORIGINAL, StepStatus::Pending))
            .await?;
        let original = tokio::select! {
            result = self.executor.run(code) => result,
            () = tx.closed() => return Err(CallerGone),
        };
        if original.ok {
            self.emit(tx, DebugEvent::step(step::EXECUTE_ORIGINAL, StepStatus::Success))
                .await?;
            self.emit(
                tx,
                DebugEvent::Output {
                    ok: true,
                    stdout: original.stdout,
                    error: None,
                },
            )
            .await?;
            return self.emit(tx, DebugEvent::Complete { success: true }).await;
        }
        self.emit(
            tx,
            DebugEvent::step_error(step::EXECUTE_ORIGINAL, original.failure_summary()),
        )
        .await?;

        // Reasoning stream: forward narrative chunks as they arrive
        self.emit(tx, DebugEvent::ReasoningStart).await?;
        let mut stream = match self
            .advisor
            .stream_fix_reasoning(code, &original.failure_summary())
            .await
        {
            Ok(stream) => stream,
            Err(error) => return self.fail(tx, step::GENERATE_FIX, error.to_string()).await,
        };

        let mut splitter = FenceSplitter::new();
        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => match chunk {
                    None => break,
                    Some(chunk) => chunk,
                },
                () = tx.closed() => return Err(CallerGone),
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => return self.fail(tx, step::GENERATE_FIX, error.to_string()).await,
            };
            if let Some(text) = splitter.push(&chunk) {
                self.emit(tx, DebugEvent::ReasoningChunk { text }).await?;
            }
        }
        self.emit(tx, DebugEvent::ReasoningComplete).await?;

        let split = splitter.finish();
        let candidate = match split.code {
            Some(code) if !code.trim().is_empty() => code,
            _ => {
                return self
                    .fail(tx, step::GENERATE_FIX, "advisor stream contained no code block")
                    .await
            }
        };

        // Guard-rail re-scan before anything executes
        if let Some(rail) = self.guard_rails.scan(&candidate) {
            self.emit(
                tx,
                DebugEvent::step_error(step::GUARD_SCAN, format!("matched guard rail {rail}")),
            )
            .await?;
            return self
                .fail(
                    tx,
                    step::GUARD_SCAN,
                    format!("candidate fix rejected: matched guard rail {rail}"),
                )
                .await;
        }
        self.emit(tx, DebugEvent::step(step::GUARD_SCAN, StepStatus::Success))
            .await?;

        self.emit(
            tx,
            DebugEvent::FixedCode {
                code: candidate.clone(),
            },
        )
        .await?;

        // execute_fixed_code — the streaming variant's single fix attempt
        self.emit(tx, DebugEvent::step(step::EXECUTE_FIXED_CODE, StepStatus::Pending))
            .await?;
        let result = tokio::select! {
            result = self.executor.run(&candidate) => result,
            () = tx.closed() => return Err(CallerGone),
        };
        let status = if result.ok {
            StepStatus::Success
        } else {
            StepStatus::Error
        };
        self.emit(tx, DebugEvent::step(step::EXECUTE_FIXED_CODE, status))
            .await?;
        let error = if result.ok {
            None
        } else {
            Some(result.failure_summary())
        };
        self.emit(
            tx,
            DebugEvent::Output {
                ok: result.ok,
                stdout: result.stdout,
                error,
            },
        )
        .await?;
        self.emit(tx, DebugEvent::Complete { success: result.ok }).await
    }

    /// Terminal error event; closes the stream.
    async fn fail(
        &self,
        tx: &mpsc::Sender<DebugEvent>,
        step_name: &str,
        message: impl Into<String>,
    ) -> Result<(), CallerGone> {
        self.emit(
            tx,
            DebugEvent::Error {
                step: step_name.to_string(),
                message: message.into(),
            },
        )
        .await
    }
}
