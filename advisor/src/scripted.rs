//! Scripted advisor — testing double that returns queued responses
//!
//! Responses are dequeued in order and every operation counts its calls, so
//! tests can assert how many times the pipeline consulted the advisor. An
//! exhausted queue is a loud transport error rather than a silent default.

use crate::{AdvisorError, BugFinding, CodeAnalysis, ReasoningStream, RepairAdvisor};
use async_trait::async_trait;
use codemend_core::FixSuggestion;
use futures::stream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Queue-driven advisor for tests
#[derive(Default)]
pub struct ScriptedAdvisor {
    analyses: Mutex<VecDeque<Result<CodeAnalysis, AdvisorError>>>,
    fixes: Mutex<VecDeque<Result<FixSuggestion, AdvisorError>>>,
    streams: Mutex<VecDeque<Vec<String>>>,
    analyze_calls: AtomicUsize,
    fix_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl ScriptedAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_analysis(&self, analysis: CodeAnalysis) {
        self.analyses.lock().unwrap().push_back(Ok(analysis));
    }

    pub fn queue_fix(&self, fix: FixSuggestion) {
        self.fixes.lock().unwrap().push_back(Ok(fix));
    }

    pub fn queue_fix_error(&self, error: AdvisorError) {
        self.fixes.lock().unwrap().push_back(Err(error));
    }

    /// Queue one reasoning stream as its chunk sequence.
    pub fn queue_stream<I, S>(&self, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.streams
            .lock()
            .unwrap()
            .push_back(chunks.into_iter().map(Into::into).collect());
    }

    pub fn analyze_call_count(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub fn fix_call_count(&self) -> usize {
        self.fix_calls.load(Ordering::SeqCst)
    }

    pub fn stream_call_count(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    fn exhausted(operation: &str) -> AdvisorError {
        AdvisorError::Transport(format!("scripted advisor has no queued {operation}"))
    }
}

#[async_trait]
impl RepairAdvisor for ScriptedAdvisor {
    async fn analyze(&self, _code: &str) -> Result<CodeAnalysis, AdvisorError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        self.analyses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::exhausted("analysis")))
    }

    async fn propose_fix(
        &self,
        _code: &str,
        _prior: Option<&BugFinding>,
    ) -> Result<FixSuggestion, AdvisorError> {
        self.fix_calls.fetch_add(1, Ordering::SeqCst);
        self.fixes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::exhausted("fix")))
    }

    async fn stream_fix_reasoning(
        &self,
        _code: &str,
        _error_message: &str,
    ) -> Result<ReasoningStream, AdvisorError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Self::exhausted("stream"))?;
        Ok(Box::pin(stream::iter(
            chunks.into_iter().map(Ok::<_, AdvisorError>),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemend_core::Confidence;
    use futures::StreamExt;

    fn sample_fix() -> FixSuggestion {
        FixSuggestion {
            is_malicious: false,
            malicious_reason: None,
            reasoning_steps: vec!["step".to_string()],
            fixed_code: "console.log(1);".to_string(),
            changes_made: vec![],
            confidence: Confidence::High,
        }
    }

    #[tokio::test]
    async fn test_fixes_dequeue_in_order_and_count() {
        let advisor = ScriptedAdvisor::new();
        advisor.queue_fix(sample_fix());
        advisor.queue_fix_error(AdvisorError::Quota);

        assert!(advisor.propose_fix("code", None).await.is_ok());
        assert!(matches!(
            advisor.propose_fix("code", None).await,
            Err(AdvisorError::Quota)
        ));
        assert_eq!(advisor.fix_call_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_queue_is_an_error() {
        let advisor = ScriptedAdvisor::new();
        assert!(matches!(
            advisor.propose_fix("code", None).await,
            Err(AdvisorError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_replays_chunks() {
        let advisor = ScriptedAdvisor::new();
        advisor.queue_stream(["a", "b", "c"]);
        let mut stream = advisor.stream_fix_reasoning("code", "err").await.unwrap();
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            collected.push_str(&chunk.unwrap());
        }
        assert_eq!(collected, "abc");
        assert_eq!(advisor.stream_call_count(), 1);
    }
}
