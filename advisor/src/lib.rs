//! Codemend Advisor Module
//!
//! Client interface to the external reasoning provider. The provider's wire
//! format is an implementation detail of this crate; the rest of the system
//! sees only the `RepairAdvisor` trait: a combined safety-and-bug analysis,
//! a structured fix proposal, and an incremental reasoning stream.

pub mod client;
pub mod prompts;
pub mod schema;
pub mod scripted;

pub use client::*;
pub use schema::*;
pub use scripted::*;

use async_trait::async_trait;
use codemend_core::{FixSuggestion, SafetyVerdict};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Advisor failure taxonomy
///
/// `Schema` and `Quota` are surfaced distinctly: the first means the
/// provider returned non-conforming structure (never coerced), the second
/// means the provider itself is throttling and the caller may retry later.
#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("advisor response violated the expected schema: {0}")]
    Schema(String),

    #[error("advisor provider is throttling requests, retry later")]
    Quota,

    #[error("advisor transport failure: {0}")]
    Transport(String),

    #[error("advisor stream failed: {0}")]
    Stream(String),
}

/// A known bug, used both as analysis output and as prior-attempt context
/// on retries so the provider does not re-diagnose from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BugFinding {
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Combined safety-then-bug analysis result
#[derive(Debug, Clone)]
pub struct CodeAnalysis {
    pub verdict: SafetyVerdict,
    /// Present only when the code was judged safe
    pub bug: Option<BugFinding>,
}

/// Finite, non-restartable stream of reasoning text chunks
pub type ReasoningStream = Pin<Box<dyn Stream<Item = Result<String, AdvisorError>> + Send>>;

/// Logical contract of the reasoning provider
#[async_trait]
pub trait RepairAdvisor: Send + Sync {
    /// Safety verdict plus bug summary for the submitted code.
    async fn analyze(&self, code: &str) -> Result<CodeAnalysis, AdvisorError>;

    /// Structured fix; `prior` carries a previously-diagnosed bug so a
    /// retry does not start over.
    async fn propose_fix(
        &self,
        code: &str,
        prior: Option<&BugFinding>,
    ) -> Result<FixSuggestion, AdvisorError>;

    /// Prose reasoning followed by a single fenced code block with the fix.
    async fn stream_fix_reasoning(
        &self,
        code: &str,
        error_message: &str,
    ) -> Result<ReasoningStream, AdvisorError>;
}
