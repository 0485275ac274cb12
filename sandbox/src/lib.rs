//! Codemend Sandbox Module
//!
//! Runs one untrusted program per invocation inside an isolated Node.js
//! subprocess with hard wall-clock and memory ceilings. All failure modes
//! are encoded in the returned `ExecutionResult`; `run` itself never fails.

pub mod executor;
mod harness;

pub use executor::*;

use async_trait::async_trait;
use codemend_core::ExecutionResult;

/// Something that can execute a submitted program.
///
/// The pipelines depend on this trait so tests can substitute a scripted
/// executor for the real sandbox.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, code: &str) -> ExecutionResult;
}
