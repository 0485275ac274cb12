//! Sandboxed program execution
//!
//! Each run gets a fresh scratch directory, a cleared environment and its
//! own Node.js process. The wall-clock timeout is enforced here by killing
//! the child; the memory ceiling is enforced inside the engine via
//! `--max-old-space-size`, with an address-space rlimit as a backstop.
//! Cleanup is unconditional: the scratch directory is removed on drop and
//! the child is killed on drop, covering every exit path.

use crate::harness::build_harness;
use crate::Executor;
use async_trait::async_trait;
use codemend_core::{ErrorKind, ExecutionResult, SandboxSettings};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

const HARNESS_FILE: &str = "program.js";

/// Runs untrusted programs in isolated Node.js subprocesses.
///
/// Invocations share no state and may run concurrently.
pub struct SandboxExecutor {
    settings: SandboxSettings,
}

impl SandboxExecutor {
    pub fn new(settings: SandboxSettings) -> Self {
        Self { settings }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeout_ms)
    }

    /// Failure produced when the host itself could not run the program.
    fn internal_failure(message: String, started: Instant) -> ExecutionResult {
        warn!("Sandbox internal failure: {message}");
        ExecutionResult {
            ok: false,
            stdout: String::new(),
            stderr: message,
            error_kind: Some(ErrorKind::Internal),
            timed_out: false,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[async_trait]
impl Executor for SandboxExecutor {
    async fn run(&self, code: &str) -> ExecutionResult {
        let started = Instant::now();

        let scratch = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return Self::internal_failure(format!("failed to create scratch dir: {e}"), started)
            }
        };

        let harness = build_harness(code, self.settings.timeout_ms);
        let script_path = scratch.path().join(HARNESS_FILE);
        if let Err(e) = tokio::fs::write(&script_path, harness).await {
            return Self::internal_failure(format!("failed to write harness: {e}"), started);
        }

        let mut command = Command::new(&self.settings.node_path);
        command
            .arg(format!(
                "--max-old-space-size={}",
                self.settings.memory_limit_mb
            ))
            .arg(HARNESS_FILE)
            .current_dir(scratch.path())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        apply_rlimit_backstop(&mut command, self.settings.memory_limit_mb);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Self::internal_failure(
                    format!("failed to spawn {}: {e}", self.settings.node_path),
                    started,
                )
            }
        };

        // Drain both pipes concurrently so partial output survives a kill.
        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");
        let stdout_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buffer).await;
            buffer
        });
        let stderr_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buffer).await;
            buffer
        });

        let wait_result = tokio::time::timeout(self.timeout(), child.wait()).await;

        let timed_out = wait_result.is_err();
        if timed_out {
            debug!("Sandbox run exceeded {}ms, killing", self.settings.timeout_ms);
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();
        let duration_ms = started.elapsed().as_millis() as u64;

        match wait_result {
            Err(_) => ExecutionResult {
                ok: false,
                stdout,
                stderr,
                error_kind: Some(ErrorKind::Timeout),
                timed_out: true,
                duration_ms,
            },
            Ok(Err(e)) => ExecutionResult {
                ok: false,
                stdout,
                stderr: format!("failed to wait on sandbox process: {e}"),
                error_kind: Some(ErrorKind::Internal),
                timed_out: false,
                duration_ms,
            },
            Ok(Ok(status)) => {
                let (ok, error_kind) = classify_exit(status.success(), exit_signal(&status), &stderr);
                ExecutionResult {
                    ok,
                    stdout,
                    stderr,
                    error_kind,
                    timed_out: false,
                    duration_ms,
                }
            }
        }
    }
}

/// Map exit state to the result classification.
fn classify_exit(
    success: bool,
    signal: Option<i32>,
    stderr: &str,
) -> (bool, Option<ErrorKind>) {
    if success {
        return (true, None);
    }
    if stderr.contains("JavaScript heap out of memory")
        || stderr.contains("Reached heap limit")
        || signal == Some(6)
    {
        return (false, Some(ErrorKind::MemoryExceeded));
    }
    (false, Some(ErrorKind::RuntimeError))
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Address-space rlimit backstop behind the engine's own heap ceiling.
///
/// V8 reserves large virtual ranges at startup, so the limit sits well
/// above the heap ceiling; it exists to stop native allocations that the
/// engine limit does not see.
#[cfg(unix)]
fn apply_rlimit_backstop(command: &mut Command, memory_limit_mb: u64) {
    let address_space_bytes = (memory_limit_mb + 2_048) * 1024 * 1024;
    unsafe {
        command.pre_exec(move || {
            use nix::sys::resource::{setrlimit, Resource};
            setrlimit(Resource::RLIMIT_AS, address_space_bytes, address_space_bytes)
                .map_err(std::io::Error::other)?;
            // Enough for the engine's own worker threads, nothing more
            setrlimit(Resource::RLIMIT_NPROC, 32, 32).map_err(std::io::Error::other)?;
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> SandboxExecutor {
        SandboxExecutor::new(SandboxSettings::default())
    }

    fn fast_executor(timeout_ms: u64) -> SandboxExecutor {
        SandboxExecutor::new(SandboxSettings {
            timeout_ms,
            ..SandboxSettings::default()
        })
    }

    #[test]
    fn test_classify_exit() {
        assert_eq!(classify_exit(true, None, ""), (true, None));
        assert_eq!(
            classify_exit(false, None, "ReferenceError: x is not defined"),
            (false, Some(ErrorKind::RuntimeError))
        );
        assert_eq!(
            classify_exit(false, None, "FATAL ERROR: Reached heap limit"),
            (false, Some(ErrorKind::MemoryExceeded))
        );
        assert_eq!(
            classify_exit(false, Some(6), ""),
            (false, Some(ErrorKind::MemoryExceeded))
        );
    }

    #[tokio::test]
    async fn test_missing_runtime_is_internal_not_panic() {
        let sandbox = SandboxExecutor::new(SandboxSettings {
            node_path: "/nonexistent/definitely-not-node".to_string(),
            ..SandboxSettings::default()
        });
        let result = sandbox.run("console.log(1);").await;
        assert!(!result.ok);
        assert_eq!(result.error_kind, Some(ErrorKind::Internal));
        assert!(!result.timed_out);
    }

    // Integration tests require a node binary on PATH, so they are ignored
    // by default.
    #[tokio::test]
    #[ignore]
    async fn test_prints_five() {
        let result = executor().run("console.log(5);").await;
        assert!(result.ok, "stderr: {}", result.stderr);
        assert_eq!(result.stdout.trim(), "5");
        assert_eq!(result.error_kind, None);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    #[ignore]
    async fn test_infinite_loop_times_out() {
        let started = Instant::now();
        let result = fast_executor(2_000).run("while (true) {}").await;
        assert!(!result.ok);
        assert!(result.timed_out);
        assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
        // Returns within timeout plus scheduling slack
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    #[ignore]
    async fn test_partial_output_survives_timeout() {
        let result = fast_executor(2_000)
            .run("console.log(\"before\"); while (true) {}")
            .await;
        assert!(result.timed_out);
        assert!(result.stdout.contains("before"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_runtime_error_is_captured() {
        let result = executor().run("undefinedFunction();").await;
        assert!(!result.ok);
        assert_eq!(result.error_kind, Some(ErrorKind::RuntimeError));
        assert!(result.stderr.contains("ReferenceError"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_no_ambient_access() {
        // require/process are not visible inside the context
        let result = executor().run("console.log(typeof require, typeof process);").await;
        assert!(result.ok, "stderr: {}", result.stderr);
        assert_eq!(result.stdout.trim(), "undefined undefined");
    }

    #[tokio::test]
    #[ignore]
    async fn test_concurrent_runs_do_not_interfere() {
        let sandbox = std::sync::Arc::new(executor());
        let mut handles = Vec::new();
        for i in 0..4 {
            let sandbox = sandbox.clone();
            handles.push(tokio::spawn(async move {
                sandbox.run(&format!("console.log({i});")).await
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.await.unwrap();
            assert!(result.ok);
            assert_eq!(result.stdout.trim(), i.to_string());
        }
    }
}
