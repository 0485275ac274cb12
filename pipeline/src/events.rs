//! Streaming pipeline events
//!
//! Ordered event sequence delivered to the caller over a long-lived
//! connection. The stream stays open until a `complete` or unrecoverable
//! `error` event.

use codemend_core::StepStatus;
use serde::{Deserialize, Serialize};

/// One event in the streaming debug response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DebugEvent {
    /// Pipeline progress
    Step {
        name: String,
        status: StepStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The advisor reasoning stream is about to begin
    ReasoningStart,
    /// One chunk of narrative reasoning, delivered as it arrives
    ReasoningChunk { text: String },
    /// The reasoning stream finished; the candidate fix follows
    ReasoningComplete,
    /// The candidate fix extracted from the fenced block
    FixedCode { code: String },
    /// Result of executing the candidate fix
    Output {
        ok: bool,
        stdout: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Unrecoverable failure or rejection; terminal
    Error { step: String, message: String },
    /// Normal end of the stream; terminal
    Complete { success: bool },
}

impl DebugEvent {
    /// Terminal events close the connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DebugEvent::Complete { .. } | DebugEvent::Error { .. })
    }

    pub fn step(name: &str, status: StepStatus) -> Self {
        DebugEvent::Step {
            name: name.to_string(),
            status,
            message: None,
        }
    }

    pub fn step_error(name: &str, message: impl Into<String>) -> Self {
        DebugEvent::Step {
            name: name.to_string(),
            status: StepStatus::Error,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds_serialize_kebab_case() {
        let event = DebugEvent::ReasoningChunk {
            text: "because".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "reasoning-chunk");
        assert_eq!(json["text"], "because");

        let event = DebugEvent::FixedCode {
            code: "x".to_string(),
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["kind"], "fixed-code");

        let event = DebugEvent::step("execute_original", StepStatus::Success);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "step");
        assert_eq!(json["status"], "success");
    }

    #[test]
    fn test_terminal_events() {
        assert!(DebugEvent::Complete { success: true }.is_terminal());
        assert!(DebugEvent::Error {
            step: "x".to_string(),
            message: "y".to_string()
        }
        .is_terminal());
        assert!(!DebugEvent::ReasoningStart.is_terminal());
        assert!(!DebugEvent::step("execute_original", StepStatus::Pending).is_terminal());
    }
}
