//! API wire models

use serde::{Deserialize, Serialize};

/// Inbound debug request, shared by the buffered and streaming endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugRequest {
    /// The program to execute and, if needed, repair
    pub code: String,
}
