//! Codemend Pipeline Module
//!
//! The orchestration state machines. The buffered pipeline runs the whole
//! repair loop and returns one `DebugOutcome`; the streaming pipeline runs
//! the same front half, then forwards advisor reasoning to the caller chunk
//! by chunk while the sandbox work happens underneath. Both share the rate
//! limiter, validator and sandbox executor and take their collaborators by
//! injection.

pub mod events;
pub mod repair;
pub mod steps;
pub mod streaming;

pub use events::*;
pub use repair::*;
pub use steps::*;
pub use streaming::*;
