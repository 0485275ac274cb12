//! Codemend Store Module
//!
//! Counter-store abstraction over Redis plus the fixed-window rate limiter
//! built on top of it. The store is injected as a trait object so tests and
//! single-process deployments can run on the in-memory implementation.

pub mod counter;
pub mod ratelimit;

pub use counter::*;
pub use ratelimit::*;
