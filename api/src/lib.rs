//! Codemend API Module
//!
//! HTTP surface of the execute-and-repair service. The handlers perform no
//! business logic: they hand the submission to a pipeline and translate its
//! termination into status codes (buffered) or forward its events as SSE
//! (streaming).

pub mod handlers;
pub mod models;
pub mod server;

pub use handlers::*;
pub use models::*;
pub use server::*;
