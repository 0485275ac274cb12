//! API Handlers Module
//!
//! Request handlers for the debug endpoints. Identity for rate limiting is
//! the caller's socket address; the pipelines sanitize it before keying the
//! counter store.

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::Json,
};
use futures::Stream;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use codemend_core::{DebugOutcome, RateLimitStatus};
use codemend_pipeline::{
    RepairPipeline, StreamingRepairPipeline, Termination, EVENT_CHANNEL_CAPACITY,
};
use codemend_store::RateLimiter;

use crate::models::DebugRequest;

/// Shared state handed to every handler
pub struct ApiState {
    /// Buffered repair pipeline
    pub pipeline: Arc<RepairPipeline>,
    /// Streaming repair pipeline
    pub streaming: Arc<StreamingRepairPipeline>,
    /// Rate limiter, exposed read-only through `/api/limits`
    pub limiter: Arc<RateLimiter>,
}

/// Health check endpoint
pub async fn health_check() -> Json<HashMap<String, String>> {
    let mut response = HashMap::new();
    response.insert("status".to_string(), "healthy".to_string());
    response.insert("service".to_string(), "codemend-api".to_string());
    Json(response)
}

/// Buffered debug endpoint: one request, one `DebugOutcome` body.
pub async fn debug_code(
    State(state): State<Arc<ApiState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<DebugRequest>,
) -> (StatusCode, Json<DebugOutcome>) {
    let identity = addr.ip().to_string();
    let request_id = uuid::Uuid::new_v4();
    tracing::debug!("Debug request {request_id} from {identity}");

    let report = state.pipeline.run(&request.code, &identity).await;
    tracing::debug!(
        "Debug request {request_id} finished: success={}",
        report.outcome.success
    );
    (status_for(report.termination), Json(report.outcome))
}

/// Streaming debug endpoint: events over a long-lived SSE connection.
///
/// The pipeline runs in its own task; dropping the connection closes the
/// channel, which the pipeline treats as cancellation.
pub async fn debug_code_stream(
    State(state): State<Arc<ApiState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<DebugRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let identity = addr.ip().to_string();
    tracing::debug!("Streaming debug request {} from {identity}", uuid::Uuid::new_v4());

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let pipeline = state.streaming.clone();
    tokio::spawn(async move {
        pipeline.run(&request.code, &identity, tx).await;
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let sse = match Event::default().json_data(&event) {
            Ok(sse) => sse,
            Err(e) => {
                tracing::error!("Failed to serialize stream event: {e}");
                Event::default().data("{\"kind\":\"error\",\"step\":\"serialize\"}")
            }
        };
        Ok::<_, Infallible>(sse)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Current rate-limit standing for the caller, without consuming quota.
pub async fn rate_limit_status(
    State(state): State<Arc<ApiState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Json<RateLimitStatus> {
    let identity = addr.ip().to_string();
    Json(state.limiter.status(&identity).await)
}

/// Status-code mapping for buffered outcomes: 200 covers both "it worked"
/// and "both fixes failed" — the body says which; 4xx is reserved for
/// requests the caller can correct.
fn status_for(termination: Termination) -> StatusCode {
    match termination {
        Termination::Completed => StatusCode::OK,
        Termination::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        Termination::Invalid | Termination::Rejected => StatusCode::BAD_REQUEST,
        Termination::AdvisorThrottled => StatusCode::SERVICE_UNAVAILABLE,
        Termination::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(Termination::Completed), StatusCode::OK);
        assert_eq!(
            status_for(Termination::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status_for(Termination::Invalid), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(Termination::Rejected), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(Termination::AdvisorThrottled),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(Termination::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
