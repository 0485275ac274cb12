//! Codemend — sandboxed execute-and-repair service
//!
//! Wires the concrete collaborators together (Redis-backed rate limiter,
//! Node.js sandbox, HTTP advisor client) and starts the API server. All
//! pipeline dependencies are constructed here and injected; nothing below
//! this file reaches for process-wide state.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use codemend_advisor::HttpAdvisor;
use codemend_api::{ApiServer, ApiState};
use codemend_core::AppConfig;
use codemend_pipeline::{RepairPipeline, StreamingRepairPipeline};
use codemend_sandbox::SandboxExecutor;
use codemend_store::{CounterStore, MemoryCounterStore, RateLimiter, RedisCounterStore};

#[derive(Debug, Parser)]
#[command(name = "codemend", about = "Sandboxed execute-and-repair service")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,

    /// Log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let store = build_counter_store(&config).await;
    let limiter = Arc::new(RateLimiter::new(store, &config.rate_limit));

    let advisor = Arc::new(
        HttpAdvisor::new(&config.advisor).context("failed to build advisor client")?,
    );
    if config.advisor.api_key.is_none() {
        warn!("No advisor API key configured; repair calls will likely be rejected");
    }

    let executor = Arc::new(SandboxExecutor::new(config.sandbox.clone()));

    let pipeline = Arc::new(RepairPipeline::new(
        limiter.clone(),
        advisor.clone(),
        executor.clone(),
    ));
    let streaming = Arc::new(StreamingRepairPipeline::new(
        limiter.clone(),
        advisor,
        executor,
    ));

    info!(
        "Starting codemend (sandbox timeout {}ms, memory {}MB, quota {}/{}s)",
        config.sandbox.timeout_ms,
        config.sandbox.memory_limit_mb,
        config.rate_limit.limit,
        config.rate_limit.window_seconds
    );

    let state = Arc::new(ApiState {
        pipeline,
        streaming,
        limiter,
    });
    ApiServer::new(config.server.clone(), state).start().await
}

/// Redis when configured and reachable, otherwise the in-process store.
/// The fallback keeps the service available; the rate limiter itself also
/// fails open if the store degrades later.
async fn build_counter_store(config: &AppConfig) -> Arc<dyn CounterStore> {
    if !config.redis.enabled {
        info!("Redis disabled, using in-memory counter store");
        return Arc::new(MemoryCounterStore::new());
    }
    match RedisCounterStore::connect(&config.redis.url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Counter store unreachable ({e}), falling back to in-memory store");
            Arc::new(MemoryCounterStore::new())
        }
    }
}
